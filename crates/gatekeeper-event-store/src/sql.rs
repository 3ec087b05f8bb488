//! Compiles a [`SearchQuery`] into parameterized `PostgreSQL`.
//!
//! Filter groups become parenthesized `AND` lists joined with `OR`; every
//! value is bound, never interpolated.

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::search_query::{Field, Filter, FilterValue, Operation, SearchQuery};
use sqlx::{Postgres, QueryBuilder};

use crate::schema::{EVENT_COLUMNS, EVENTS_TABLE};

/// Builds the statement loading the events matching `query`.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` if a filter is malformed or a
/// number does not fit into a `BIGINT`.
pub fn select_events(query: &SearchQuery) -> Result<QueryBuilder<'static, Postgres>, EventstoreError> {
    let mut builder = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE}"));
    push_where(&mut builder, &query.filters)?;
    builder.push(if query.desc {
        " ORDER BY position DESC"
    } else {
        " ORDER BY position ASC"
    });
    if query.limit > 0 {
        builder.push(" LIMIT ").push_bind(to_bigint(query.limit)?);
    }
    Ok(builder)
}

/// Builds the statement returning the highest sequence matching `query`, or
/// `0` when nothing matches.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` if a filter is malformed.
pub fn select_max_sequence(
    query: &SearchQuery,
) -> Result<QueryBuilder<'static, Postgres>, EventstoreError> {
    let mut builder =
        QueryBuilder::new(format!("SELECT COALESCE(MAX(sequence), 0) FROM {EVENTS_TABLE}"));
    push_where(&mut builder, &query.filters)?;
    Ok(builder)
}

fn push_where(
    builder: &mut QueryBuilder<'static, Postgres>,
    groups: &[Vec<Filter>],
) -> Result<(), EventstoreError> {
    if groups.is_empty() {
        return Ok(());
    }
    builder.push(" WHERE ");
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        builder.push("(");
        for (j, filter) in group.iter().enumerate() {
            if j > 0 {
                builder.push(" AND ");
            }
            push_filter(builder, filter)?;
        }
        builder.push(")");
    }
    Ok(())
}

fn push_filter(
    builder: &mut QueryBuilder<'static, Postgres>,
    filter: &Filter,
) -> Result<(), EventstoreError> {
    filter.validate()?;
    builder.push(column(filter.field));

    match (filter.operation, &filter.value) {
        (Operation::Equals, FilterValue::Text(value)) => {
            builder.push(" = ").push_bind(value.clone());
        }
        (Operation::In, FilterValue::TextList(values)) => {
            builder.push(" = ANY(").push_bind(values.clone()).push(")");
        }
        (Operation::Equals, FilterValue::Sequence(sequence)) => {
            builder.push(" = ").push_bind(to_bigint(*sequence)?);
        }
        (Operation::Greater, FilterValue::Sequence(sequence)) => {
            builder.push(" > ").push_bind(to_bigint(*sequence)?);
        }
        (Operation::Less, FilterValue::Sequence(sequence)) => {
            builder.push(" < ").push_bind(to_bigint(*sequence)?);
        }
        (Operation::JsonContains, FilterValue::Json(value)) => {
            builder.push(" @> ").push_bind(value.clone());
        }
        (operation, value) => {
            return Err(EventstoreError::InvalidArgument(format!(
                "operation {operation:?} cannot compare {value:?}"
            )));
        }
    }
    Ok(())
}

fn column(field: Field) -> &'static str {
    match field {
        Field::AggregateType => "aggregate_type",
        Field::AggregateId => "aggregate_id",
        Field::EventType => "event_type",
        Field::Sequence => "sequence",
        Field::ResourceOwner => "resource_owner",
        Field::EventData => "payload",
    }
}

pub(crate) fn to_bigint(value: u64) -> Result<i64, EventstoreError> {
    i64::try_from(value)
        .map_err(|_| EventstoreError::InvalidArgument(format!("{value} exceeds BIGINT range")))
}
