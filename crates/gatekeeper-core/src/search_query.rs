//! Search query builder.
//!
//! A [`SearchQueryBuilder`] collects one or more [`SubQuery`] blocks and
//! compiles them into a [`SearchQuery`]: a list of AND-ed filter groups that
//! are OR-ed together, plus projection, ordering and limit. Storage backends
//! only ever see the compiled form.

use serde_json::Value;

use crate::error::EventstoreError;
use crate::event::{AggregateType, EventType};

/// Projection of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum Columns {
    /// Full events.
    #[default]
    Event = 0,
    /// Only the highest matching sequence.
    MaxSequence = 1,
}

impl TryFrom<i32> for Columns {
    type Error = EventstoreError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Event),
            1 => Ok(Self::MaxSequence),
            other => Err(EventstoreError::InvalidArgument(format!(
                "column {other} is out of range"
            ))),
        }
    }
}

/// Event attribute a filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Field {
    /// [`Event::aggregate_type`](crate::event::Event::aggregate_type).
    AggregateType = 0,
    /// [`Event::aggregate_id`](crate::event::Event::aggregate_id).
    AggregateId = 1,
    /// [`Event::event_type`](crate::event::Event::event_type).
    EventType = 2,
    /// [`Event::sequence`](crate::event::Event::sequence).
    Sequence = 3,
    /// [`Event::resource_owner`](crate::event::Event::resource_owner).
    ResourceOwner = 4,
    /// [`Event::payload`](crate::event::Event::payload).
    EventData = 5,
}

impl TryFrom<i32> for Field {
    type Error = EventstoreError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AggregateType),
            1 => Ok(Self::AggregateId),
            2 => Ok(Self::EventType),
            3 => Ok(Self::Sequence),
            4 => Ok(Self::ResourceOwner),
            5 => Ok(Self::EventData),
            other => Err(EventstoreError::InvalidArgument(format!(
                "field {other} is out of range"
            ))),
        }
    }
}

/// Comparison a filter performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Operation {
    /// Equality with a single value.
    Equals = 0,
    /// Strictly greater than a sequence.
    Greater = 1,
    /// Strictly less than a sequence.
    Less = 2,
    /// Membership in a list of values.
    In = 3,
    /// The payload contains the given JSON object.
    JsonContains = 4,
}

impl TryFrom<i32> for Operation {
    type Error = EventstoreError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Equals),
            1 => Ok(Self::Greater),
            2 => Ok(Self::Less),
            3 => Ok(Self::In),
            4 => Ok(Self::JsonContains),
            other => Err(EventstoreError::InvalidArgument(format!(
                "operation {other} is out of range"
            ))),
        }
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A single text value.
    Text(String),
    /// A list of text values.
    TextList(Vec<String>),
    /// A sequence number.
    Sequence(u64),
    /// A JSON document.
    Json(Value),
}

/// A single `(field, operation, value)` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// The attribute compared.
    pub field: Field,
    /// The comparison performed.
    pub operation: Operation,
    /// The value compared against.
    pub value: FilterValue,
}

impl Filter {
    /// Creates a new filter.
    #[must_use]
    pub fn new(field: Field, value: FilterValue, operation: Operation) -> Self {
        Self {
            field,
            operation,
            value,
        }
    }

    /// Checks that the operation and value make sense for the field.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::InvalidArgument` for mismatched combinations.
    pub fn validate(&self) -> Result<(), EventstoreError> {
        let valid = match (self.field, self.operation, &self.value) {
            (
                Field::AggregateType | Field::AggregateId | Field::EventType | Field::ResourceOwner,
                Operation::Equals,
                FilterValue::Text(text),
            ) => !text.is_empty(),
            (
                Field::AggregateType | Field::AggregateId | Field::EventType | Field::ResourceOwner,
                Operation::In,
                FilterValue::TextList(values),
            ) => !values.is_empty(),
            (
                Field::Sequence,
                Operation::Equals | Operation::Greater | Operation::Less,
                FilterValue::Sequence(_),
            ) => true,
            (Field::EventData, Operation::JsonContains, FilterValue::Json(value)) => {
                value.is_object()
            }
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            Err(EventstoreError::InvalidArgument(format!(
                "invalid filter: {:?} {:?} {:?}",
                self.field, self.operation, self.value
            )))
        }
    }
}

/// Compiled query handed to the storage backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Projection of the result.
    pub columns: Columns,
    /// Newest first when `true`.
    pub desc: bool,
    /// Maximum number of events, `0` for unbounded.
    pub limit: u64,
    /// Filter groups: filters within a group are AND-ed, groups are OR-ed.
    pub filters: Vec<Vec<Filter>>,
}

/// One AND-ed block of a search query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubQuery {
    aggregate_types: Vec<AggregateType>,
    aggregate_ids: Vec<String>,
    event_types: Vec<EventType>,
    event_data: Option<Value>,
    sequence_greater: u64,
    sequence_less: u64,
}

impl SubQuery {
    /// Restricts the block to the given aggregate types.
    #[must_use]
    pub fn aggregate_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AggregateType>,
    {
        self.aggregate_types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Restricts the block to the given aggregate ids.
    #[must_use]
    pub fn aggregate_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.aggregate_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Restricts the block to the given event types.
    #[must_use]
    pub fn event_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.event_types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Restricts the block to events whose payload contains `data`.
    #[must_use]
    pub fn event_data(mut self, data: Value) -> Self {
        self.event_data = Some(data);
        self
    }

    /// Lower sequence bound (upper bound when sorting descending). `0` unsets it.
    #[must_use]
    pub fn sequence_greater(mut self, sequence: u64) -> Self {
        self.sequence_greater = sequence;
        self
    }

    /// Upper sequence bound (lower bound when sorting descending). `0` unsets it.
    #[must_use]
    pub fn sequence_less(mut self, sequence: u64) -> Self {
        self.sequence_less = sequence;
        self
    }

    fn build(
        &self,
        desc: bool,
        resource_owner: Option<&str>,
    ) -> Result<Vec<Filter>, EventstoreError> {
        if self.aggregate_types.is_empty() {
            return Err(EventstoreError::InvalidArgument(
                "search query needs at least one aggregate type".to_owned(),
            ));
        }

        let mut filters = Vec::new();
        filters.push(text_filter(
            Field::AggregateType,
            self.aggregate_types.iter().map(|t| t.as_str().to_owned()),
        ));
        if !self.aggregate_ids.is_empty() {
            filters.push(text_filter(
                Field::AggregateId,
                self.aggregate_ids.iter().cloned(),
            ));
        }
        if !self.event_types.is_empty() {
            filters.push(text_filter(
                Field::EventType,
                self.event_types.iter().map(|t| t.as_str().to_owned()),
            ));
        }
        if let Some(data) = &self.event_data {
            filters.push(Filter::new(
                Field::EventData,
                FilterValue::Json(data.clone()),
                Operation::JsonContains,
            ));
        }
        if self.sequence_greater > 0 {
            let operation = if desc {
                Operation::Less
            } else {
                Operation::Greater
            };
            filters.push(Filter::new(
                Field::Sequence,
                FilterValue::Sequence(self.sequence_greater),
                operation,
            ));
        }
        if self.sequence_less > 0 {
            let operation = if desc {
                Operation::Greater
            } else {
                Operation::Less
            };
            filters.push(Filter::new(
                Field::Sequence,
                FilterValue::Sequence(self.sequence_less),
                operation,
            ));
        }
        if let Some(owner) = resource_owner {
            filters.push(Filter::new(
                Field::ResourceOwner,
                FilterValue::Text(owner.to_owned()),
                Operation::Equals,
            ));
        }

        for filter in &filters {
            filter.validate()?;
        }
        Ok(filters)
    }
}

/// Single value compiles to `Equals`, several to `In`.
fn text_filter(field: Field, values: impl Iterator<Item = String>) -> Filter {
    let mut values: Vec<String> = values.collect();
    if values.len() == 1 {
        let value = values.remove(0);
        Filter::new(field, FilterValue::Text(value), Operation::Equals)
    } else {
        Filter::new(field, FilterValue::TextList(values), Operation::In)
    }
}

/// Fluent builder for [`SearchQuery`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQueryBuilder {
    columns: Columns,
    desc: bool,
    limit: u64,
    resource_owner: Option<String>,
    queries: Vec<SubQuery>,
}

impl SearchQueryBuilder {
    /// Creates an empty builder with the given projection.
    #[must_use]
    pub fn new(columns: Columns) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    /// Sets the projection.
    #[must_use]
    pub fn columns(mut self, columns: Columns) -> Self {
        self.columns = columns;
        self
    }

    /// Limits the number of returned events, `0` for unbounded.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Orders oldest first (the default).
    #[must_use]
    pub fn order_asc(mut self) -> Self {
        self.desc = false;
        self
    }

    /// Orders newest first.
    #[must_use]
    pub fn order_desc(mut self) -> Self {
        self.desc = true;
        self
    }

    /// Restricts every sub-query to the given resource owner.
    #[must_use]
    pub fn resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = Some(resource_owner.into());
        self
    }

    /// Adds an OR-ed sub-query configured by `configure`.
    #[must_use]
    pub fn add_query(mut self, configure: impl FnOnce(SubQuery) -> SubQuery) -> Self {
        self.queries.push(configure(SubQuery::default()));
        self
    }

    /// Returns the configured projection.
    #[must_use]
    pub fn projection(&self) -> Columns {
        self.columns
    }

    /// Compiles the builder.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::InvalidArgument` if no sub-query was added, a
    /// sub-query names no aggregate type, or a filter is malformed.
    pub fn build(&self) -> Result<SearchQuery, EventstoreError> {
        if self.queries.is_empty() {
            return Err(EventstoreError::InvalidArgument(
                "search query needs at least one aggregate type".to_owned(),
            ));
        }
        let filters = self
            .queries
            .iter()
            .map(|query| query.build(self.desc, self.resource_owner.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchQuery {
            columns: self.columns,
            desc: self.desc,
            limit: self.limit,
            filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn eq(field: Field, value: &str) -> Filter {
        Filter::new(field, FilterValue::Text(value.to_owned()), Operation::Equals)
    }

    fn seq(sequence: u64, operation: Operation) -> Filter {
        Filter::new(Field::Sequence, FilterValue::Sequence(sequence), operation)
    }

    #[test]
    fn test_build_without_aggregate_types_fails() {
        // Arrange
        let builder = SearchQueryBuilder::new(Columns::Event);

        // Act
        let result = builder.build();

        // Assert
        match result {
            Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidArgument),
            Ok(query) => panic!("expected InvalidArgument, got {query:?}"),
        }
    }

    #[test]
    fn test_build_sub_query_without_aggregate_types_fails() {
        let builder = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| q.aggregate_types(["user"]))
            .add_query(|q| q.aggregate_ids(["1234"]));

        assert!(builder.build().is_err());
    }

    #[test]
    fn test_columns_out_of_range_is_rejected() {
        for raw in [-1, 2, i32::MAX] {
            match Columns::try_from(raw) {
                Err(EventstoreError::InvalidArgument(_)) => {}
                other => panic!("expected InvalidArgument for {raw}, got {other:?}"),
            }
        }
        assert_eq!(Columns::try_from(1).unwrap(), Columns::MaxSequence);
    }

    #[test]
    fn test_field_and_operation_out_of_range_are_rejected() {
        assert!(Field::try_from(-1).is_err());
        assert!(Field::try_from(6).is_err());
        assert!(Operation::try_from(5).is_err());
        assert_eq!(Field::try_from(3).unwrap(), Field::Sequence);
        assert_eq!(Operation::try_from(3).unwrap(), Operation::In);
    }

    #[test]
    fn test_single_aggregate_type_compiles_to_equals() {
        let query = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| q.aggregate_types(["user"]))
            .build()
            .unwrap();

        assert_eq!(
            query,
            SearchQuery {
                columns: Columns::Event,
                desc: false,
                limit: 0,
                filters: vec![vec![eq(Field::AggregateType, "user")]],
            }
        );
    }

    #[test]
    fn test_multiple_aggregate_types_compile_to_in() {
        let query = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| q.aggregate_types(["user", "org"]))
            .build()
            .unwrap();

        assert_eq!(
            query.filters,
            vec![vec![Filter::new(
                Field::AggregateType,
                FilterValue::TextList(vec!["user".to_owned(), "org".to_owned()]),
                Operation::In,
            )]]
        );
    }

    #[test]
    fn test_aggregate_ids_and_event_types_follow_single_multi_rule() {
        let query = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| {
                q.aggregate_types(["user"])
                    .aggregate_ids(["1234", "0815"])
                    .event_types(["user.created"])
            })
            .build()
            .unwrap();

        assert_eq!(
            query.filters[0],
            vec![
                eq(Field::AggregateType, "user"),
                Filter::new(
                    Field::AggregateId,
                    FilterValue::TextList(vec!["1234".to_owned(), "0815".to_owned()]),
                    Operation::In,
                ),
                eq(Field::EventType, "user.created"),
            ]
        );
    }

    #[test]
    fn test_sequence_greater_depends_on_sort_direction() {
        let asc = SearchQueryBuilder::new(Columns::Event)
            .limit(5)
            .order_asc()
            .add_query(|q| q.sequence_greater(100).aggregate_types(["user"]))
            .build()
            .unwrap();
        let desc = SearchQueryBuilder::new(Columns::Event)
            .limit(5)
            .order_desc()
            .add_query(|q| q.sequence_greater(100).aggregate_types(["user"]))
            .build()
            .unwrap();

        assert!(!asc.desc);
        assert_eq!(asc.limit, 5);
        assert_eq!(asc.filters[0][1], seq(100, Operation::Greater));
        assert!(desc.desc);
        assert_eq!(desc.filters[0][1], seq(100, Operation::Less));
    }

    #[test]
    fn test_sequence_between_ascending() {
        let query = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| {
                q.aggregate_types(["user"])
                    .sequence_greater(8)
                    .sequence_less(16)
            })
            .build()
            .unwrap();

        assert_eq!(
            query.filters[0],
            vec![
                eq(Field::AggregateType, "user"),
                seq(8, Operation::Greater),
                seq(16, Operation::Less),
            ]
        );
    }

    #[test]
    fn test_resource_owner_is_appended_to_every_sub_query() {
        let query = SearchQueryBuilder::new(Columns::Event)
            .resource_owner("hodor")
            .add_query(|q| q.aggregate_types(["user"]).aggregate_ids(["1234"]))
            .add_query(|q| q.aggregate_types(["org"]).aggregate_ids(["izu"]))
            .build()
            .unwrap();

        assert_eq!(
            query.filters,
            vec![
                vec![
                    eq(Field::AggregateType, "user"),
                    eq(Field::AggregateId, "1234"),
                    eq(Field::ResourceOwner, "hodor"),
                ],
                vec![
                    eq(Field::AggregateType, "org"),
                    eq(Field::AggregateId, "izu"),
                    eq(Field::ResourceOwner, "hodor"),
                ],
            ]
        );
    }

    #[test]
    fn test_max_sequence_projection_is_kept() {
        let query = SearchQueryBuilder::new(Columns::Event)
            .columns(Columns::MaxSequence)
            .add_query(|q| q.aggregate_types(["user"]))
            .build()
            .unwrap();

        assert_eq!(query.columns, Columns::MaxSequence);
    }

    #[test]
    fn test_event_data_must_be_an_object() {
        let valid = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| {
                q.aggregate_types(["org"])
                    .event_data(json!({"idpConfigId": "idp-1"}))
            })
            .build()
            .unwrap();
        let invalid = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| q.aggregate_types(["org"]).event_data(json!("idp-1")))
            .build();

        assert_eq!(
            valid.filters[0][1],
            Filter::new(
                Field::EventData,
                FilterValue::Json(json!({"idpConfigId": "idp-1"})),
                Operation::JsonContains,
            )
        );
        assert!(invalid.is_err());
    }

    #[test]
    fn test_filter_validate_rejects_in_with_scalar() {
        let filter = Filter::new(
            Field::AggregateId,
            FilterValue::Text("1".to_owned()),
            Operation::In,
        );

        assert!(filter.validate().is_err());
    }
}
