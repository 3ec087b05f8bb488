//! `PostgreSQL` implementation of the `EventRepository` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use gatekeeper_core::clock::{Clock, SystemClock};
use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::{AggregateType, Event, EventType};
use gatekeeper_core::repository::{AggregatePush, EventRepository};
use gatekeeper_core::search_query::SearchQuery;
use gatekeeper_core::unique_constraint::{UniqueConstraint, UniqueConstraintAction};

use crate::schema::{EVENT_COLUMNS, EVENTS_TABLE, UNIQUE_CONSTRAINTS_TABLE};
use crate::sql::{self, to_bigint};

/// Row shape of the `events` table.
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    position: i64,
    event_id: Uuid,
    aggregate_type: String,
    aggregate_id: String,
    aggregate_version: String,
    resource_owner: String,
    event_type: String,
    sequence: i64,
    previous_sequence: i64,
    creation_date: DateTime<Utc>,
    editor_user: String,
    editor_service: String,
    payload: Option<Value>,
}

impl TryFrom<EventRow> for Event {
    type Error = EventstoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: row.event_id,
            aggregate_id: row.aggregate_id,
            aggregate_type: AggregateType::from(row.aggregate_type),
            resource_owner: row.resource_owner,
            aggregate_version: row.aggregate_version,
            event_type: EventType::from(row.event_type),
            sequence: from_bigint(row.sequence)?,
            previous_sequence: from_bigint(row.previous_sequence)?,
            position: from_bigint(row.position)?,
            creation_date: row.creation_date,
            editor_user: row.editor_user,
            editor_service: row.editor_service,
            payload: row.payload,
        })
    }
}

fn from_bigint(value: i64) -> Result<u64, EventstoreError> {
    u64::try_from(value)
        .map_err(|_| EventstoreError::Internal(format!("negative sequence {value} in event log")))
}

fn infrastructure(err: sqlx::Error) -> EventstoreError {
    EventstoreError::Infrastructure(Box::new(err))
}

/// PostgreSQL-backed event repository.
#[derive(Clone)]
pub struct PgEventRepository {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PgEventRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEventRepository")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository` stamping events with the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a new `PgEventRepository` stamping events with `clock`.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Applies the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::Infrastructure` if a migration fails.
    pub async fn migrate(&self) -> Result<(), EventstoreError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EventstoreError::Infrastructure(Box::new(e)))
    }

    /// Serializes writers per stream until the transaction ends. Locks are
    /// taken in sorted order so concurrent multi-aggregate pushes cannot
    /// deadlock.
    async fn lock_streams(
        tx: &mut Transaction<'static, Postgres>,
        pushes: &[AggregatePush],
    ) -> Result<(), EventstoreError> {
        let mut keys: Vec<String> = pushes
            .iter()
            .map(|push| format!("{}/{}", push.aggregate_type, push.aggregate_id))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        for key in keys {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(key)
                .execute(&mut **tx)
                .await
                .map_err(infrastructure)?;
        }
        Ok(())
    }

    /// Latest sequence and owner of a stream, `None` if it does not exist.
    async fn stream_head(
        tx: &mut Transaction<'static, Postgres>,
        push: &AggregatePush,
    ) -> Result<Option<(u64, String)>, EventstoreError> {
        let row: Option<(i64, String)> = sqlx::query_as(&format!(
            "SELECT sequence, resource_owner FROM {EVENTS_TABLE} \
             WHERE aggregate_type = $1 AND aggregate_id = $2 \
             ORDER BY sequence DESC LIMIT 1"
        ))
        .bind(push.aggregate_type.as_str())
        .bind(&push.aggregate_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(infrastructure)?;

        row.map(|(sequence, owner)| Ok((from_bigint(sequence)?, owner)))
            .transpose()
    }

    async fn apply_unique_constraint(
        tx: &mut Transaction<'static, Postgres>,
        constraint: &UniqueConstraint,
    ) -> Result<(), EventstoreError> {
        match constraint.action {
            UniqueConstraintAction::Add => {
                let result = sqlx::query(&format!(
                    "INSERT INTO {UNIQUE_CONSTRAINTS_TABLE} (unique_type, unique_field) \
                     VALUES ($1, $2) ON CONFLICT DO NOTHING"
                ))
                .bind(&constraint.unique_type)
                .bind(&constraint.unique_field)
                .execute(&mut **tx)
                .await
                .map_err(infrastructure)?;
                if result.rows_affected() == 0 {
                    return Err(EventstoreError::UniqueConstraintViolation {
                        unique_type: constraint.unique_type.clone(),
                        unique_field: constraint.unique_field.clone(),
                        message: constraint.error_message.clone(),
                    });
                }
            }
            UniqueConstraintAction::Remove => {
                sqlx::query(&format!(
                    "DELETE FROM {UNIQUE_CONSTRAINTS_TABLE} WHERE unique_type = $1 AND unique_field = $2"
                ))
                .bind(&constraint.unique_type)
                .bind(&constraint.unique_field)
                .execute(&mut **tx)
                .await
                .map_err(infrastructure)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[instrument(skip_all, fields(aggregates = pushes.len()), err)]
    async fn push(&self, pushes: Vec<AggregatePush>) -> Result<Vec<Event>, EventstoreError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;
        Self::lock_streams(&mut tx, &pushes).await?;
        let creation_date = self.clock.now();
        let mut stored = Vec::new();

        for push in pushes {
            let head = Self::stream_head(&mut tx, &push).await?;
            let actual = head.as_ref().map_or(0, |(sequence, _)| *sequence);
            if actual != push.expected_sequence {
                return Err(EventstoreError::ConcurrencyConflict {
                    aggregate_type: push.aggregate_type,
                    aggregate_id: push.aggregate_id,
                    expected: push.expected_sequence,
                    actual,
                });
            }
            let resource_owner = head.map_or_else(|| push.resource_owner.clone(), |(_, owner)| owner);

            for constraint in &push.unique_constraints {
                Self::apply_unique_constraint(&mut tx, constraint).await?;
            }

            let mut sequence = actual;
            for pending in push.events {
                sequence += 1;
                let row: EventRow = sqlx::query_as(&format!(
                    "INSERT INTO {EVENTS_TABLE} (event_id, aggregate_type, aggregate_id, \
                     aggregate_version, resource_owner, event_type, sequence, previous_sequence, \
                     creation_date, editor_user, editor_service, payload) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                     RETURNING {EVENT_COLUMNS}"
                ))
                .bind(Uuid::now_v7())
                .bind(push.aggregate_type.as_str())
                .bind(&push.aggregate_id)
                .bind(&pending.aggregate_version)
                .bind(&resource_owner)
                .bind(pending.event_type.as_str())
                .bind(to_bigint(sequence)?)
                .bind(to_bigint(sequence - 1)?)
                .bind(creation_date)
                .bind(&pending.editor.user)
                .bind(&pending.editor.service)
                .bind(&pending.payload)
                .fetch_one(&mut *tx)
                .await
                .map_err(infrastructure)?;
                stored.push(Event::try_from(row)?);
            }
        }

        tx.commit().await.map_err(infrastructure)?;
        debug!(events = stored.len(), "push committed");
        Ok(stored)
    }

    #[instrument(skip_all, err)]
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Event>, EventstoreError> {
        let mut builder = sql::select_events(query)?;
        let rows: Vec<EventRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        rows.into_iter().map(Event::try_from).collect()
    }

    #[instrument(skip_all, err)]
    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        let mut builder = sql::select_max_sequence(query)?;
        let (sequence,): (i64,) = builder
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)?;
        from_bigint(sequence)
    }
}
