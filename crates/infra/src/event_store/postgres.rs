//! Postgres-backed event store (feature `postgres`).
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE events (
//!     event_id        UUID PRIMARY KEY,
//!     aggregate_id    UUID        NOT NULL,
//!     aggregate_type  TEXT        NOT NULL,
//!     sequence_number BIGINT      NOT NULL CHECK (sequence_number > 0),
//!     event_type      TEXT        NOT NULL,
//!     event_version   INTEGER     NOT NULL,
//!     occurred_at     TIMESTAMPTZ NOT NULL,
//!     payload         JSONB       NOT NULL,
//!     created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     UNIQUE (aggregate_id, sequence_number)
//! );
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `EventStoreError` |
//! |---|---|---|
//! | unique violation | `23505` | `Concurrency` (a concurrent append won the sequence number) |
//! | check violation | `23514` | `InvalidAppend` |
//! | any other | | `Backend` |
//!
//! The [`EventStore`] trait is synchronous; calls bridge into the ambient
//! tokio runtime with `Handle::block_on`, so they must run on a blocking
//! thread (e.g. inside `spawn_blocking`), never directly on an async worker.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;

use shelf_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Postgres-backed append-only event store.
///
/// `append` runs in one transaction: read the stream head, check the expected
/// version, insert the batch. Two writers racing past the version check are
/// separated by the `(aggregate_id, sequence_number)` unique constraint.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    pub async fn load_stream_async(
        &self,
        aggregate_id: AggregateId,
        after: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_id = $1 AND sequence_number > $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .bind(after as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(stored_event_from_row).collect()
    }

    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_async(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let aggregate_id = first.aggregate_id;
        let aggregate_type = first.aggregate_type.clone();

        if let Some(idx) = events
            .iter()
            .position(|e| e.aggregate_id != aggregate_id || e.aggregate_type != aggregate_type)
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch mixes streams (index {idx})"
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_type) = stream_head(&mut tx, aggregate_id).await?;

        if let Some(existing) = existing_type {
            if existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current_version) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut next = current_version + 1;
        let mut committed = Vec::with_capacity(events.len());
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, aggregate_id, aggregate_type, sequence_number,
                    event_type, event_version, occurred_at, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id)
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(next as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number: next,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }

    pub async fn stream_ids_async(&self, aggregate_type: &str) -> Result<Vec<AggregateId>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT aggregate_id
            FROM events
            WHERE aggregate_type = $1
            "#,
        )
        .bind(aggregate_type)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stream_ids", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<uuid::Uuid, _>("aggregate_id")
                    .map(AggregateId::from_uuid)
                    .map_err(|e| EventStoreError::Backend(format!("failed to read aggregate_id: {e}")))
            })
            .collect()
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        runtime()?.block_on(self.append_async(events, expected_version))
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        runtime()?.block_on(self.load_stream_async(aggregate_id, 0))
    }

    fn load_stream_after(
        &self,
        aggregate_id: AggregateId,
        after: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        runtime()?.block_on(self.load_stream_async(aggregate_id, after))
    }

    fn stream_ids(&self, aggregate_type: &str) -> Result<Vec<AggregateId>, EventStoreError> {
        runtime()?.block_on(self.stream_ids_async(aggregate_type))
    }
}

fn runtime() -> Result<tokio::runtime::Handle, EventStoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::Backend("PostgresEventStore requires a tokio runtime context".to_string())
    })
}

async fn stream_head(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE aggregate_id = $1
        "#,
    )
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("stream_head", e))?;

    let current_version: i64 = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::Backend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::Backend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current_version as u64, aggregate_type))
}

fn stored_event_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let read = |e: sqlx::Error| EventStoreError::Backend(format!("failed to decode event row: {e}"));

    let sequence_number: i64 = row.try_get("sequence_number").map_err(read)?;
    let event_version: i32 = row.try_get("event_version").map_err(read)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(read)?;
    let aggregate_id: uuid::Uuid = row.try_get("aggregate_id").map_err(read)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(read)?,
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type: row.try_get("aggregate_type").map_err(read)?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(read)?,
        event_version: event_version as u32,
        occurred_at,
        payload: row.try_get("payload").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
