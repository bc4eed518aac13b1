//! Daily-log persistence seam.
//!
//! The aggregation operations in `services::logging` are written against the
//! `DailyLogStore` trait rather than a concrete backend, so the core is
//! testable without a live database. Production runs on Postgres; the
//! in-memory backend serves tests and database-less local runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::models::daily_log::{ActivityEntry, DailyLog, TotalsDelta};

mod feed;
mod memory;
mod postgres;

pub use memory::MemoryLogStore;
pub use postgres::PgLogStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The record's revision no longer matches what the caller read.
    #[error("concurrent modification")]
    Conflict,

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A live subscription to one (user, date) record: the state at subscribe
/// time plus a receiver that yields the updated record after every write.
/// Dropping the receiver unsubscribes.
pub struct LogSubscription {
    pub current: Option<DailyLog>,
    pub updates: broadcast::Receiver<DailyLog>,
}

#[async_trait]
pub trait DailyLogStore: Send + Sync {
    /// Point-in-time read. Absence is a normal `Ok(None)`, distinct from
    /// failure.
    async fn fetch(&self, user_id: Uuid, date: NaiveDate) -> Result<Option<DailyLog>, StoreError>;

    /// Ascending-by-date range read for the analytics screens.
    async fn fetch_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyLog>, StoreError>;

    /// Create-or-increment in one store-native statement: seeds a new record
    /// with `deltas` as its initial totals and `entry` as the sole list
    /// element, or increments each total and appends the entry. The numeric
    /// increments and the list append ride the same statement, so they
    /// succeed or fail together.
    async fn upsert_append(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        deltas: &TotalsDelta,
        entry: &ActivityEntry,
    ) -> Result<DailyLog, StoreError>;

    /// Conditional full-list replace plus totals adjustment. Applies only if
    /// the record's revision still equals `expected_revision`; otherwise
    /// `Err(StoreError::Conflict)` so the caller can re-read and retry.
    async fn rewrite_activities(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        expected_revision: i64,
        activities: &[ActivityEntry],
        deltas: &TotalsDelta,
    ) -> Result<DailyLog, StoreError>;

    /// Register for pushes on one (user, date) record. Delivers the current
    /// state inline and every subsequent write through the receiver; must
    /// tolerate zero, one, or many writes over the subscription's lifetime.
    async fn subscribe(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<LogSubscription, StoreError>;
}

/// Pick the backend from config. The pool is shared with the rest of the app
/// either way; the memory backend simply never touches it.
pub fn build(config: &Config, pool: &PgPool) -> Arc<dyn DailyLogStore> {
    match config.store_backend {
        StoreBackend::Postgres => Arc::new(PgLogStore::new(pool.clone())),
        StoreBackend::Memory => {
            tracing::warn!("STORE_BACKEND=memory: daily logs will not survive a restart");
            Arc::new(MemoryLogStore::new())
        }
    }
}
