//! Storage abstraction for Dayline.
//!
//! The reconciliation pipeline only ever loads and saves whole [`Day`]s,
//! asks for the most recent stored date, and wraps a run in one
//! transaction. [`Store`] and [`StoreTransaction`] capture exactly that
//! surface so backends (SQLite, in-memory) are interchangeable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::Day;

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`begin`](Store::begin) | Open an exclusive write transaction |
/// | [`load_day`](Store::load_day) | Read a committed day |
/// | [`most_recent_date`](Store::most_recent_date) | Latest committed report date |
/// | [`list_days`](Store::list_days) | Committed days in a date range |
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction. Nothing written through it is visible to
    /// readers of the store until [`StoreTransaction::commit`] succeeds.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    async fn load_day(&self, profile_id: i64, date: NaiveDate) -> Result<Option<Day>>;

    async fn most_recent_date(&self, profile_id: i64) -> Result<Option<NaiveDate>>;

    /// Committed days with `since <= date <= until`, ascending.
    async fn list_days(
        &self,
        profile_id: i64,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<Vec<Day>>;
}

/// An open write transaction against a [`Store`].
///
/// Dropping a transaction without committing discards every write made
/// through it.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn load_day(&mut self, profile_id: i64, date: NaiveDate) -> Result<Option<Day>>;

    /// Insert the day or replace the stored day with the same date.
    async fn save_day(&mut self, profile_id: i64, day: &Day) -> Result<()>;

    async fn most_recent_date(&mut self, profile_id: i64) -> Result<Option<NaiveDate>>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
