//! In-memory [`Store`] implementation for testing.
//!
//! Days live in a `BTreeMap` behind `std::sync::RwLock`. A transaction
//! works on a private copy of the map taken at [`Store::begin`] and
//! replaces the shared map wholesale on commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::Day;

use super::{Store, StoreTransaction};

type DayMap = BTreeMap<(i64, NaiveDate), Day>;

/// In-memory store for tests and dry runs.
pub struct InMemoryStore {
    days: Arc<RwLock<DayMap>>,
    committed_saves: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            days: Arc::new(RwLock::new(BTreeMap::new())),
            committed_saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seed a day directly, bypassing transactions and the save counter.
    pub fn insert_day(&self, profile_id: i64, day: Day) {
        self.days
            .write()
            .unwrap()
            .insert((profile_id, day.report_date), day);
    }

    /// Number of `save_day` calls made by transactions that committed.
    pub fn save_count(&self) -> usize {
        self.committed_saves.load(Ordering::SeqCst)
    }

    pub fn day_count(&self) -> usize {
        self.days.read().unwrap().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn latest_date(days: &DayMap, profile_id: i64) -> Option<NaiveDate> {
    days.keys()
        .filter(|(profile, _)| *profile == profile_id)
        .map(|(_, date)| *date)
        .max()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let working = self.days.read().unwrap().clone();
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.days),
            committed_saves: Arc::clone(&self.committed_saves),
            working,
            pending_saves: 0,
            finished: false,
        }))
    }

    async fn load_day(&self, profile_id: i64, date: NaiveDate) -> Result<Option<Day>> {
        Ok(self.days.read().unwrap().get(&(profile_id, date)).cloned())
    }

    async fn most_recent_date(&self, profile_id: i64) -> Result<Option<NaiveDate>> {
        Ok(latest_date(&self.days.read().unwrap(), profile_id))
    }

    async fn list_days(
        &self,
        profile_id: i64,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<Vec<Day>> {
        let days = self.days.read().unwrap();
        Ok(days
            .iter()
            .filter(|((profile, date), _)| {
                *profile == profile_id
                    && since.map_or(true, |s| *date >= s)
                    && until.map_or(true, |u| *date <= u)
            })
            .map(|(_, day)| day.clone())
            .collect())
    }
}

/// Snapshot transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    shared: Arc<RwLock<DayMap>>,
    committed_saves: Arc<AtomicUsize>,
    working: DayMap,
    pending_saves: usize,
    finished: bool,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            bail!("transaction already finished");
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn load_day(&mut self, profile_id: i64, date: NaiveDate) -> Result<Option<Day>> {
        self.ensure_open()?;
        Ok(self.working.get(&(profile_id, date)).cloned())
    }

    async fn save_day(&mut self, profile_id: i64, day: &Day) -> Result<()> {
        self.ensure_open()?;
        self.working
            .insert((profile_id, day.report_date), day.clone());
        self.pending_saves += 1;
        Ok(())
    }

    async fn most_recent_date(&mut self, profile_id: i64) -> Result<Option<NaiveDate>> {
        self.ensure_open()?;
        Ok(latest_date(&self.working, profile_id))
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.finished = true;
        *self.shared.write().unwrap() = std::mem::take(&mut self.working);
        self.committed_saves
            .fetch_add(self.pending_saves, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.finished = true;
        self.working.clear();
        self.pending_saves = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_commit_publishes_saves() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.save_day(1, &Day::new(date(2))).await.unwrap();

        assert!(store.load_day(1, date(2)).await.unwrap().is_none());
        assert_eq!(tx.most_recent_date(1).await.unwrap(), Some(date(2)));

        tx.commit().await.unwrap();
        assert!(store.load_day(1, date(2)).await.unwrap().is_some());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_saves() {
        let store = InMemoryStore::new();
        store.insert_day(1, Day::new(date(1)));

        let mut tx = store.begin().await.unwrap();
        tx.save_day(1, &Day::new(date(2))).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut dropped = store.begin().await.unwrap();
            dropped.save_day(1, &Day::new(date(3))).await.unwrap();
        }

        assert_eq!(store.day_count(), 1);
        assert_eq!(store.save_count(), 0);
        assert_eq!(store.most_recent_date(1).await.unwrap(), Some(date(1)));
    }

    #[tokio::test]
    async fn test_finished_transaction_rejects_writes() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.save_day(1, &Day::new(date(1))).await.is_err());
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_profiles_are_isolated() {
        let store = InMemoryStore::new();
        store.insert_day(1, Day::new(date(5)));
        store.insert_day(2, Day::new(date(9)));

        assert_eq!(store.most_recent_date(1).await.unwrap(), Some(date(5)));
        let days = store.list_days(2, Some(date(1)), None).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].report_date, date(9));
        assert!(store.list_days(1, None, Some(date(4))).await.unwrap().is_empty());
    }
}
