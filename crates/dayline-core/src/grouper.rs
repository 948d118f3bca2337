//! Meta-session grouping.
//!
//! Imports recorded independently (one file per sensor, one payload per
//! API page) are clustered into meta-sessions: runs of batches whose time
//! ranges lie within a bounded gap of one another. A meta-session is the
//! unit matched against each day during reconciliation.

use chrono::{Duration, NaiveDateTime};

use crate::models::ImportBatch;

/// Maximum gap between two batches of the same meta-session.
pub fn default_merge_gap() -> Duration {
    Duration::hours(1)
}

/// A temporally-adjacent group of import batches.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaSession {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub batches: Vec<ImportBatch>,
}

impl MetaSession {
    pub fn from_batch(batch: ImportBatch) -> Self {
        Self {
            start_time: batch.start_time,
            end_time: batch.end_time,
            batches: vec![batch],
        }
    }

    /// Whether `batch` lies within `gap` of this group on either side.
    ///
    /// A bound that overflows the calendar accepts everything on that side.
    pub fn can_absorb(&self, batch: &ImportBatch, gap: Duration) -> bool {
        let reaches_end = self
            .end_time
            .checked_add_signed(gap)
            .map_or(true, |end| batch.start_time <= end);
        let reaches_start = self
            .start_time
            .checked_sub_signed(gap)
            .map_or(true, |start| batch.end_time >= start);
        reaches_end && reaches_start
    }

    pub fn absorb(&mut self, batch: ImportBatch) {
        self.start_time = self.start_time.min(batch.start_time);
        self.end_time = self.end_time.max(batch.end_time);
        self.batches.push(batch);
    }
}

/// Sort batches by start time. Equal start times keep their input order.
pub fn sort_batches(batches: &mut [ImportBatch]) {
    batches.sort_by_key(|b| b.start_time);
}

/// Group batches into meta-sessions.
///
/// Batches are processed in ascending start order; a batch starting more
/// than `gap` after the current group's end opens a new group.
pub fn group_batches(mut batches: Vec<ImportBatch>, gap: Duration) -> Vec<MetaSession> {
    sort_batches(&mut batches);

    batches
        .into_iter()
        .fold(Vec::<MetaSession>::new(), |mut groups, batch| {
            match groups.last_mut() {
                Some(current) if current.can_absorb(&batch, gap) => current.absorb(batch),
                _ => groups.push(MetaSession::from_batch(batch)),
            }
            groups
        })
}
