//! Import transaction coordination.
//!
//! Drives day-by-day reconciliation of grouped import batches inside a
//! single store transaction:
//!
//! ```text
//! batches ──▶ prepare_meta_sessions ──▶ reconcile_import
//!                                          │  begin
//!                                          │  for date in range (ascending):
//!                                          │      load → reconcile_day → save if modified
//!                                          │  commit (or rollback on any error)
//!                                          ▼
//!                                    ImportSummary
//! ```
//!
//! Any failure after the transaction opens rolls back every day touched
//! by the run, so storage is either fully updated or left unchanged.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use dayline_core::grouper::{group_batches, MetaSession};
use dayline_core::models::{Day, ImportBatch};
use dayline_core::reconcile::{merge_candidates, reconcile_day, ReconcileOptions};
use dayline_core::store::{Store, StoreTransaction};
use dayline_core::ImportError;

use crate::progress::{ImportProgressEvent, ImportProgressReporter};

/// Shared cancellation request, checked between days.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one [`reconcile_import`] run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Days added on each side of the meta-session range.
    pub margin_days: i64,
    pub reconcile: ReconcileOptions,
    /// Roll back instead of committing once every day has been processed.
    pub dry_run: bool,
    pub cancel: CancelFlag,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            margin_days: 1,
            reconcile: ReconcileOptions::default(),
            dry_run: false,
            cancel: CancelFlag::new(),
        }
    }
}

/// Totals for a completed import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub days_updated: usize,
    pub sessions_added: usize,
    pub events_added: usize,
    /// Dates saved by the run, ascending.
    pub updated_dates: Vec<NaiveDate>,
    /// Latest date that received new data; `None` when nothing changed.
    pub most_recent_date: Option<NaiveDate>,
}

/// The user-visible result of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Updated(usize),
    NothingNew,
    Failed,
}

impl ImportOutcome {
    pub fn from_result(result: &Result<ImportSummary, ImportError>) -> Self {
        match result {
            Ok(summary) if summary.days_updated > 0 => ImportOutcome::Updated(summary.days_updated),
            Ok(_) => ImportOutcome::NothingNew,
            Err(_) => ImportOutcome::Failed,
        }
    }

    /// The message for a run that may have been a dry run.
    pub fn describe(&self, dry_run: bool) -> String {
        match (self, dry_run) {
            (ImportOutcome::Updated(1), true) => {
                "1 day would be updated (dry-run, nothing written)".to_string()
            }
            (ImportOutcome::Updated(n), true) => {
                format!("{} days would be updated (dry-run, nothing written)", n)
            }
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportOutcome::Updated(1) => f.write_str("1 day updated"),
            ImportOutcome::Updated(n) => write!(f, "{} days updated", n),
            ImportOutcome::NothingNew => f.write_str("nothing new to import"),
            ImportOutcome::Failed => f.write_str("import failed, no changes made"),
        }
    }
}

/// First date an incremental import should consider: the most recent
/// imported date, but never more than `lookback_days` before `today`.
///
/// A lookback reaching past the calendar floors at [`NaiveDate::MIN`].
pub fn import_window_start(
    most_recent: Option<NaiveDate>,
    today: NaiveDate,
    lookback_days: i64,
) -> NaiveDate {
    let floor = Duration::try_days(lookback_days)
        .and_then(|lookback| today.checked_sub_signed(lookback))
        .unwrap_or(NaiveDate::MIN);
    most_recent.map_or(floor, |recent| recent.max(floor))
}

/// The day range `[first - margin, last + margin]`, or `None` when either
/// end falls off the calendar.
fn widened_range(
    first: NaiveDate,
    last: NaiveDate,
    margin_days: i64,
) -> Option<(NaiveDate, NaiveDate)> {
    let margin = Duration::try_days(margin_days)?;
    Some((
        first.checked_sub_signed(margin)?,
        last.checked_add_signed(margin)?,
    ))
}

/// Drop batches that end before `since`, then group the rest.
pub fn prepare_meta_sessions(
    batches: Vec<ImportBatch>,
    since: Option<NaiveDate>,
    merge_gap: Duration,
) -> Vec<MetaSession> {
    let before = batches.len();
    let kept: Vec<ImportBatch> = match since {
        Some(since) => batches
            .into_iter()
            .filter(|b| b.end_time.date() >= since)
            .collect(),
        None => batches,
    };
    if kept.len() < before {
        debug!(
            skipped = before - kept.len(),
            ?since,
            "skipping batches outside the import window"
        );
    }
    group_batches(kept, merge_gap)
}

/// Reconcile `metas` into every stored day they may touch.
///
/// The date range is the union of the meta-session ranges widened by
/// `margin_days` on each side. Days that do not exist are skipped; a day
/// is saved only when reconciliation changed it. Everything happens in one
/// transaction, committed once at the end.
pub async fn reconcile_import(
    store: &dyn Store,
    profile_id: i64,
    metas: &[MetaSession],
    options: &ImportOptions,
    progress: &dyn ImportProgressReporter,
) -> Result<ImportSummary, ImportError> {
    let (Some(first), Some(last)) = (
        metas.iter().map(|m| m.start_time.date()).min(),
        metas.iter().map(|m| m.end_time.date()).max(),
    ) else {
        progress.report(ImportProgressEvent::Finished { days_updated: 0 });
        return Ok(ImportSummary::default());
    };
    let (min_date, max_date) =
        widened_range(first, last, options.margin_days).ok_or_else(|| {
            ImportError::InvariantViolation(format!(
                "margin of {} days around {}..{} leaves the calendar",
                options.margin_days, first, last
            ))
        })?;

    info!(%min_date, %max_date, meta_sessions = metas.len(), "reconciling import");

    let mut tx = store.begin().await.map_err(ImportError::Store)?;
    let result = reconcile_range(
        tx.as_mut(),
        profile_id,
        metas,
        min_date,
        max_date,
        options,
        progress,
    )
    .await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            warn!("rolling back import: {}", e);
            if let Err(rollback_err) = tx.rollback().await {
                warn!("rollback failed: {:#}", rollback_err);
            }
            return Err(e);
        }
    };

    if options.dry_run {
        tx.rollback().await.map_err(ImportError::Store)?;
    } else {
        tx.commit().await.map_err(ImportError::Store)?;
    }

    info!(
        days_updated = summary.days_updated,
        sessions_added = summary.sessions_added,
        dry_run = options.dry_run,
        "import finished"
    );
    progress.report(ImportProgressEvent::Finished {
        days_updated: summary.days_updated as u64,
    });
    Ok(summary)
}

async fn reconcile_range(
    tx: &mut dyn StoreTransaction,
    profile_id: i64,
    metas: &[MetaSession],
    min_date: NaiveDate,
    max_date: NaiveDate,
    options: &ImportOptions,
    progress: &dyn ImportProgressReporter,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();

    for date in min_date.iter_days().take_while(|d| *d <= max_date) {
        if options.cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let Some(mut day) = tx
            .load_day(profile_id, date)
            .await
            .map_err(ImportError::Store)?
        else {
            continue;
        };

        let candidates = merge_candidates(&day, metas);
        if candidates.is_empty() {
            continue;
        }

        progress.report(ImportProgressEvent::Reconciling { date });
        let merge = reconcile_day(&mut day, &candidates, &options.reconcile)?;
        if !merge.modified() {
            debug!(%date, "day already up to date");
            continue;
        }

        tx.save_day(profile_id, &day)
            .await
            .map_err(ImportError::Store)?;

        debug!(
            %date,
            sessions = merge.sessions_added,
            events = merge.events_added,
            "day updated"
        );
        summary.days_updated += 1;
        summary.sessions_added += merge.sessions_added;
        summary.events_added += merge.events_added;
        summary.updated_dates.push(date);
        summary.most_recent_date = Some(date);
    }

    Ok(summary)
}

/// Totals for a device-day import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceImportSummary {
    pub days_created: usize,
    pub days_merged: usize,
    pub days_skipped: usize,
    /// The store's most recent date after the run; `None` when nothing was written.
    pub most_recent_date: Option<NaiveDate>,
}

/// Import fully-formed days read from a therapy device.
///
/// Days older than the most recent stored date are skipped. A day that is
/// not stored yet is saved as-is; a stored day receives the incoming
/// sessions it does not already have (with their events), reconciled the
/// same way as any other import. All writes share one transaction.
pub async fn import_device_days(
    store: &dyn Store,
    profile_id: i64,
    mut days: Vec<Day>,
    options: &ReconcileOptions,
) -> Result<DeviceImportSummary, ImportError> {
    days.sort_by_key(|d| d.report_date);

    let mut tx = store.begin().await.map_err(ImportError::Store)?;
    match import_days_in(tx.as_mut(), profile_id, days, options).await {
        Ok(summary) => {
            tx.commit().await.map_err(ImportError::Store)?;
            info!(
                created = summary.days_created,
                merged = summary.days_merged,
                skipped = summary.days_skipped,
                "device import finished"
            );
            Ok(summary)
        }
        Err(e) => {
            warn!("rolling back device import: {}", e);
            if let Err(rollback_err) = tx.rollback().await {
                warn!("rollback failed: {:#}", rollback_err);
            }
            Err(e)
        }
    }
}

async fn import_days_in(
    tx: &mut dyn StoreTransaction,
    profile_id: i64,
    days: Vec<Day>,
    options: &ReconcileOptions,
) -> Result<DeviceImportSummary, ImportError> {
    let mut summary = DeviceImportSummary::default();
    let latest = tx
        .most_recent_date(profile_id)
        .await
        .map_err(ImportError::Store)?;

    for mut incoming in days {
        let date = incoming.report_date;
        if latest.is_some_and(|l| date < l) || incoming.sessions.is_empty() {
            summary.days_skipped += 1;
            continue;
        }

        match tx
            .load_day(profile_id, date)
            .await
            .map_err(ImportError::Store)?
        {
            None => {
                incoming.refresh_recording_range();
                incoming.sort_events();
                tx.save_day(profile_id, &incoming)
                    .await
                    .map_err(ImportError::Store)?;
                summary.days_created += 1;
            }
            Some(mut stored) => {
                let Some(batch) =
                    ImportBatch::from_parts("device", incoming.sessions, incoming.events)
                else {
                    summary.days_skipped += 1;
                    continue;
                };
                let meta = MetaSession::from_batch(batch);
                let merge = reconcile_day(&mut stored, &[&meta], options)?;
                if merge.modified() {
                    tx.save_day(profile_id, &stored)
                        .await
                        .map_err(ImportError::Store)?;
                    summary.days_merged += 1;
                } else {
                    summary.days_skipped += 1;
                }
            }
        }
    }

    if summary.days_created + summary.days_merged > 0 {
        summary.most_recent_date = tx
            .most_recent_date(profile_id)
            .await
            .map_err(ImportError::Store)?;
    }
    Ok(summary)
}
