//! Day reconciliation.
//!
//! Merges the sessions of overlapping meta-sessions into one stored [`Day`].
//! A session already represented on the day (same source type, overlapping
//! interval) is skipped, so reconciling the same input twice leaves the day
//! untouched the second time.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::ImportError;
use crate::grouper::MetaSession;
use crate::matcher::{day_contains, find_end_anchor, find_start_anchor, is_merge_candidate};
use crate::models::{Day, Event, Session, SIGNAL_PULSE, SIGNAL_SPO2};
use crate::splice::{splice_signal, FillerPolicy, SpliceDirection};

/// Caller-supplied policy for one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOptions {
    /// Signals eligible for splicing and the value they are padded with.
    pub fillers: FillerPolicy,
    /// Signals whose statistics are refreshed whenever a day changes.
    pub recompute_signals: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            fillers: FillerPolicy::default(),
            recompute_signals: vec![SIGNAL_SPO2.to_string(), SIGNAL_PULSE.to_string()],
        }
    }
}

/// What a reconciliation pass changed on one day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayMerge {
    pub sessions_added: usize,
    pub events_added: usize,
    pub signals_recomputed: Vec<String>,
}

impl DayMerge {
    /// Whether the day must be saved.
    pub fn modified(&self) -> bool {
        self.sessions_added > 0 || self.events_added > 0
    }
}

/// Meta-sessions whose aggregate range overlaps the day's recording range.
pub fn merge_candidates<'a>(day: &Day, metas: &'a [MetaSession]) -> Vec<&'a MetaSession> {
    metas.iter().filter(|m| is_merge_candidate(m, day)).collect()
}

/// Merge every non-duplicate session of `candidates` into `day`.
///
/// Spliceable signals of a new session are stretched back to the start of
/// the existing session containing its start, and forward to the end of the
/// existing session containing its end. Only the batch events that start
/// within the incoming session's original bounds are copied.
///
/// The day is mutated in place even when an error is returned; callers must
/// discard it rather than save it in that case.
pub fn reconcile_day(
    day: &mut Day,
    candidates: &[&MetaSession],
    options: &ReconcileOptions,
) -> Result<DayMerge, ImportError> {
    let mut merge = DayMerge::default();
    let mut added_signals: Vec<String> = Vec::new();

    for batch in candidates.iter().flat_map(|meta| meta.batches.iter()) {
        for incoming in &batch.sessions {
            if day_contains(day, incoming) {
                continue;
            }

            let (original_start, original_end) = (incoming.start_time, incoming.end_time);
            let mut session = incoming.clone();
            align_to_anchors(&mut session, &day.sessions, &options.fillers)?;

            for signal in &session.signals {
                if !added_signals.contains(&signal.name) {
                    added_signals.push(signal.name.clone());
                }
            }

            debug!(
                date = %day.report_date,
                source = %batch.source,
                source_type = %session.source_type,
                start = %session.start_time,
                end = %session.end_time,
                "adding session"
            );
            day.add_session(session);
            merge.sessions_added += 1;

            let events = batch
                .events
                .iter()
                .filter(|e| e.start_time >= original_start && e.start_time < original_end);
            merge.events_added += copy_new_events(&mut day.events, events);
        }
    }

    if merge.modified() {
        let mut names = options.recompute_signals.clone();
        for name in added_signals {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        for name in &names {
            day.update_signal_statistics(name);
        }
        merge.signals_recomputed = names;
        day.sort_events();
    }

    Ok(merge)
}

/// Splice each spliceable signal of `session` towards the anchoring
/// sessions already on the day, then widen the session to its signals.
fn align_to_anchors(
    session: &mut Session,
    existing: &[Session],
    fillers: &FillerPolicy,
) -> Result<(), ImportError> {
    if fillers.is_empty() {
        return Ok(());
    }

    let start_target: Option<NaiveDateTime> =
        find_start_anchor(existing, session.start_time).map(|s| s.start_time);
    let end_target: Option<NaiveDateTime> =
        find_end_anchor(existing, session.end_time).map(|s| s.end_time);

    if start_target.is_none() && end_target.is_none() {
        return Ok(());
    }

    for signal in session.signals.iter_mut() {
        let Some(filler) = fillers.filler_for(&signal.name) else {
            continue;
        };
        if let Some(target) = start_target {
            let outcome = splice_signal(signal, target, SpliceDirection::ExtendStart, filler)?;
            debug!(signal = %signal.name, added = outcome.samples_added, start = %outcome.start_time, "extended signal start");
        }
        if let Some(target) = end_target {
            let outcome = splice_signal(signal, target, SpliceDirection::ExtendEnd, filler)?;
            debug!(signal = %signal.name, added = outcome.samples_added, end = %outcome.end_time, "extended signal end");
        }
    }

    session.fit_to_signals();
    Ok(())
}

fn copy_new_events<'a>(
    target: &mut Vec<Event>,
    incoming: impl Iterator<Item = &'a Event>,
) -> usize {
    let mut added = 0;
    for event in incoming {
        if !target.contains(event) {
            target.push(event.clone());
            added += 1;
        }
    }
    added
}
