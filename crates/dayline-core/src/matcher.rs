//! Session matching.
//!
//! Decides whether two sessions describe the same real-world recording,
//! whether a meta-session is worth inspecting against a day, and which
//! existing session anchors a splice.

use chrono::NaiveDateTime;

use crate::grouper::MetaSession;
use crate::models::{Day, ImportBatch, Session, Signal, SourceType};

/// Anything occupying a half-open `[start, end)` interval.
pub trait TimeSpan {
    fn span_start(&self) -> NaiveDateTime;
    fn span_end(&self) -> NaiveDateTime;
}

impl TimeSpan for Session {
    fn span_start(&self) -> NaiveDateTime {
        self.start_time
    }
    fn span_end(&self) -> NaiveDateTime {
        self.end_time
    }
}

impl TimeSpan for Signal {
    fn span_start(&self) -> NaiveDateTime {
        self.start_time
    }
    fn span_end(&self) -> NaiveDateTime {
        self.end_time()
    }
}

impl TimeSpan for ImportBatch {
    fn span_start(&self) -> NaiveDateTime {
        self.start_time
    }
    fn span_end(&self) -> NaiveDateTime {
        self.end_time
    }
}

impl TimeSpan for MetaSession {
    fn span_start(&self) -> NaiveDateTime {
        self.start_time
    }
    fn span_end(&self) -> NaiveDateTime {
        self.end_time
    }
}

/// Half-open interval overlap. Touching endpoints do not overlap.
pub fn times_overlap<A: TimeSpan + ?Sized, B: TimeSpan + ?Sized>(a: &A, b: &B) -> bool {
    a.span_start() < b.span_end() && b.span_start() < a.span_end()
}

/// Whether `incoming` is already represented on the day by `existing`.
pub fn is_duplicate(existing: &Session, incoming: &Session) -> bool {
    existing.source_type == incoming.source_type && times_overlap(existing, incoming)
}

/// Whether the day already holds a session equivalent to `incoming`.
pub fn day_contains(day: &Day, incoming: &Session) -> bool {
    day.sessions.iter().any(|s| is_duplicate(s, incoming))
}

/// Whether a meta-session's aggregate range overlaps the day's recording range.
pub fn is_merge_candidate(meta: &MetaSession, day: &Day) -> bool {
    match day.recording_range() {
        Some((start, end)) => meta.start_time < end && start < meta.end_time,
        None => false,
    }
}

/// Source types whose sessions may anchor a splice.
pub fn is_anchor_source(source_type: SourceType) -> bool {
    matches!(source_type, SourceType::Device | SourceType::PulseOximetry)
}

fn strictly_contains(session: &Session, t: NaiveDateTime) -> bool {
    session.start_time < t && t < session.end_time
}

/// Anchor for extending a signal backwards: of the anchor-eligible sessions
/// strictly containing `t`, the one that starts earliest. Ties keep the
/// first in day order.
pub fn find_start_anchor(sessions: &[Session], t: NaiveDateTime) -> Option<&Session> {
    sessions
        .iter()
        .filter(|s| is_anchor_source(s.source_type) && strictly_contains(s, t))
        .fold(None, |best: Option<&Session>, s| match best {
            Some(b) if b.start_time <= s.start_time => Some(b),
            _ => Some(s),
        })
}

/// Anchor for extending a signal forwards: of the anchor-eligible sessions
/// strictly containing `t`, the one that ends latest. Ties keep the last in
/// day order.
pub fn find_end_anchor(sessions: &[Session], t: NaiveDateTime) -> Option<&Session> {
    sessions
        .iter()
        .filter(|s| is_anchor_source(s.source_type) && strictly_contains(s, t))
        .max_by_key(|s| s.end_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn session(source_type: SourceType, start: NaiveDateTime, end: NaiveDateTime) -> Session {
        Session {
            source_type,
            start_time: start,
            end_time: end,
            signals: Vec::new(),
        }
    }

    #[test]
    fn test_touching_sessions_do_not_overlap() {
        let a = session(SourceType::Device, at(1, 0), at(2, 0));
        let b = session(SourceType::Device, at(2, 0), at(3, 0));
        assert!(!times_overlap(&a, &b));
        assert!(!times_overlap(&b, &a));
    }

    #[test]
    fn test_contained_session_overlaps() {
        let outer = session(SourceType::Device, at(1, 0), at(5, 0));
        let inner = session(SourceType::Device, at(2, 0), at(3, 0));
        assert!(times_overlap(&outer, &inner));
        assert!(times_overlap(&inner, &outer));
    }

    #[test]
    fn test_duplicate_requires_same_source() {
        let device = session(SourceType::Device, at(22, 0), at(23, 0));
        let oxi = session(SourceType::PulseOximetry, at(22, 0), at(23, 0));
        assert!(!is_duplicate(&device, &oxi));
        assert!(is_duplicate(&device, &device.clone()));
    }

    #[test]
    fn test_merge_candidate_needs_recorded_day() {
        let mut day = Day::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let batch = ImportBatch::from_parts(
            "a",
            vec![session(SourceType::PulseOximetry, at(22, 0), at(23, 0))],
            Vec::new(),
        )
        .unwrap();
        let meta = MetaSession::from_batch(batch);
        assert!(!is_merge_candidate(&meta, &day));

        day.add_session(session(SourceType::Device, at(21, 0), at(22, 30)));
        assert!(is_merge_candidate(&meta, &day));

        let mut touching = Day::new(day.report_date);
        touching.add_session(session(SourceType::Device, at(21, 0), at(22, 0)));
        assert!(!is_merge_candidate(&meta, &touching));
    }

    #[test]
    fn test_start_anchor_prefers_earliest_start() {
        let sessions = vec![
            session(SourceType::Device, at(21, 0), at(23, 0)),
            session(SourceType::PulseOximetry, at(21, 30), at(23, 0)),
            session(SourceType::HealthApi, at(20, 0), at(23, 0)),
        ];
        let anchor = find_start_anchor(&sessions, at(22, 0)).unwrap();
        assert_eq!(anchor.start_time, at(21, 0));
    }

    #[test]
    fn test_end_anchor_prefers_latest_end() {
        let sessions = vec![
            session(SourceType::Device, at(21, 0), at(6, 0) + chrono::Duration::days(1)),
            session(SourceType::Device, at(21, 0), at(7, 0) + chrono::Duration::days(1)),
        ];
        let t = at(5, 0) + chrono::Duration::days(1);
        let anchor = find_end_anchor(&sessions, t).unwrap();
        assert_eq!(anchor.end_time, at(7, 0) + chrono::Duration::days(1));
    }

    #[test]
    fn test_anchor_requires_strict_containment() {
        let sessions = vec![session(SourceType::Device, at(22, 0), at(23, 0))];
        assert!(find_start_anchor(&sessions, at(22, 0)).is_none());
        assert!(find_end_anchor(&sessions, at(23, 0)).is_none());
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(
            a_start in 0i64..1000, a_len in 0i64..500,
            b_start in 0i64..1000, b_len in 0i64..500,
        ) {
            let base = at(0, 0);
            let a = session(
                SourceType::Device,
                base + chrono::Duration::minutes(a_start),
                base + chrono::Duration::minutes(a_start + a_len),
            );
            let b = session(
                SourceType::Device,
                base + chrono::Duration::minutes(b_start),
                base + chrono::Duration::minutes(b_start + b_len),
            );
            prop_assert_eq!(times_overlap(&a, &b), times_overlap(&b, &a));
            if a_start + a_len == b_start {
                prop_assert!(!times_overlap(&a, &b));
            }
        }
    }
}
