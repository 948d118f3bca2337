//! Per-day signal statistics.

use crate::models::{Day, SignalStatistics};

/// Compute statistics for `signal_name` across every session of the day.
///
/// Samples outside a signal's declared `[min_value, max_value]` range are
/// treated as invalid readings and ignored. Returns `None` when no valid
/// samples remain.
pub fn signal_statistics(day: &Day, signal_name: &str) -> Option<SignalStatistics> {
    let mut unit = None;
    let mut values: Vec<f64> = Vec::new();

    for signal in day
        .sessions
        .iter()
        .filter_map(|session| session.signal(signal_name))
    {
        unit.get_or_insert_with(|| signal.unit.clone());
        values.extend(
            signal
                .samples
                .iter()
                .copied()
                .filter(|v| v.is_finite() && *v >= signal.min_value && *v <= signal.max_value),
        );
    }

    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let sum: f64 = values.iter().sum();

    Some(SignalStatistics {
        signal_name: signal_name.to_string(),
        unit: unit.unwrap_or_default(),
        minimum: values[0],
        average: sum / values.len() as f64,
        median: percentile(&values, 0.5),
        percentile_95: percentile(&values, 0.95),
        percentile_995: percentile(&values, 0.995),
        maximum: values[values.len() - 1],
    })
}

/// Nearest-rank percentile over sorted, non-empty values.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let index = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

impl Day {
    /// Recompute (or drop) the stored statistics entry for one signal.
    pub fn update_signal_statistics(&mut self, signal_name: &str) {
        let computed = signal_statistics(self, signal_name);
        let existing = self
            .statistics
            .iter()
            .position(|s| s.signal_name == signal_name);

        match (computed, existing) {
            (Some(stats), Some(index)) => self.statistics[index] = stats,
            (Some(stats), None) => self.statistics.push(stats),
            (None, Some(index)) => {
                self.statistics.remove(index);
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Session, Signal, SourceType, SIGNAL_PULSE, SIGNAL_SPO2};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn oximetry_session(start: NaiveDateTime, spo2: Vec<f64>) -> Session {
        let count = spo2.len() as i64;
        Session {
            source_type: SourceType::PulseOximetry,
            start_time: start,
            end_time: start + chrono::Duration::seconds(count),
            signals: vec![Signal {
                name: SIGNAL_SPO2.to_string(),
                unit: "%".to_string(),
                frequency_hz: 1.0,
                start_time: start,
                samples: spo2,
                min_value: 50.0,
                max_value: 100.0,
            }],
        }
    }

    #[test]
    fn test_statistics_span_all_sessions() {
        let mut day = Day::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        day.add_session(oximetry_session(at(1), vec![90.0, 92.0, 94.0]));
        day.add_session(oximetry_session(at(3), vec![96.0, 98.0]));

        let stats = signal_statistics(&day, SIGNAL_SPO2).unwrap();
        assert_eq!(stats.unit, "%");
        assert_eq!(stats.minimum, 90.0);
        assert_eq!(stats.maximum, 98.0);
        assert_eq!(stats.median, 94.0);
        assert!((stats.average - 94.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_samples_are_ignored() {
        let mut day = Day::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        day.add_session(oximetry_session(at(1), vec![0.0, 95.0, 127.0, 97.0]));

        let stats = signal_statistics(&day, SIGNAL_SPO2).unwrap();
        assert_eq!(stats.minimum, 95.0);
        assert_eq!(stats.maximum, 97.0);
    }

    #[test]
    fn test_update_adds_replaces_and_removes() {
        let mut day = Day::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        day.update_signal_statistics(SIGNAL_PULSE);
        assert!(day.statistics.is_empty());

        day.add_session(oximetry_session(at(1), vec![90.0]));
        day.update_signal_statistics(SIGNAL_SPO2);
        assert_eq!(day.statistics_for(SIGNAL_SPO2).unwrap().maximum, 90.0);

        day.add_session(oximetry_session(at(2), vec![99.0]));
        day.update_signal_statistics(SIGNAL_SPO2);
        assert_eq!(day.statistics.len(), 1);
        assert_eq!(day.statistics_for(SIGNAL_SPO2).unwrap().maximum, 99.0);

        day.sessions.clear();
        day.update_signal_statistics(SIGNAL_SPO2);
        assert!(day.statistics.is_empty());
    }
}
