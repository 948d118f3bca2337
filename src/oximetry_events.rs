//! Events derived from decoded oximetry signals.
//!
//! Pulse oximeters export raw SpO2 and pulse readings only. Desaturations
//! and pulse-rate changes are found by comparing each reading with a
//! rolling baseline: the mean of the valid readings in the preceding
//! window. A run of readings that departs from the baseline taken at its
//! first reading, and lasts at least the configured minimum, becomes one
//! [`Event`].
//!
//! Readings outside the signal's `min_value..=max_value` range (sensor
//! dropouts are recorded as zero) never join the baseline and end any
//! open run.

use dayline_core::models::{
    seconds_to_duration, Event, EventType, Session, Signal, SIGNAL_PULSE, SIGNAL_SPO2,
};

use crate::config::OximetryEventConfig;

/// Scan the SpO2 and pulse signals of `session` for events.
///
/// Returns events ordered by start time; empty when generation is
/// disabled or neither signal is present.
pub fn generate_events(session: &Session, config: &OximetryEventConfig) -> Vec<Event> {
    if !config.enabled {
        return Vec::new();
    }

    let mut events = Vec::new();
    if let Some(spo2) = session.signal(SIGNAL_SPO2) {
        let min_drop = config.desaturation_drop;
        events.extend(
            find_excursions(spo2, config.baseline_window_secs, |value, baseline| {
                value <= baseline - min_drop
            })
            .into_iter()
            .filter_map(|run| {
                run.to_event(spo2, EventType::Desaturation, config.desaturation_min_secs)
            }),
        );
    }
    if let Some(pulse) = session.signal(SIGNAL_PULSE) {
        let delta = config.pulse_change_delta;
        events.extend(
            find_excursions(pulse, config.baseline_window_secs, |value, baseline| {
                (value - baseline).abs() >= delta
            })
            .into_iter()
            .filter_map(|run| {
                run.to_event(pulse, EventType::PulseRateChange, config.pulse_change_min_secs)
            }),
        );
    }
    events.sort_by_key(|e| e.start_time);
    events
}

/// A run of consecutive samples departing from the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Excursion {
    start: usize,
    len: usize,
}

impl Excursion {
    fn to_event(self, signal: &Signal, event_type: EventType, min_secs: f64) -> Option<Event> {
        let interval = signal.sample_interval();
        let duration_secs = self.len as f64 * interval;
        if duration_secs < min_secs {
            return None;
        }
        Some(Event {
            event_type,
            start_time: signal.start_time + seconds_to_duration(self.start as f64 * interval),
            duration_secs,
        })
    }
}

fn find_excursions(
    signal: &Signal,
    window_secs: f64,
    departs: impl Fn(f64, f64) -> bool,
) -> Vec<Excursion> {
    if !signal.has_valid_frequency() || signal.samples.is_empty() {
        return Vec::new();
    }
    let window = ((window_secs / signal.sample_interval()).round() as usize).max(1);
    let valid = |v: f64| v >= signal.min_value && v <= signal.max_value;

    // Prefix sums over valid samples give each baseline in constant time.
    let mut sums = Vec::with_capacity(signal.samples.len() + 1);
    let mut counts = Vec::with_capacity(signal.samples.len() + 1);
    sums.push(0.0);
    counts.push(0usize);
    for &v in &signal.samples {
        let (sum, count) = (sums[sums.len() - 1], counts[counts.len() - 1]);
        if valid(v) {
            sums.push(sum + v);
            counts.push(count + 1);
        } else {
            sums.push(sum);
            counts.push(count);
        }
    }
    let baseline = |i: usize| {
        let from = i.saturating_sub(window);
        let count = counts[i] - counts[from];
        (count > 0).then(|| (sums[i] - sums[from]) / count as f64)
    };

    let mut runs = Vec::new();
    let mut open: Option<(usize, f64)> = None;
    for (i, &v) in signal.samples.iter().enumerate() {
        if let Some((start, base)) = open {
            if valid(v) && departs(v, base) {
                continue;
            }
            runs.push(Excursion {
                start,
                len: i - start,
            });
            open = None;
        }
        if !valid(v) {
            continue;
        }
        if let Some(base) = baseline(i) {
            if departs(v, base) {
                open = Some((i, base));
            }
        }
    }
    if let Some((start, _)) = open {
        runs.push(Excursion {
            start,
            len: signal.samples.len() - start,
        });
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use dayline_core::models::SourceType;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap()
    }

    /// Concatenate `(value, count)` runs into one series.
    fn series(parts: &[(f64, usize)]) -> Vec<f64> {
        parts
            .iter()
            .flat_map(|&(value, count)| std::iter::repeat(value).take(count))
            .collect()
    }

    fn session(spo2: Vec<f64>, pulse: Vec<f64>) -> Session {
        let signal = |name: &str, samples: Vec<f64>, min: f64, max: f64| Signal {
            name: name.to_string(),
            unit: String::new(),
            frequency_hz: 1.0,
            start_time: start(),
            samples,
            min_value: min,
            max_value: max,
        };
        let mut session = Session {
            source_type: SourceType::PulseOximetry,
            start_time: start(),
            end_time: start(),
            signals: vec![
                signal(SIGNAL_SPO2, spo2, 50.0, 100.0),
                signal(SIGNAL_PULSE, pulse, 20.0, 250.0),
            ],
        };
        session.fit_to_signals();
        session
    }

    fn steady_pulse(len: usize) -> Vec<f64> {
        vec![60.0; len]
    }

    #[test]
    fn sustained_drop_is_a_desaturation() {
        let spo2 = series(&[(96.0, 300), (91.0, 15), (96.0, 100)]);
        let events = generate_events(
            &session(spo2, steady_pulse(415)),
            &OximetryEventConfig::default(),
        );

        assert_eq!(
            events,
            vec![Event {
                event_type: EventType::Desaturation,
                start_time: start() + Duration::seconds(300),
                duration_secs: 15.0,
            }]
        );
    }

    #[test]
    fn brief_or_shallow_dips_are_ignored() {
        let spo2 = series(&[(96.0, 300), (90.0, 5), (96.0, 100), (94.0, 30), (96.0, 60)]);
        let events = generate_events(
            &session(spo2, steady_pulse(495)),
            &OximetryEventConfig::default(),
        );
        assert!(events.is_empty(), "{:?}", events);
    }

    #[test]
    fn dropouts_split_runs_and_stay_out_of_baseline() {
        // Two 6-second dips separated by a zero reading: neither lasts 10 seconds.
        let spo2 = series(&[(96.0, 300), (90.0, 6), (0.0, 1), (90.0, 6), (96.0, 60)]);
        let events = generate_events(
            &session(spo2, steady_pulse(373)),
            &OximetryEventConfig::default(),
        );
        assert!(events.is_empty(), "{:?}", events);

        // A recording opening with dropouts takes its baseline from the first valid reading.
        let spo2 = series(&[(0.0, 20), (96.0, 100), (92.0, 12), (96.0, 10)]);
        let events = generate_events(
            &session(spo2, steady_pulse(142)),
            &OximetryEventConfig::default(),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_time, start() + Duration::seconds(120));
        assert_eq!(events[0].duration_secs, 12.0);
    }

    #[test]
    fn pulse_rise_and_fall_are_rate_changes() {
        let pulse = series(&[(60.0, 300), (85.0, 20), (60.0, 300), (35.0, 11), (60.0, 30)]);
        let len = pulse.len();
        let events = generate_events(
            &session(vec![96.0; len], pulse),
            &OximetryEventConfig::default(),
        );

        let starts: Vec<NaiveDateTime> = events.iter().map(|e| e.start_time).collect();
        assert_eq!(
            starts,
            vec![start() + Duration::seconds(300), start() + Duration::seconds(620)]
        );
        assert!(events.iter().all(|e| e.event_type == EventType::PulseRateChange));
        assert_eq!(events[0].duration_secs, 20.0);
        assert_eq!(events[1].duration_secs, 11.0);
    }

    #[test]
    fn run_open_at_end_of_recording_is_kept() {
        let spo2 = series(&[(97.0, 200), (89.0, 30)]);
        let events = generate_events(
            &session(spo2, steady_pulse(230)),
            &OximetryEventConfig::default(),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_secs, 30.0);
    }

    #[test]
    fn events_merge_in_time_order() {
        let spo2 = series(&[(96.0, 300), (91.0, 15), (96.0, 200)]);
        let pulse = series(&[(60.0, 150), (90.0, 15), (60.0, 350)]);
        let events = generate_events(
            &session(spo2, pulse),
            &OximetryEventConfig::default(),
        );

        let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventType::PulseRateChange, EventType::Desaturation]);
    }

    #[test]
    fn thresholds_come_from_config() {
        let spo2 = series(&[(96.0, 300), (91.0, 15), (96.0, 100)]);
        let session = session(spo2, steady_pulse(415));

        let stricter = OximetryEventConfig {
            desaturation_drop: 6.0,
            ..OximetryEventConfig::default()
        };
        assert!(generate_events(&session, &stricter).is_empty());

        let longer = OximetryEventConfig {
            desaturation_min_secs: 20.0,
            ..OximetryEventConfig::default()
        };
        assert!(generate_events(&session, &longer).is_empty());

        let disabled = OximetryEventConfig {
            enabled: false,
            ..OximetryEventConfig::default()
        };
        assert!(generate_events(&session, &disabled).is_empty());
    }
}
