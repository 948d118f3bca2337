//! Core data models used throughout Dayline.
//!
//! These types represent the sessions, signals, events, and daily reports
//! that flow through the import and reconciliation pipeline. All times are
//! wall-clock [`NaiveDateTime`] values because a [`Day`] is keyed by its
//! local calendar date.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Sleep-stage classification signal produced by wearables and health APIs.
pub const SIGNAL_SLEEP_STAGES: &str = "Sleep Stages";
/// Blood oxygen saturation signal.
pub const SIGNAL_SPO2: &str = "SpO2";
/// Pulse rate signal.
pub const SIGNAL_PULSE: &str = "Pulse";

/// Convert fractional seconds to a [`Duration`] with microsecond resolution.
pub fn seconds_to_duration(secs: f64) -> Duration {
    Duration::microseconds((secs * 1_000_000.0).round() as i64)
}

/// Convert a [`Duration`] to fractional seconds.
pub fn duration_to_seconds(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => duration.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Where a session was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Recorded by the therapy device itself.
    Device,
    PulseOximetry,
    /// Imported from a third-party health API.
    HealthApi,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Device => "device",
            SourceType::PulseOximetry => "pulse_oximetry",
            SourceType::HealthApi => "health_api",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "device" => Ok(SourceType::Device),
            "pulse_oximetry" => Ok(SourceType::PulseOximetry),
            "health_api" => Ok(SourceType::HealthApi),
            other => Err(anyhow!("unknown source type '{other}'")),
        }
    }
}

/// Sleep-stage classification values carried by the [`SIGNAL_SLEEP_STAGES`] signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepStage {
    Awake = 0,
    Rem = 1,
    Light = 2,
    Deep = 3,
}

impl SleepStage {
    pub fn value(self) -> f64 {
        self as i32 as f64
    }
}

/// A uniformly-sampled time series.
///
/// The end time is always derived from the start time, sample count, and
/// frequency, so a signal can never disagree with its own bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub unit: String,
    pub frequency_hz: f64,
    pub start_time: NaiveDateTime,
    pub samples: Vec<f64>,
    pub min_value: f64,
    pub max_value: f64,
}

impl Signal {
    /// Seconds between consecutive samples.
    pub fn sample_interval(&self) -> f64 {
        1.0 / self.frequency_hz
    }

    pub fn has_valid_frequency(&self) -> bool {
        self.frequency_hz.is_finite() && self.frequency_hz > 0.0
    }

    pub fn duration(&self) -> Duration {
        if !self.has_valid_frequency() {
            return Duration::zero();
        }
        seconds_to_duration(self.samples.len() as f64 / self.frequency_hz)
    }

    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + self.duration()
    }
}

/// A recorded interval of device or sensor activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub source_type: SourceType,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    #[serde(default)]
    pub signals: Vec<Signal>,
}

impl Session {
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// The session's own bounds widened to cover every owned signal.
    pub fn bounds_with_signals(&self) -> (NaiveDateTime, NaiveDateTime) {
        self.signals
            .iter()
            .fold((self.start_time, self.end_time), |(start, end), signal| {
                (start.min(signal.start_time), end.max(signal.end_time()))
            })
    }

    /// Widen the session so that it is never shorter than its signals.
    pub fn fit_to_signals(&mut self) {
        let (start, end) = self.bounds_with_signals();
        self.start_time = start;
        self.end_time = end;
    }
}

/// Kind of reported occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ObstructiveApnea,
    ClearAirway,
    Hypopnea,
    Rera,
    FlowLimitation,
    Desaturation,
    PulseRateChange,
    Unclassified,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ObstructiveApnea => "obstructive_apnea",
            EventType::ClearAirway => "clear_airway",
            EventType::Hypopnea => "hypopnea",
            EventType::Rera => "rera",
            EventType::FlowLimitation => "flow_limitation",
            EventType::Desaturation => "desaturation",
            EventType::PulseRateChange => "pulse_rate_change",
            EventType::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "obstructive_apnea" => Ok(EventType::ObstructiveApnea),
            "clear_airway" => Ok(EventType::ClearAirway),
            "hypopnea" => Ok(EventType::Hypopnea),
            "rera" => Ok(EventType::Rera),
            "flow_limitation" => Ok(EventType::FlowLimitation),
            "desaturation" => Ok(EventType::Desaturation),
            "pulse_rate_change" => Ok(EventType::PulseRateChange),
            "unclassified" => Ok(EventType::Unclassified),
            other => Err(anyhow!("unknown event type '{other}'")),
        }
    }
}

/// A reported occurrence with a type, start time, and duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub start_time: NaiveDateTime,
    pub duration_secs: f64,
}

/// Aggregate statistics for one signal across all sessions of a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStatistics {
    pub signal_name: String,
    pub unit: String,
    pub minimum: f64,
    pub average: f64,
    pub median: f64,
    pub percentile_95: f64,
    pub percentile_995: f64,
    pub maximum: f64,
}

/// The persisted aggregate of all sessions and events for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    pub report_date: NaiveDate,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub recording_start: Option<NaiveDateTime>,
    #[serde(default)]
    pub recording_end: Option<NaiveDateTime>,
    #[serde(default)]
    pub statistics: Vec<SignalStatistics>,
}

impl Day {
    pub fn new(report_date: NaiveDate) -> Self {
        Self {
            report_date,
            sessions: Vec::new(),
            events: Vec::new(),
            recording_start: None,
            recording_end: None,
            statistics: Vec::new(),
        }
    }

    /// Insert a session, keeping sessions ordered by start time.
    pub fn add_session(&mut self, session: Session) {
        let index = self
            .sessions
            .partition_point(|s| s.start_time <= session.start_time);
        self.sessions.insert(index, session);
        self.refresh_recording_range();
    }

    /// Recompute `recording_start` / `recording_end` from the sessions.
    pub fn refresh_recording_range(&mut self) {
        self.recording_start = self.sessions.iter().map(|s| s.start_time).min();
        self.recording_end = self.sessions.iter().map(|s| s.end_time).max();
    }

    pub fn recording_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match (self.recording_start, self.recording_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn sort_events(&mut self) {
        self.events.sort_by_key(|e| e.start_time);
    }

    pub fn statistics_for(&self, signal_name: &str) -> Option<&SignalStatistics> {
        self.statistics.iter().find(|s| s.signal_name == signal_name)
    }
}

/// One decoded unit of imported data.
///
/// Produced by a source decoder and immutable afterwards. The time range
/// spans every session in the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportBatch {
    pub source: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub sessions: Vec<Session>,
    pub events: Vec<Event>,
}

impl ImportBatch {
    /// Build a batch from decoded parts. Returns `None` when there are no sessions.
    pub fn from_parts(
        source: impl Into<String>,
        sessions: Vec<Session>,
        events: Vec<Event>,
    ) -> Option<Self> {
        let start_time = sessions.iter().map(|s| s.start_time).min()?;
        let end_time = sessions.iter().map(|s| s.end_time).max()?;
        Some(Self {
            source: source.into(),
            start_time,
            end_time,
            sessions,
            events,
        })
    }
}
