//! Source decoders.
//!
//! A decoder turns the raw bytes of one import file into an
//! [`ImportBatch`]. Decoders are looked up through a [`DecoderRegistry`]
//! by matching the file name against each decoder's glob patterns; the
//! first match wins.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             DecoderRegistry              │
//! │  ┌──────────┐ ┌──────────────┐ ┌──────┐ │
//! │  │   json   │ │ oximetry-csv │ │custom│ │
//! │  └──────────┘ └──────────────┘ └──────┘ │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!      scan_import_dir() → ImportBatch list
//! ```
//!
//! Decoders never see the store. A decode error only affects the one file
//! being decoded; the scan records it and moves on.

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDateTime};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;

use dayline_core::models::{
    duration_to_seconds, Event, ImportBatch, Session, Signal, SourceType, SIGNAL_PULSE,
    SIGNAL_SPO2,
};

use crate::config::{OximetryConfig, OximetryEventConfig};
use crate::oximetry_events::generate_events;

/// Per-import adjustments passed to every decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    /// Added to every valid SpO2 reading.
    pub calibration_adjust: f64,
    /// Shift applied to recording timestamps, in seconds.
    pub time_adjust_secs: i64,
    /// Thresholds for events derived from oximetry signals.
    pub events: OximetryEventConfig,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::from(&OximetryConfig::default())
    }
}

impl From<&OximetryConfig> for DecodeOptions {
    fn from(cfg: &OximetryConfig) -> Self {
        Self {
            calibration_adjust: cfg.calibration_adjust,
            time_adjust_secs: cfg.time_adjust_secs,
            events: cfg.events.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Decoder Trait
// ═══════════════════════════════════════════════════════════════════════

/// Decodes one import file into an [`ImportBatch`].
pub trait BatchDecoder: Send + Sync {
    /// Short identifier (e.g. `"json"`).
    fn name(&self) -> &str;

    /// One-line description, shown by `dayline sources`.
    fn description(&self) -> &str;

    /// File-name glob patterns this decoder accepts.
    fn file_globs(&self) -> &[&str];

    /// Decode `bytes`. Returns `Ok(None)` when the file holds no sessions.
    fn decode(
        &self,
        source_name: &str,
        bytes: &[u8],
        options: &DecodeOptions,
    ) -> Result<Option<ImportBatch>>;
}

// ═══════════════════════════════════════════════════════════════════════
// JSON Decoder
// ═══════════════════════════════════════════════════════════════════════

/// The JSON interchange form of an [`ImportBatch`].
#[derive(Deserialize)]
struct BatchFile {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    sessions: Vec<Session>,
    #[serde(default)]
    events: Vec<Event>,
}

/// Reads batches already materialized as JSON (`source`, `sessions`, `events`).
pub struct JsonDecoder;

impl BatchDecoder for JsonDecoder {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Sessions and events in the dayline JSON interchange format"
    }

    fn file_globs(&self) -> &[&str] {
        &["*.json"]
    }

    fn decode(
        &self,
        source_name: &str,
        bytes: &[u8],
        _options: &DecodeOptions,
    ) -> Result<Option<ImportBatch>> {
        let file: BatchFile = serde_json::from_slice(bytes).context("invalid batch JSON")?;

        for session in &file.sessions {
            if session.end_time < session.start_time {
                bail!(
                    "session starting {} ends before it starts",
                    session.start_time
                );
            }
            for signal in &session.signals {
                if !signal.has_valid_frequency() {
                    bail!(
                        "signal '{}' has invalid frequency {}",
                        signal.name,
                        signal.frequency_hz
                    );
                }
            }
        }

        let source = file.source.unwrap_or_else(|| source_name.to_string());
        Ok(ImportBatch::from_parts(source, file.sessions, file.events))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Oximetry CSV Decoder
// ═══════════════════════════════════════════════════════════════════════

const TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Rows must lie within this distance of their expected time.
const ROW_JITTER_SECS: f64 = 0.001;

/// Reads `time,spo2,pulse` exports from fingertip pulse oximeters.
///
/// Rows must be uniformly spaced; the spacing of the first two rows sets
/// the sampling frequency (1 Hz for a single row). Desaturation and
/// pulse-rate events are derived from the adjusted readings.
pub struct OximetryCsvDecoder;

impl BatchDecoder for OximetryCsvDecoder {
    fn name(&self) -> &str {
        "oximetry-csv"
    }

    fn description(&self) -> &str {
        "Pulse-oximeter CSV export with time, SpO2, and pulse columns"
    }

    fn file_globs(&self) -> &[&str] {
        &["*.csv"]
    }

    fn decode(
        &self,
        source_name: &str,
        bytes: &[u8],
        options: &DecodeOptions,
    ) -> Result<Option<ImportBatch>> {
        let text = std::str::from_utf8(bytes).context("CSV file is not valid UTF-8")?;
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((_, header)) = lines.next() else {
            return Ok(None);
        };
        let columns: Vec<String> = header
            .split(',')
            .map(|c| c.trim().to_ascii_lowercase())
            .collect();
        let time_col = column_index(&columns, "time")?;
        let spo2_col = column_index(&columns, "spo2")?;
        let pulse_col = column_index(&columns, "pulse")?;

        let mut times = Vec::new();
        let mut spo2 = Vec::new();
        let mut pulse = Vec::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let field = |idx: usize| {
                fields
                    .get(idx)
                    .copied()
                    .with_context(|| format!("line {}: missing column", line_no + 1))
            };
            times.push(parse_time(field(time_col)?).with_context(|| format!("line {}", line_no + 1))?);
            spo2.push(parse_reading(field(spo2_col)?).with_context(|| format!("line {}", line_no + 1))?);
            pulse.push(parse_reading(field(pulse_col)?).with_context(|| format!("line {}", line_no + 1))?);
        }

        if times.is_empty() {
            return Ok(None);
        }

        let interval = match times.get(1) {
            Some(second) => duration_to_seconds(*second - times[0]),
            None => 1.0,
        };
        if interval <= 0.0 {
            bail!("rows are not in ascending time order");
        }
        for (i, t) in times.iter().enumerate() {
            let expected = i as f64 * interval;
            if (duration_to_seconds(*t - times[0]) - expected).abs() > ROW_JITTER_SECS {
                bail!("row {} at {} breaks the uniform sample spacing", i + 1, t);
            }
        }

        for value in spo2.iter_mut() {
            if *value > 0.0 {
                *value += options.calibration_adjust;
            }
        }

        let start = times[0] + Duration::seconds(options.time_adjust_secs);
        let frequency_hz = 1.0 / interval;
        let signals = vec![
            Signal {
                name: SIGNAL_SPO2.to_string(),
                unit: "%".to_string(),
                frequency_hz,
                start_time: start,
                samples: spo2,
                min_value: 50.0,
                max_value: 100.0,
            },
            Signal {
                name: SIGNAL_PULSE.to_string(),
                unit: "bpm".to_string(),
                frequency_hz,
                start_time: start,
                samples: pulse,
                min_value: 20.0,
                max_value: 250.0,
            },
        ];
        let mut session = Session {
            source_type: SourceType::PulseOximetry,
            start_time: start,
            end_time: start,
            signals,
        };
        session.fit_to_signals();
        let events = generate_events(&session, &options.events);

        Ok(ImportBatch::from_parts(source_name, vec![session], events))
    }
}

fn column_index(columns: &[String], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .with_context(|| format!("missing '{}' column", name))
}

fn parse_time(value: &str) -> Result<NaiveDateTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .with_context(|| format!("invalid timestamp '{}'", value))
}

fn parse_reading(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("invalid reading '{}'", value))
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

struct RegisteredDecoder {
    decoder: Box<dyn BatchDecoder>,
    globs: GlobSet,
}

/// Registry of decoders, searched in registration order.
///
/// # Example
///
/// ```rust
/// use dayline::decoders::DecoderRegistry;
///
/// let registry = DecoderRegistry::with_builtins();
/// assert_eq!(registry.find_for("night.csv").unwrap().name(), "oximetry-csv");
/// assert!(registry.find_for("notes.txt").is_none());
/// ```
pub struct DecoderRegistry {
    decoders: Vec<RegisteredDecoder>,
}

impl DecoderRegistry {
    /// Create an empty decoder registry.
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Create a registry with the built-in `json` and `oximetry-csv` decoders.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for decoder in [
            Box::new(JsonDecoder) as Box<dyn BatchDecoder>,
            Box::new(OximetryCsvDecoder),
        ] {
            if let Err(e) = registry.register(decoder) {
                tracing::error!("built-in decoder rejected: {:#}", e);
            }
        }
        registry
    }

    /// Register a decoder. Fails if one of its globs does not compile.
    pub fn register(&mut self, decoder: Box<dyn BatchDecoder>) -> Result<()> {
        let mut builder = GlobSetBuilder::new();
        for pattern in decoder.file_globs() {
            builder.add(
                Glob::new(pattern)
                    .with_context(|| format!("decoder '{}': bad glob", decoder.name()))?,
            );
        }
        let globs = builder.build()?;
        self.decoders.push(RegisteredDecoder { decoder, globs });
        Ok(())
    }

    /// The first decoder whose globs match `file_name`.
    pub fn find_for(&self, file_name: &str) -> Option<&dyn BatchDecoder> {
        self.decoders
            .iter()
            .find(|r| r.globs.is_match(file_name))
            .map(|r| r.decoder.as_ref())
    }

    pub fn decoders(&self) -> impl Iterator<Item = &dyn BatchDecoder> {
        self.decoders.iter().map(|r| r.decoder.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
