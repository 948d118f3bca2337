//! Signal splicing.
//!
//! Extends a signal's sample buffer so that it reaches an external time
//! boundary, padding with a filler value chosen per signal by the caller.
//! Splicing never shrinks a signal: a boundary that already lies inside
//! the signal is a no-op.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};

use crate::error::ImportError;
use crate::models::{
    duration_to_seconds, seconds_to_duration, Signal, SleepStage, SIGNAL_SLEEP_STAGES,
};

/// Slack, in samples, applied before rounding so that boundaries lying on an
/// exact multiple of a fractional sample interval round to that multiple.
const SAMPLE_TOLERANCE: f64 = 1e-6;

/// Which end of the signal to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceDirection {
    /// Move the start earlier by prepending filler samples.
    ExtendStart,
    /// Move the end later by appending filler samples.
    ExtendEnd,
}

/// New bounds of a spliced signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceOutcome {
    pub samples_added: usize,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Filler value used when padding each spliceable signal.
///
/// Only signals named in the policy are ever spliced.
#[derive(Debug, Clone, PartialEq)]
pub struct FillerPolicy {
    fillers: HashMap<String, f64>,
}

impl FillerPolicy {
    pub fn empty() -> Self {
        Self {
            fillers: HashMap::new(),
        }
    }

    pub fn with(mut self, signal_name: impl Into<String>, filler: f64) -> Self {
        self.fillers.insert(signal_name.into(), filler);
        self
    }

    pub fn filler_for(&self, signal_name: &str) -> Option<f64> {
        self.fillers.get(signal_name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fillers.is_empty()
    }
}

impl Default for FillerPolicy {
    fn default() -> Self {
        Self::empty().with(SIGNAL_SLEEP_STAGES, SleepStage::Awake.value())
    }
}

impl From<HashMap<String, f64>> for FillerPolicy {
    fn from(fillers: HashMap<String, f64>) -> Self {
        Self { fillers }
    }
}

/// Extend `signal` towards `target` in the given direction.
///
/// Extending the start prepends `floor((start - target) / interval)`
/// samples; extending the end appends `ceil((target - end) / interval)`
/// samples. The signal's end time is derived from its sample count, so it
/// moves together with the buffer.
pub fn splice_signal(
    signal: &mut Signal,
    target: NaiveDateTime,
    direction: SpliceDirection,
    filler: f64,
) -> Result<SpliceOutcome, ImportError> {
    if !signal.has_valid_frequency() {
        return Err(ImportError::InvariantViolation(format!(
            "signal '{}' has invalid frequency {}",
            signal.name, signal.frequency_hz
        )));
    }

    let interval = signal.sample_interval();
    let old_len = signal.samples.len();
    let old_start = signal.start_time;
    let old_end = signal.end_time();

    let count = match direction {
        SpliceDirection::ExtendStart => {
            let gap = duration_to_seconds(old_start - target);
            (gap / interval + SAMPLE_TOLERANCE).floor()
        }
        SpliceDirection::ExtendEnd => {
            let gap = duration_to_seconds(target - old_end);
            (gap / interval - SAMPLE_TOLERANCE).ceil()
        }
    };

    if !(count >= 1.0) {
        return Ok(SpliceOutcome {
            samples_added: 0,
            start_time: old_start,
            end_time: old_end,
        });
    }

    let n = count as usize;
    let padding = std::iter::repeat(filler).take(n);
    match direction {
        SpliceDirection::ExtendStart => {
            signal.samples.splice(0..0, padding);
            signal.start_time = old_start - seconds_to_duration(n as f64 * interval);
        }
        SpliceDirection::ExtendEnd => {
            signal.samples.extend(padding);
        }
    }

    let outcome = SpliceOutcome {
        samples_added: n,
        start_time: signal.start_time,
        end_time: signal.end_time(),
    };

    // Start and end are rounded to whole microseconds independently.
    let rounding = Duration::microseconds(1);
    if signal.samples.len() != old_len + n
        || outcome.start_time > old_start
        || outcome.end_time + rounding < old_end
    {
        return Err(ImportError::InvariantViolation(format!(
            "splicing '{}' produced {} samples over {}..{} from {} samples over {}..{}",
            signal.name,
            signal.samples.len(),
            outcome.start_time,
            outcome.end_time,
            old_len,
            old_start,
            old_end
        )));
    }

    Ok(outcome)
}
