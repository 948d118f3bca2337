//! Import progress reporting.
//!
//! Reports observable progress during `dayline import` so users see which
//! files are being decoded and which days are being reconciled.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use chrono::NaiveDate;

/// A single progress event for an import run.
#[derive(Clone, Debug, PartialEq)]
pub enum ImportProgressEvent {
    /// Decode phase: file `n` of `total` is being read.
    Decoding { file: String, n: u64, total: u64 },
    /// Reconcile phase: the given day is being merged.
    Reconciling { date: NaiveDate },
    /// The run is over.
    Finished { days_updated: u64 },
}

/// Reports import progress. Implementations write to stderr (human or JSON).
pub trait ImportProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the scan and import pipeline.
    fn report(&self, event: ImportProgressEvent);
}

/// Human-friendly progress on stderr: "import  decoding  12 / 40 files  night.csv".
pub struct StderrProgress;

impl ImportProgressReporter for StderrProgress {
    fn report(&self, event: ImportProgressEvent) {
        let line = match &event {
            ImportProgressEvent::Decoding { file, n, total } => {
                format!(
                    "import  decoding  {} / {} files  {}\n",
                    format_number(*n),
                    format_number(*total),
                    file
                )
            }
            ImportProgressEvent::Reconciling { date } => {
                format!("import  merging sessions and events for {}\n", date)
            }
            ImportProgressEvent::Finished { days_updated } => {
                format!("import  done  {} days updated\n", format_number(*days_updated))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ImportProgressReporter for JsonProgress {
    fn report(&self, event: ImportProgressEvent) {
        let obj = match &event {
            ImportProgressEvent::Decoding { file, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "decoding",
                "file": file,
                "n": n,
                "total": total
            }),
            ImportProgressEvent::Reconciling { date } => serde_json::json!({
                "event": "progress",
                "phase": "reconciling",
                "date": date.to_string()
            }),
            ImportProgressEvent::Finished { days_updated } => serde_json::json!({
                "event": "finished",
                "days_updated": days_updated
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ImportProgressReporter for NoProgress {
    fn report(&self, _event: ImportProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse `off`, `human`, or `json`.
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be off, human, or json.",
                other
            ),
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ImportProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
