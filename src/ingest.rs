//! CLI import orchestration.
//!
//! Wires the filesystem scan, the decoders, and the SQLite store to the
//! transaction coordinator in [`crate::import`]. Two entry points:
//!
//! - [`run_import`] decodes every file under the configured root and
//!   reconciles the resulting meta-sessions into stored days.
//! - [`run_load_days`] loads fully-formed days (as produced by a therapy
//!   device reader, or by `dayline export`) from a JSON file.
//!
//! Both print a short report on stdout; progress goes to stderr.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;

use dayline_core::models::{Day, ImportBatch, SourceType};

use crate::config::Config;
use crate::connector_fs::scan_import_dir;
use crate::db;
use crate::decoders::{DecodeOptions, DecoderRegistry};
use crate::import::{
    import_device_days, import_window_start, prepare_meta_sessions, reconcile_import, CancelFlag,
    ImportOptions, ImportOutcome,
};
use crate::progress::ProgressMode;
use crate::sqlite_store::{parse_date, SqliteStore};

/// Scan, decode, group, and reconcile one import run.
///
/// `since` overrides the incremental import window. Without it, each source
/// type present in the scan resumes from its most recent stored day, never
/// reaching further back than `import.lookback_days`.
pub async fn run_import(
    config: &Config,
    since: Option<&str>,
    dry_run: bool,
    progress: ProgressMode,
    cancel: CancelFlag,
) -> Result<ImportOutcome> {
    let reporter = progress.reporter();
    let registry = DecoderRegistry::with_builtins();
    let decode_options = DecodeOptions::from(&config.oximetry);

    let report = scan_import_dir(config, &registry, &decode_options, reporter.as_ref())?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let since = match since {
        Some(value) => Some(parse_date(value)?),
        None => {
            let today = chrono::Local::now().date_naive();
            window_start(&store, config, &report.batches, today).await?
        }
    };

    let decoded = report.batches.len();
    let metas = prepare_meta_sessions(report.batches, since, config.import.merge_gap());

    println!(
        "import filesystem{}",
        if dry_run { " (dry-run)" } else { "" }
    );
    println!("  files decoded: {}", decoded);
    println!("  empty files: {}", report.empty);
    println!("  skipped files: {}", report.skipped.len());
    println!("  decode failures: {}", report.failures.len());
    for failure in &report.failures {
        println!("    {}", failure);
    }
    if let Some(since) = since {
        println!("  window start: {}", since);
    }
    println!("  meta-sessions: {}", metas.len());

    let options = ImportOptions {
        margin_days: config.import.margin_days,
        reconcile: config.import.reconcile_options(),
        dry_run,
        cancel,
    };
    let result = reconcile_import(
        &store,
        config.profile.id,
        &metas,
        &options,
        reporter.as_ref(),
    )
    .await;
    pool.close().await;

    let outcome = ImportOutcome::from_result(&result);
    match result {
        Ok(summary) => {
            println!("  sessions added: {}", summary.sessions_added);
            println!("  events added: {}", summary.events_added);
            if let Some(date) = summary.most_recent_date {
                println!("  most recent day: {}", date);
            }
            println!("{}", outcome.describe(dry_run));
            Ok(outcome)
        }
        Err(e) => {
            eprintln!("{}", outcome);
            Err(e).context("import failed")
        }
    }
}

async fn window_start(
    store: &SqliteStore,
    config: &Config,
    batches: &[ImportBatch],
    today: NaiveDate,
) -> Result<Option<NaiveDate>> {
    let mut source_types: Vec<SourceType> = Vec::new();
    for session in batches.iter().flat_map(|b| b.sessions.iter()) {
        if !source_types.contains(&session.source_type) {
            source_types.push(session.source_type);
        }
    }

    let mut start: Option<NaiveDate> = None;
    for source_type in source_types {
        let recent = store
            .most_recent_source_date(config.profile.id, source_type)
            .await?;
        let from = import_window_start(recent, today, config.import.lookback_days);
        start = Some(start.map_or(from, |s| s.min(from)));
    }
    Ok(start)
}

/// Accepts either a bare JSON array of days or an export document.
#[derive(Deserialize)]
#[serde(untagged)]
enum DaysFile {
    List(Vec<Day>),
    Export { days: Vec<Day> },
}

/// Read days from a JSON file.
pub fn read_days_file(path: &Path) -> Result<Vec<Day>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: DaysFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse days from {}", path.display()))?;
    Ok(match parsed {
        DaysFile::List(days) | DaysFile::Export { days } => days,
    })
}

/// Load device days from `path` into the store.
pub async fn run_load_days(config: &Config, path: &Path) -> Result<()> {
    let days = read_days_file(path)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let result = import_device_days(
        &store,
        config.profile.id,
        days,
        &config.import.reconcile_options(),
    )
    .await;
    pool.close().await;
    let summary = result?;

    println!("load-days {}", path.display());
    println!("  days created: {}", summary.days_created);
    println!("  days merged: {}", summary.days_merged);
    println!("  days skipped: {}", summary.days_skipped);
    if let Some(date) = summary.most_recent_date {
        println!("  most recent day: {}", date);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DAY_JSON: &str = r#"{
        "report_date": "2024-01-01",
        "sessions": [{
            "source_type": "device",
            "start_time": "2024-01-01T22:00:00",
            "end_time": "2024-01-02T06:00:00",
            "signals": []
        }]
    }"#;

    #[test]
    fn days_file_accepts_list_and_export() {
        let tmp = TempDir::new().unwrap();

        let list = tmp.path().join("list.json");
        fs::write(&list, format!("[{}]", DAY_JSON)).unwrap();
        let days = read_days_file(&list).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].sessions[0].source_type, SourceType::Device);

        let export = tmp.path().join("export.json");
        fs::write(
            &export,
            format!(r#"{{"profile_id": 1, "days": [{}]}}"#, DAY_JSON),
        )
        .unwrap();
        assert_eq!(read_days_file(&export).unwrap(), days);
    }

    #[test]
    fn days_file_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, r#"{"nights": []}"#).unwrap();
        assert!(read_days_file(&path).is_err());
    }
}
