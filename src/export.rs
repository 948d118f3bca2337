//! Export stored days as JSON.
//!
//! Produces a single JSON document with every day in the requested date
//! range, including sessions, signals, events, and statistics. The output
//! can be read back with `dayline load-days`.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

use dayline_core::models::Day;
use dayline_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::{parse_date, SqliteStore};

#[derive(Serialize)]
struct ExportData {
    profile_id: i64,
    days: Vec<Day>,
}

/// Collect the days to export.
pub async fn export_days(
    store: &dyn Store,
    profile_id: i64,
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
) -> Result<Vec<Day>> {
    store.list_days(profile_id, since, until).await
}

/// Export days as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(
    config: &Config,
    since: Option<&str>,
    until: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let since = since.map(parse_date).transpose()?;
    let until = until.map(parse_date).transpose()?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let days = export_days(&store, config.profile.id, since, until).await;
    pool.close().await;
    let days = days?;

    let day_count = days.len();
    let session_count: usize = days.iter().map(|d| d.sessions.len()).sum();

    let data = ExportData {
        profile_id: config.profile.id,
        days,
    };
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!(
                "Exported {} days, {} sessions to {}",
                day_count,
                session_count,
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
