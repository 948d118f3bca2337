//! Day retrieval.
//!
//! Prints one stored day: its sessions, signals, events, and statistics.
//! Used by the `dayline show` CLI command.

use anyhow::{bail, Result};
use chrono::NaiveDate;

use dayline_core::models::Day;
use dayline_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::{parse_date, SqliteStore};

/// Load `date`, or the most recent stored day when `date` is `None`.
pub async fn get_day(store: &dyn Store, profile_id: i64, date: Option<NaiveDate>) -> Result<Day> {
    let date = match date {
        Some(date) => date,
        None => match store.most_recent_date(profile_id).await? {
            Some(latest) => latest,
            None => bail!("no days stored yet"),
        },
    };

    match store.load_day(profile_id, date).await? {
        Some(day) => Ok(day),
        None => bail!("no data stored for {}", date),
    }
}

/// CLI entry point: loads the day and prints it to stdout.
pub async fn run_show(config: &Config, date: Option<&str>) -> Result<()> {
    let date = date.map(parse_date).transpose()?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let result = get_day(&store, config.profile.id, date).await;
    pool.close().await;
    let day = result?;

    println!("--- Day {} ---", day.report_date);
    match day.recording_range() {
        Some((start, end)) => println!("recording:  {} → {}", start, end),
        None => println!("recording:  (none)"),
    }
    println!();

    println!("--- Sessions ({}) ---", day.sessions.len());
    for session in &day.sessions {
        println!(
            "{:<16} {} → {}",
            session.source_type.as_str(),
            session.start_time,
            session.end_time
        );
        for signal in &session.signals {
            println!(
                "    {:<14} {:>8} samples @ {} Hz  {} → {}",
                signal.name,
                signal.samples.len(),
                signal.frequency_hz,
                signal.start_time,
                signal.end_time()
            );
        }
    }
    println!();

    println!("--- Events ({}) ---", day.events.len());
    for event in &day.events {
        println!(
            "{}  {:<20} {:.1}s",
            event.start_time,
            event.event_type.as_str(),
            event.duration_secs
        );
    }

    if !day.statistics.is_empty() {
        println!();
        println!("--- Statistics ---");
        println!(
            "{:<14} {:>8} {:>8} {:>8} {:>8} {:>8}",
            "SIGNAL", "MIN", "AVG", "MEDIAN", "P95", "MAX"
        );
        for s in &day.statistics {
            println!(
                "{:<14} {:>8.1} {:>8.1} {:>8.1} {:>8.1} {:>8.1}",
                s.signal_name, s.minimum, s.average, s.median, s.percentile_95, s.maximum
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dayline_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn get_day_defaults_to_most_recent() {
        let store = InMemoryStore::new();
        let jan = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        store.insert_day(1, Day::new(jan(3)));
        store.insert_day(1, Day::new(jan(7)));

        assert_eq!(get_day(&store, 1, None).await.unwrap().report_date, jan(7));
        assert_eq!(get_day(&store, 1, Some(jan(3))).await.unwrap().report_date, jan(3));
        assert!(get_day(&store, 1, Some(jan(4))).await.is_err());
        assert!(get_day(&store, 2, None).await.is_err());
    }
}
