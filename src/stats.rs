//! Database statistics and health overview.
//!
//! Provides a quick summary of what's stored: day counts, sessions per
//! source type, events, and the most recent report date. Used by
//! `dayline stats` to give confidence that imports are landing.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-source breakdown of session counts.
struct SourceStats {
    source_type: String,
    session_count: i64,
    day_count: i64,
    last_date: Option<String>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let profile_id = config.profile.id;

    let total_days: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM days WHERE profile_id = ?")
        .bind(profile_id)
        .fetch_one(&pool)
        .await?;

    let total_sessions: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sessions s JOIN days d ON d.id = s.day_id WHERE d.profile_id = ?",
    )
    .bind(profile_id)
    .fetch_one(&pool)
    .await?;

    let total_events: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM events e JOIN days d ON d.id = e.day_id WHERE d.profile_id = ?",
    )
    .bind(profile_id)
    .fetch_one(&pool)
    .await?;

    let most_recent: Option<String> =
        sqlx::query_scalar("SELECT MAX(report_date) FROM days WHERE profile_id = ?")
            .bind(profile_id)
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Dayline: Database Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Profile:     {}", profile_id);
    println!();
    println!("  Days:        {}", total_days);
    println!("  Sessions:    {}", total_sessions);
    println!("  Events:      {}", total_events);
    println!(
        "  Most recent: {}",
        most_recent.as_deref().unwrap_or("none")
    );

    // Per-source breakdown
    let source_rows = sqlx::query(
        r#"
        SELECT
            s.source_type,
            COUNT(*) AS session_count,
            COUNT(DISTINCT d.id) AS day_count,
            MAX(d.report_date) AS last_date
        FROM sessions s
        JOIN days d ON d.id = s.day_id
        WHERE d.profile_id = ?
        GROUP BY s.source_type
        ORDER BY session_count DESC
        "#,
    )
    .bind(profile_id)
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source_type: row.get("source_type"),
            session_count: row.get("session_count"),
            day_count: row.get("day_count"),
            last_date: row.get("last_date"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<18} {:>9} {:>6}   {}",
            "SOURCE", "SESSIONS", "DAYS", "LATEST"
        );
        println!("  {}", "-".repeat(50));

        for s in &source_stats {
            println!(
                "  {:<18} {:>9} {:>6}   {}",
                s.source_type,
                s.session_count,
                s.day_count,
                s.last_date.as_deref().unwrap_or("never")
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
