use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Create days table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS days (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id INTEGER NOT NULL,
            report_date TEXT NOT NULL,
            recording_start INTEGER,
            recording_end INTEGER,
            UNIQUE(profile_id, report_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create sessions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            day_id INTEGER NOT NULL,
            session_index INTEGER NOT NULL,
            source_type TEXT NOT NULL,
            start_time INTEGER NOT NULL,
            end_time INTEGER NOT NULL,
            UNIQUE(day_id, session_index),
            FOREIGN KEY (day_id) REFERENCES days(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create signals table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            frequency_hz REAL NOT NULL,
            start_time INTEGER NOT NULL,
            min_value REAL NOT NULL,
            max_value REAL NOT NULL,
            samples BLOB NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create events table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            day_id INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            start_time INTEGER NOT NULL,
            duration_secs REAL NOT NULL,
            FOREIGN KEY (day_id) REFERENCES days(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create signal_statistics table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signal_statistics (
            day_id INTEGER NOT NULL,
            signal_name TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            minimum REAL NOT NULL,
            average REAL NOT NULL,
            median REAL NOT NULL,
            percentile_95 REAL NOT NULL,
            percentile_995 REAL NOT NULL,
            maximum REAL NOT NULL,
            PRIMARY KEY (day_id, signal_name),
            FOREIGN KEY (day_id) REFERENCES days(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_day_id ON sessions(day_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_session_id ON signals(session_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_day_id ON events(day_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_days_profile_date ON days(profile_id, report_date DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
