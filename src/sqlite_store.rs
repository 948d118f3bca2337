//! SQLite-backed [`Store`] implementation.
//!
//! A [`Day`] is spread over five tables (days, sessions, signals, events,
//! signal_statistics). Saving a day upserts its row and replaces every
//! child row, so a save always leaves exactly the in-memory day behind.
//!
//! Timestamps are wall-clock times stored as epoch microseconds, report
//! dates as `YYYY-MM-DD` text, and signal samples as little-endian `f64`
//! BLOBs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::{Row, SqlitePool, Transaction};

use dayline_core::models::{Day, Event, Session, Signal, SignalStatistics, SourceType};
use dayline_core::store::{Store, StoreTransaction};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Latest report date holding a session of `source_type`.
    pub async fn most_recent_source_date(
        &self,
        profile_id: i64,
        source_type: SourceType,
    ) -> Result<Option<NaiveDate>> {
        let latest: Option<String> = sqlx::query_scalar(
            "SELECT MAX(d.report_date) FROM days d \
             JOIN sessions s ON s.day_id = d.id \
             WHERE d.profile_id = ? AND s.source_type = ?",
        )
        .bind(profile_id)
        .bind(source_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        latest.as_deref().map(parse_date).transpose()
    }
}

/// An open SQLite write transaction.
///
/// Dropping it without calling [`commit`](StoreTransaction::commit) rolls
/// the transaction back.
pub struct SqliteTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTransaction {
    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| anyhow!("transaction already finished"))
    }
}

#[async_trait]
impl Store for SqliteStore {
    /// Opens with `BEGIN IMMEDIATE`: the write lock is taken up front, so a
    /// concurrent import fails here instead of at its first save.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context("Failed to begin transaction")?;
        Ok(Box::new(SqliteTransaction { tx: Some(tx) }))
    }

    async fn load_day(&self, profile_id: i64, date: NaiveDate) -> Result<Option<Day>> {
        let mut conn = self.pool.acquire().await?;
        fetch_day(&mut conn, profile_id, date).await
    }

    async fn most_recent_date(&self, profile_id: i64) -> Result<Option<NaiveDate>> {
        let mut conn = self.pool.acquire().await?;
        fetch_most_recent_date(&mut conn, profile_id).await
    }

    async fn list_days(
        &self,
        profile_id: i64,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<Vec<Day>> {
        let mut conn = self.pool.acquire().await?;

        let dates: Vec<String> = sqlx::query_scalar(
            "SELECT report_date FROM days \
             WHERE profile_id = ? AND (? IS NULL OR report_date >= ?) AND (? IS NULL OR report_date <= ?) \
             ORDER BY report_date",
        )
        .bind(profile_id)
        .bind(since.map(format_date))
        .bind(since.map(format_date))
        .bind(until.map(format_date))
        .bind(until.map(format_date))
        .fetch_all(&mut *conn)
        .await?;

        let mut days = Vec::with_capacity(dates.len());
        for date in dates {
            if let Some(day) = fetch_day(&mut conn, profile_id, parse_date(&date)?).await? {
                days.push(day);
            }
        }
        Ok(days)
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn load_day(&mut self, profile_id: i64, date: NaiveDate) -> Result<Option<Day>> {
        fetch_day(self.conn()?, profile_id, date).await
    }

    async fn save_day(&mut self, profile_id: i64, day: &Day) -> Result<()> {
        write_day(self.conn()?, profile_id, day)
            .await
            .with_context(|| format!("Failed to save day {}", day.report_date))
    }

    async fn most_recent_date(&mut self, profile_id: i64) -> Result<Option<NaiveDate>> {
        fetch_most_recent_date(self.conn()?, profile_id).await
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| anyhow!("transaction already finished"))?;
        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| anyhow!("transaction already finished"))?;
        tx.rollback()
            .await
            .context("Failed to roll back transaction")?;
        Ok(())
    }
}

async fn fetch_most_recent_date(
    conn: &mut SqliteConnection,
    profile_id: i64,
) -> Result<Option<NaiveDate>> {
    let latest: Option<String> =
        sqlx::query_scalar("SELECT MAX(report_date) FROM days WHERE profile_id = ?")
            .bind(profile_id)
            .fetch_one(&mut *conn)
            .await?;

    latest.as_deref().map(parse_date).transpose()
}

async fn fetch_day(
    conn: &mut SqliteConnection,
    profile_id: i64,
    date: NaiveDate,
) -> Result<Option<Day>> {
    let Some(day_row) = sqlx::query(
        "SELECT id, recording_start, recording_end FROM days WHERE profile_id = ? AND report_date = ?",
    )
    .bind(profile_id)
    .bind(format_date(date))
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let day_id: i64 = day_row.get("id");
    let mut day = Day::new(date);
    day.recording_start = day_row
        .get::<Option<i64>, _>("recording_start")
        .map(from_micros)
        .transpose()?;
    day.recording_end = day_row
        .get::<Option<i64>, _>("recording_end")
        .map(from_micros)
        .transpose()?;

    let session_rows = sqlx::query(
        "SELECT id, source_type, start_time, end_time FROM sessions \
         WHERE day_id = ? ORDER BY session_index",
    )
    .bind(day_id)
    .fetch_all(&mut *conn)
    .await?;

    for row in &session_rows {
        let session_id: i64 = row.get("id");
        let signal_rows = sqlx::query(
            "SELECT name, unit, frequency_hz, start_time, min_value, max_value, samples \
             FROM signals WHERE session_id = ? ORDER BY id",
        )
        .bind(session_id)
        .fetch_all(&mut *conn)
        .await?;

        let signals = signal_rows
            .iter()
            .map(|s| {
                Ok(Signal {
                    name: s.get("name"),
                    unit: s.get("unit"),
                    frequency_hz: s.get("frequency_hz"),
                    start_time: from_micros(s.get("start_time"))?,
                    samples: blob_to_samples(&s.get::<Vec<u8>, _>("samples")),
                    min_value: s.get("min_value"),
                    max_value: s.get("max_value"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Sessions are stored in day order, so push directly.
        day.sessions.push(Session {
            source_type: row.get::<String, _>("source_type").parse()?,
            start_time: from_micros(row.get("start_time"))?,
            end_time: from_micros(row.get("end_time"))?,
            signals,
        });
    }

    let event_rows = sqlx::query(
        "SELECT event_type, start_time, duration_secs FROM events WHERE day_id = ? ORDER BY id",
    )
    .bind(day_id)
    .fetch_all(&mut *conn)
    .await?;

    day.events = event_rows
        .iter()
        .map(|e| {
            Ok(Event {
                event_type: e.get::<String, _>("event_type").parse()?,
                start_time: from_micros(e.get("start_time"))?,
                duration_secs: e.get("duration_secs"),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let stat_rows = sqlx::query(
        "SELECT signal_name, unit, minimum, average, median, percentile_95, percentile_995, maximum \
         FROM signal_statistics WHERE day_id = ? ORDER BY rowid",
    )
    .bind(day_id)
    .fetch_all(&mut *conn)
    .await?;

    day.statistics = stat_rows
        .iter()
        .map(|s| SignalStatistics {
            signal_name: s.get("signal_name"),
            unit: s.get("unit"),
            minimum: s.get("minimum"),
            average: s.get("average"),
            median: s.get("median"),
            percentile_95: s.get("percentile_95"),
            percentile_995: s.get("percentile_995"),
            maximum: s.get("maximum"),
        })
        .collect();

    Ok(Some(day))
}

async fn write_day(conn: &mut SqliteConnection, profile_id: i64, day: &Day) -> Result<()> {
    let date = format_date(day.report_date);

    sqlx::query(
        r#"
        INSERT INTO days (profile_id, report_date, recording_start, recording_end)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(profile_id, report_date) DO UPDATE SET
            recording_start = excluded.recording_start,
            recording_end = excluded.recording_end
        "#,
    )
    .bind(profile_id)
    .bind(&date)
    .bind(day.recording_start.map(to_micros))
    .bind(day.recording_end.map(to_micros))
    .execute(&mut *conn)
    .await?;

    let day_id: i64 =
        sqlx::query_scalar("SELECT id FROM days WHERE profile_id = ? AND report_date = ?")
            .bind(profile_id)
            .bind(&date)
            .fetch_one(&mut *conn)
            .await?;

    // Delete old children
    sqlx::query("DELETE FROM signals WHERE session_id IN (SELECT id FROM sessions WHERE day_id = ?)")
        .bind(day_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM sessions WHERE day_id = ?")
        .bind(day_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM events WHERE day_id = ?")
        .bind(day_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM signal_statistics WHERE day_id = ?")
        .bind(day_id)
        .execute(&mut *conn)
        .await?;

    for (index, session) in day.sessions.iter().enumerate() {
        let session_id = sqlx::query(
            "INSERT INTO sessions (day_id, session_index, source_type, start_time, end_time) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(day_id)
        .bind(index as i64)
        .bind(session.source_type.as_str())
        .bind(to_micros(session.start_time))
        .bind(to_micros(session.end_time))
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        for signal in &session.signals {
            sqlx::query(
                r#"
                INSERT INTO signals (session_id, name, unit, frequency_hz, start_time,
                                     min_value, max_value, samples)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(&signal.name)
            .bind(&signal.unit)
            .bind(signal.frequency_hz)
            .bind(to_micros(signal.start_time))
            .bind(signal.min_value)
            .bind(signal.max_value)
            .bind(samples_to_blob(&signal.samples))
            .execute(&mut *conn)
            .await?;
        }
    }

    for event in &day.events {
        sqlx::query(
            "INSERT INTO events (day_id, event_type, start_time, duration_secs) VALUES (?, ?, ?, ?)",
        )
        .bind(day_id)
        .bind(event.event_type.as_str())
        .bind(to_micros(event.start_time))
        .bind(event.duration_secs)
        .execute(&mut *conn)
        .await?;
    }

    for stats in &day.statistics {
        sqlx::query(
            r#"
            INSERT INTO signal_statistics (day_id, signal_name, unit, minimum, average, median,
                                           percentile_95, percentile_995, maximum)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(day_id)
        .bind(&stats.signal_name)
        .bind(&stats.unit)
        .bind(stats.minimum)
        .bind(stats.average)
        .bind(stats.median)
        .bind(stats.percentile_95)
        .bind(stats.percentile_995)
        .bind(stats.maximum)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}

fn to_micros(t: NaiveDateTime) -> i64 {
    t.and_utc().timestamp_micros()
}

fn from_micros(us: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(us.div_euclid(1_000_000), (us.rem_euclid(1_000_000) * 1_000) as u32)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| anyhow!("timestamp out of range: {}", us))
}

/// Encode samples as a BLOB (little-endian f64 bytes).
pub fn samples_to_blob(samples: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 8);
    for &v in samples {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`samples_to_blob`].
pub fn blob_to_samples(blob: &[u8]) -> Vec<f64> {
    blob.chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect()
}
