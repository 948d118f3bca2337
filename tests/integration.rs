use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dayline_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dayline");
    path
}

const DEVICE_DAYS: &str = r#"[
  {
    "report_date": "2024-01-01",
    "sessions": [
      {
        "source_type": "device",
        "start_time": "2024-01-01T22:00:00",
        "end_time": "2024-01-02T06:00:00",
        "signals": []
      }
    ],
    "events": [
      { "event_type": "obstructive_apnea", "start_time": "2024-01-01T23:15:00", "duration_secs": 14.0 }
    ]
  }
]"#;

/// Oximeter export sampled every 30 seconds from 22:10 to 05:50, with one
/// one-minute desaturation at 23:00.
fn oximetry_csv() -> String {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(22, 10, 0)
        .unwrap();
    let mut csv = String::from("Time,SpO2,Pulse\n");
    for i in 0..=920 {
        let t = start + chrono::Duration::seconds(i * 30);
        let spo2 = match i {
            100 | 101 => 90,
            _ if i % 10 == 0 => 95,
            _ => 97,
        };
        writeln!(csv, "{},{},{}", t.format("%Y-%m-%dT%H:%M:%S"), spo2, 58 + i % 5).unwrap();
    }
    csv
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let import_dir = root.join("import");
    fs::create_dir_all(import_dir.join("oximeter")).unwrap();
    fs::write(import_dir.join("oximeter/night-2024-01-01.csv"), oximetry_csv()).unwrap();
    fs::write(import_dir.join("notes.txt"), "not an import file").unwrap();

    fs::write(root.join("device-days.json"), DEVICE_DAYS).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/dayline.sqlite"

[import]
merge_gap_minutes = 60
margin_days = 1

[oximetry]
calibration_adjust = 0.0
time_adjust_secs = 0

[connectors.filesystem]
root = "{}/import"
include_globs = ["**/*.csv", "**/*.json"]
exclude_globs = []
follow_symlinks = false
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("dayline.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dayline(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dayline_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dayline binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn device_days_path(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("device-days.json")
        .to_string_lossy()
        .to_string()
}

/// init + load-days, the state every import test starts from.
fn seeded_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_dayline(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let days = device_days_path(&config_path);
    let (stdout, stderr, success) = run_dayline(&config_path, &["load-days", &days]);
    assert!(success, "load-days failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_dayline(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_dayline(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_dayline(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_load_days_creates_then_skips() {
    let (_tmp, config_path) = setup_test_env();
    run_dayline(&config_path, &["init"]);
    let days = device_days_path(&config_path);

    let (stdout, stderr, success) = run_dayline(&config_path, &["load-days", &days]);
    assert!(success, "load-days failed: {}", stderr);
    assert!(stdout.contains("days created: 1"), "stdout: {}", stdout);
    assert!(stdout.contains("most recent day: 2024-01-01"));

    let (stdout, _, success) = run_dayline(&config_path, &["load-days", &days]);
    assert!(success);
    assert!(stdout.contains("days created: 0"));
    assert!(stdout.contains("days skipped: 1"));
}

#[test]
fn test_import_merges_oximetry() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_dayline(
        &config_path,
        &["import", "--since", "2024-01-01", "--progress", "off"],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files decoded: 1"), "stdout: {}", stdout);
    assert!(stdout.contains("meta-sessions: 1"));
    assert!(stdout.contains("sessions added: 1"));
    assert!(stdout.contains("events added: 1"), "stdout: {}", stdout);
    assert!(stdout.contains("1 day updated"));
}

#[test]
fn test_import_twice_reports_nothing_new() {
    let (_tmp, config_path) = seeded_env();
    let args = ["import", "--since", "2024-01-01", "--progress", "off"];

    let (_, _, success) = run_dayline(&config_path, &args);
    assert!(success);

    let (stdout, stderr, success) = run_dayline(&config_path, &args);
    assert!(success, "second import failed: {}", stderr);
    assert!(stdout.contains("sessions added: 0"));
    assert!(stdout.contains("nothing new to import"));
}

#[test]
fn test_import_window_skips_old_files() {
    let (_tmp, config_path) = seeded_env();

    // Without --since the window starts at most `lookback_days` ago.
    let (stdout, stderr, success) =
        run_dayline(&config_path, &["import", "--progress", "off"]);
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("meta-sessions: 0"));
    assert!(stdout.contains("nothing new to import"));
}

#[test]
fn test_import_dry_run_writes_nothing() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, _, success) = run_dayline(
        &config_path,
        &["import", "--since", "2024-01-01", "--dry-run", "--progress", "off"],
    );
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(
        stdout.contains("1 day would be updated (dry-run, nothing written)"),
        "stdout: {}",
        stdout
    );
    assert!(!stdout.contains("1 day updated"));

    let (stdout, _, success) = run_dayline(
        &config_path,
        &["import", "--since", "2024-01-01", "--progress", "off"],
    );
    assert!(success);
    assert!(stdout.contains("1 day updated"));
}

#[test]
fn test_import_skips_undecodable_file() {
    let (tmp, config_path) = seeded_env();
    fs::write(
        tmp.path().join("import/oximeter/corrupt.csv"),
        "Time,SpO2,Pulse\nlast tuesday,97,60\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_dayline(
        &config_path,
        &["import", "--since", "2024-01-01", "--progress", "off"],
    );
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("decode failures: 1"));
    assert!(stdout.contains("corrupt.csv"));
    assert!(stdout.contains("1 day updated"));
}

#[test]
fn test_import_progress_json() {
    let (_tmp, config_path) = seeded_env();

    let (_, stderr, success) = run_dayline(
        &config_path,
        &["import", "--since", "2024-01-01", "--progress", "json"],
    );
    assert!(success);
    let events: Vec<serde_json::Value> = stderr
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    assert!(events.iter().any(|e| e["phase"] == "decoding"));
    assert!(events.iter().any(|e| e["phase"] == "reconciling" && e["date"] == "2024-01-01"));
    assert!(events
        .iter()
        .any(|e| e["event"] == "finished" && e["days_updated"] == 1));
}

#[test]
fn test_import_rejects_bad_progress_mode() {
    let (_tmp, config_path) = seeded_env();
    let (_, _, success) = run_dayline(&config_path, &["import", "--progress", "loud"]);
    assert!(!success);
}

#[test]
fn test_show_day_after_import() {
    let (_tmp, config_path) = seeded_env();
    run_dayline(
        &config_path,
        &["import", "--since", "2024-01-01", "--progress", "off"],
    );

    let (stdout, stderr, success) = run_dayline(&config_path, &["show", "2024-01-01"]);
    assert!(success, "show failed: {}", stderr);
    assert!(stdout.contains("Day 2024-01-01"));
    assert!(stdout.contains("Sessions (2)"));
    assert!(stdout.contains("pulse_oximetry"));
    assert!(stdout.contains("obstructive_apnea"));
    assert!(stdout.contains("desaturation"));
    assert!(stdout.contains("SpO2"));

    // Most recent day by default.
    let (stdout, _, success) = run_dayline(&config_path, &["show"]);
    assert!(success);
    assert!(stdout.contains("Day 2024-01-01"));
}

#[test]
fn test_show_missing_day_fails() {
    let (_tmp, config_path) = seeded_env();
    let (_, stderr, success) = run_dayline(&config_path, &["show", "2023-06-01"]);
    assert!(!success);
    assert!(stderr.contains("no data stored for 2023-06-01"));
}

#[test]
fn test_export_round_trips_through_load_days() {
    let (tmp, config_path) = seeded_env();
    run_dayline(
        &config_path,
        &["import", "--since", "2024-01-01", "--progress", "off"],
    );

    let export_path = tmp.path().join("out/export.json");
    let (_, stderr, success) = run_dayline(
        &config_path,
        &["export", "--output", export_path.to_str().unwrap()],
    );
    assert!(success, "export failed: {}", stderr);

    let exported: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&export_path).unwrap()).unwrap();
    assert_eq!(exported["profile_id"], 1);
    assert_eq!(exported["days"][0]["report_date"], "2024-01-01");
    assert_eq!(exported["days"][0]["sessions"].as_array().unwrap().len(), 2);

    // A fresh database loaded from the export holds the same day.
    let (_tmp2, other_config) = setup_test_env();
    run_dayline(&other_config, &["init"]);
    let (stdout, stderr, success) = run_dayline(
        &other_config,
        &["load-days", export_path.to_str().unwrap()],
    );
    assert!(success, "load-days from export failed: {}", stderr);
    assert!(stdout.contains("days created: 1"));

    let (stdout, _, _) = run_dayline(&other_config, &["show", "2024-01-01"]);
    assert!(stdout.contains("Sessions (2)"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = seeded_env();
    run_dayline(
        &config_path,
        &["import", "--since", "2024-01-01", "--progress", "off"],
    );

    let (stdout, stderr, success) = run_dayline(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Days:        1"));
    assert!(stdout.contains("Sessions:    2"));
    assert!(stdout.contains("Most recent: 2024-01-01"));
    assert!(stdout.contains("pulse_oximetry"));
}

#[test]
fn test_sources() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_dayline(&config_path, &["sources"]);
    assert!(success);
    assert!(stdout.contains("filesystem"));
    assert!(stdout.contains("OK"));
    assert!(stdout.contains("oximetry-csv"));
    assert!(stdout.contains("json"));
}

#[test]
fn test_missing_config_fails() {
    let (_, _, success) = run_dayline(Path::new("/nonexistent/dayline.toml"), &["init"]);
    assert!(!success);
}
