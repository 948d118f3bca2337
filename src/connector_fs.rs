//! Filesystem scan for import files.
//!
//! Walks `[connectors.filesystem].root`, filters paths with the configured
//! include/exclude globs, and decodes every remaining file with the first
//! matching decoder. A file that fails to decode is reported and skipped;
//! the rest of the scan carries on.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use dayline_core::models::ImportBatch;
use dayline_core::ImportError;

use crate::config::Config;
use crate::decoders::{DecodeOptions, DecoderRegistry};
use crate::progress::{ImportProgressEvent, ImportProgressReporter};

/// Everything a scan produced.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Decoded batches, in path order.
    pub batches: Vec<ImportBatch>,
    /// Files that could not be read or decoded.
    pub failures: Vec<ImportError>,
    /// Files no decoder accepts.
    pub skipped: Vec<String>,
    /// Files that decoded to no sessions.
    pub empty: usize,
}

pub fn scan_import_dir(
    config: &Config,
    registry: &DecoderRegistry,
    options: &DecodeOptions,
    progress: &dyn ImportProgressReporter,
) -> Result<ScanReport> {
    let fs_config = config
        .connectors
        .filesystem
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Filesystem connector not configured"))?;

    let root = &fs_config.root;
    if !root.exists() {
        bail!(
            "Filesystem connector root does not exist: {}",
            root.display()
        );
    }

    let include_set = build_globset(&fs_config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string()];
    default_excludes.extend(fs_config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files: Vec<(PathBuf, String)> = Vec::new();

    let walker = WalkDir::new(root).follow_links(fs_config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        // Apply include patterns
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push((path.to_path_buf(), rel_str));
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.1.cmp(&b.1));

    let mut report = ScanReport::default();
    let total = files.len() as u64;

    for (n, (path, rel_str)) in files.iter().enumerate() {
        progress.report(ImportProgressEvent::Decoding {
            file: rel_str.clone(),
            n: n as u64 + 1,
            total,
        });

        match decode_file(registry, options, path, rel_str) {
            Ok(Some(batch)) => report.batches.push(batch),
            Ok(None) => {
                debug!(file = %rel_str, "no sessions in file");
                report.empty += 1;
            }
            Err(DecodeSkip::NoDecoder) => {
                debug!(file = %rel_str, "no decoder for file");
                report.skipped.push(rel_str.clone());
            }
            Err(DecodeSkip::Failed(e)) => {
                warn!("{}", e);
                report.failures.push(e);
            }
        }
    }

    Ok(report)
}

enum DecodeSkip {
    NoDecoder,
    Failed(ImportError),
}

fn decode_file(
    registry: &DecoderRegistry,
    options: &DecodeOptions,
    path: &Path,
    rel_str: &str,
) -> std::result::Result<Option<ImportBatch>, DecodeSkip> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let decoder = registry.find_for(&file_name).ok_or(DecodeSkip::NoDecoder)?;

    let bytes = std::fs::read(path)
        .map_err(|e| DecodeSkip::Failed(ImportError::decode(rel_str, e)))?;

    decoder
        .decode(rel_str, &bytes, options)
        .map_err(|e| DecodeSkip::Failed(ImportError::decode(rel_str, format!("{:#}", e))))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(root: &Path) -> Config {
        parse_config(&format!(
            "[db]\npath = \"unused.sqlite\"\n\n[connectors.filesystem]\nroot = \"{}\"\nexclude_globs = [\"**/skip/**\"]\n",
            root.display()
        ))
        .unwrap()
    }

    #[test]
    fn scan_decodes_and_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("oxi")).unwrap();
        fs::create_dir_all(root.join("skip")).unwrap();

        fs::write(
            root.join("oxi/night.csv"),
            "time,spo2,pulse\n2024-01-01T22:00:00,97,60\n2024-01-01T22:00:01,96,61\n",
        )
        .unwrap();
        fs::write(root.join("oxi/broken.csv"), "time,spo2,pulse\nyesterday,97,60\n").unwrap();
        fs::write(root.join("empty.json"), r#"{"sessions": []}"#).unwrap();
        fs::write(root.join("skip/ignored.csv"), "garbage").unwrap();

        let registry = DecoderRegistry::with_builtins();
        let report = scan_import_dir(
            &config_for(root),
            &registry,
            &DecodeOptions::default(),
            &NoProgress,
        )
        .unwrap();

        assert_eq!(report.batches.len(), 1);
        assert_eq!(report.batches[0].source, "oxi/night.csv");
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].is_recoverable());
        assert_eq!(report.empty, 1);
    }

    #[test]
    fn scan_requires_existing_root() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(&tmp.path().join("missing"));
        let registry = DecoderRegistry::with_builtins();
        assert!(scan_import_dir(&cfg, &registry, &DecodeOptions::default(), &NoProgress).is_err());
    }
}
