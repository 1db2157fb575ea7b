// ABOUTME: Append-only JSONL revision log, one serialized record per line.
// ABOUTME: Provides crash-safe append, sequential load, repair, and filtered scans.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use labtrail_core::{LogError, RevisionLog, RevisionRecord};
use thiserror::Error;

/// Errors from the JSONL revision log.
#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A revision log backed by a single append-only JSONL file.
///
/// Each line is one JSON-serialized [`RevisionRecord`]. Scans re-read the
/// file on every call, so a lookup always sees the records visible at
/// that moment; the file is the source of truth, not process state.
pub struct JsonlLog {
    path: PathBuf,
    file: File,
}

impl JsonlLog {
    /// Returns the path to the underlying JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (or create) a JSONL revision log at the given path.
    /// Creates parent directories if they do not exist.
    pub fn open(path: &Path) -> Result<Self, JsonlError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one record. Serializes as a single JSON line and fsyncs to
    /// disk. This is the write path's hook; readers never call it.
    pub fn append(&mut self, record: &RevisionRecord) -> Result<(), JsonlError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.file, "{}", json)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Load every record from a JSONL file in append order.
    /// Empty lines are skipped; an empty file yields an empty Vec.
    pub fn read_all(path: &Path) -> Result<Vec<RevisionRecord>, JsonlError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RevisionRecord = serde_json::from_str(&line)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Repair a potentially corrupted JSONL file by keeping only complete,
    /// parseable lines and truncating partial trailing data. Uses atomic
    /// temp-file + fsync + rename to prevent data loss on crash.
    /// Returns the count of valid records retained.
    pub fn repair(path: &Path) -> Result<usize, JsonlError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut valid_lines: Vec<String> = Vec::new();
        let mut dropped = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if serde_json::from_str::<RevisionRecord>(&line).is_ok() {
                valid_lines.push(line);
            } else {
                dropped += 1;
            }
        }

        let count = valid_lines.len();

        let tmp_path = path.with_extension("jsonl.tmp");
        let mut tmp_file = File::create(&tmp_path)?;
        for line in &valid_lines {
            writeln!(tmp_file, "{}", line)?;
        }
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, path)?;

        // Fsync the parent directory so the rename metadata is durable.
        // Best-effort: if this fails, the rename already succeeded and the
        // data is consistent.
        if let Some(parent) = path.parent()
            && let Ok(dir) = File::open(parent)
        {
            let _ = dir.sync_all();
        }

        if dropped > 0 {
            tracing::warn!(
                "repaired revision log {}: kept {} records, dropped {} unparseable lines",
                path.display(),
                count,
                dropped
            );
        } else {
            tracing::info!("revision log {} is clean: {} records", path.display(), count);
        }

        Ok(count)
    }
}

impl RevisionLog for JsonlLog {
    fn scan(&self, entity_type: &str, natural_id: u64) -> Result<Vec<RevisionRecord>, LogError> {
        let mut records: Vec<RevisionRecord> = Self::read_all(&self.path)
            .map_err(LogError::backend)?
            .into_iter()
            .filter(|r| r.entity_type == entity_type && r.natural_id == natural_id)
            .collect();
        records.sort_by_key(|r| r.revision_number);
        Ok(records)
    }

    fn scan_many(
        &self,
        entity_type: &str,
        natural_ids: &[u64],
    ) -> Result<HashMap<u64, Vec<RevisionRecord>>, LogError> {
        let wanted: HashSet<u64> = natural_ids.iter().copied().collect();
        let mut histories: HashMap<u64, Vec<RevisionRecord>> = HashMap::new();

        for record in Self::read_all(&self.path).map_err(LogError::backend)? {
            if record.entity_type == entity_type && wanted.contains(&record.natural_id) {
                histories.entry(record.natural_id).or_default().push(record);
            }
        }

        for records in histories.values_mut() {
            records.sort_by_key(|r| r.revision_number);
        }
        Ok(histories)
    }
}
