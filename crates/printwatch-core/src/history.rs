// ── Print history log ──
//
// Append-only JSONL of finished prints, one record per line. Along with
// the recipient table this is the only durable artifact; everything
// else rebuilds from the next hub snapshot.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::PrintStatus;

/// One finished print.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintRecord {
    pub prefix: String,
    pub filename: Option<String>,
    /// Final lifecycle state (`complete` or `failed`).
    pub outcome: PrintStatus,
    pub progress_at_end: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: Option<u64>,
}

/// Queryable append-only log of finished prints.
pub struct PrintHistory {
    path: PathBuf,
}

impl PrintHistory {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one record.
    pub fn append(&self, record: &PrintRecord) -> Result<(), CoreError> {
        let storage_err = |e: std::io::Error| CoreError::Storage {
            path: self.path.display().to_string(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }

        let line = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(storage_err)?;
        writeln!(file, "{line}").map_err(storage_err)?;

        tracing::debug!(
            prefix = %record.prefix,
            outcome = %record.outcome,
            "print recorded"
        );
        Ok(())
    }

    /// The most recent `limit` records, newest last, optionally filtered
    /// by prefix. Malformed lines are skipped, not errors -- the log may
    /// span versions.
    pub fn recent(&self, limit: usize, prefix: Option<&str>) -> Result<Vec<PrintRecord>, CoreError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CoreError::Storage {
                    path: self.path.display().to_string(),
                    source: e,
                });
            }
        };

        let mut records: Vec<PrintRecord> = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| CoreError::Storage {
                path: self.path.display().to_string(),
                source: e,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PrintRecord>(&line) {
                Ok(record) => {
                    if prefix.is_none_or(|p| record.prefix == p) {
                        records.push(record);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "skipping malformed history line"),
            }
        }

        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(prefix: &str, outcome: PrintStatus) -> PrintRecord {
        PrintRecord {
            prefix: prefix.to_owned(),
            filename: Some("benchy.3mf".into()),
            outcome,
            progress_at_end: 100,
            started_at: Some(Utc::now() - chrono::Duration::hours(2)),
            ended_at: Utc::now(),
            duration_secs: Some(7200),
        }
    }

    #[test]
    fn append_and_query_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let history = PrintHistory::open(dir.path().join("history.jsonl"));

        history.append(&record("h2s", PrintStatus::Complete)).unwrap();
        history.append(&record("p1s", PrintStatus::Failed)).unwrap();
        history.append(&record("h2s", PrintStatus::Failed)).unwrap();

        let all = history.recent(10, None).unwrap();
        assert_eq!(all.len(), 3);

        let h2s_only = history.recent(10, Some("h2s")).unwrap();
        assert_eq!(h2s_only.len(), 2);
        assert_eq!(h2s_only[0].outcome, PrintStatus::Complete);
        assert_eq!(h2s_only[1].outcome, PrintStatus::Failed);
    }

    #[test]
    fn limit_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let history = PrintHistory::open(dir.path().join("history.jsonl"));

        for i in 0..5 {
            let mut r = record("h2s", PrintStatus::Complete);
            r.progress_at_end = i * 10;
            history.append(&r).unwrap();
        }

        let last_two = history.recent(2, None).unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].progress_at_end, 30);
        assert_eq!(last_two[1].progress_at_end, 40);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = PrintHistory::open(dir.path().join("history.jsonl"));
        assert!(history.recent(10, None).unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let history = PrintHistory::open(&path);

        history.append(&record("h2s", PrintStatus::Complete)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{{corrupt"))
            .unwrap();
        history.append(&record("h2s", PrintStatus::Failed)).unwrap();

        let all = history.recent(10, None).unwrap();
        assert_eq!(all.len(), 2);
    }
}
