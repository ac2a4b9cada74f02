//! Append-only CSV log of successful meter lookups.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// One logged lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEntry {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub number: String,
    pub region: String,
}

/// CSV file with a header line, appended under a lock
pub struct RequestLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RequestLog {
    /// Open the log, writing the header line if the file is new or empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let needs_header = std::fs::metadata(&path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        if needs_header {
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("Failed to create request log {}", path.display()))?;
            writer.write_record(["user_id", "timestamp", "number", "region"])?;
            writer.flush()?;
            info!("Created request log at {}", path.display());
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one lookup stamped with the current time
    pub fn record(&self, user_id: &str, number: &str, region: &str) -> Result<()> {
        self.append(&RequestEntry {
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            number: number.to_string(),
            region: region.to_string(),
        })
    }

    pub fn append(&self, entry: &RequestEntry) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("request log lock poisoned"))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open request log {}", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;

        debug!("Logged lookup of {} by {}", entry.number, entry.user_id);
        Ok(())
    }

    /// Every logged entry, oldest first
    pub fn entries(&self) -> Result<Vec<RequestEntry>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to read request log {}", self.path.display()))?;
        let mut entries = Vec::new();
        for entry in reader.deserialize() {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// Raw file contents for download
    pub fn contents(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path)
            .with_context(|| format!("Failed to read request log {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_writes_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs.csv");

        RequestLog::open(&path).unwrap();
        RequestLog::open(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "user_id,timestamp,number,region\n");
    }

    #[test]
    fn test_record_appends_rows() {
        let dir = tempdir().unwrap();
        let log = RequestLog::open(dir.path().join("logs.csv")).unwrap();

        log.record("42", "0099", "RegionX").unwrap();
        log.record("7", "100", "North").unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_id, "42");
        assert_eq!(entries[0].number, "0099");
        assert_eq!(entries[1].region, "North");
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }
}
