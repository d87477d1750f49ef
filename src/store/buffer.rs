use super::write_atomic;
use crate::error::Result;
use crate::models::BufferedRecord;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const BUFFER_FILE: &str = "api_data_buffer.json";

/// JSON array of pending live records plus monthly JSONL logs
#[derive(Debug, Clone)]
pub struct BufferStore {
    dir: PathBuf,
}

impl BufferStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn buffer_path(&self) -> PathBuf {
        self.dir.join(BUFFER_FILE)
    }

    pub fn log_path(&self, at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!("api_data_{}.jsonl", at.format("%Y%m")))
    }

    /// Pending records. A missing buffer is empty; a corrupt one is reset.
    pub fn load(&self) -> Result<Vec<BufferedRecord>> {
        let path = self.buffer_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read(&path)?;
        match serde_json::from_slice::<Vec<BufferedRecord>>(&content) {
            Ok(records) => {
                debug!(records = records.len(), "Loaded online-learning buffer");
                Ok(records)
            }
            Err(e) => {
                warn!(path = %path.display(), "Buffer file is corrupt, resetting: {}", e);
                self.save(&[])?;
                Ok(Vec::new())
            }
        }
    }

    pub fn save(&self, records: &[BufferedRecord]) -> Result<()> {
        write_atomic(&self.buffer_path(), &serde_json::to_vec_pretty(records)?)
    }

    pub fn clear(&self) -> Result<()> {
        self.save(&[])
    }

    /// Append one JSON line per record to this month's log
    pub fn append_log(&self, records: &[BufferedRecord], at: DateTime<Utc>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.log_path(at);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{}", line)?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_path_is_monthly() {
        let store = BufferStore::new("/data/online");
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            store.log_path(at),
            PathBuf::from("/data/online/api_data_202403.jsonl")
        );
    }

    #[test]
    fn test_missing_buffer_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = BufferStore::new(dir.path().join("nested"));
        assert!(store.load().unwrap().is_empty());

        store.clear().unwrap();
        assert!(store.buffer_path().exists());
    }
}
