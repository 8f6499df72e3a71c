//! Rolling gzip batch files of JSON lines
//!
//! Lines are appended to `<dir>/<epoch>.gz`, where `epoch` is the Unix time
//! the batch was opened. Once a batch is older than the rotation interval
//! the next write closes it and opens a new one, so a quiet period produces
//! no empty files.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-4: Audit Log Storage Capacity - Compressed, bounded-interval files
//! - AU-9: Protection of Audit Information - Completed batches are never reopened

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

struct Batch {
    opened_at: DateTime<Utc>,
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
}

impl Batch {
    fn open(dir: &Path, now: DateTime<Utc>) -> io::Result<Self> {
        let path = dir.join(format!("{}.gz", now.timestamp()));
        // Appending to an existing file adds a new gzip member
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Opened batch file");

        Ok(Self {
            opened_at: now,
            path,
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
        })
    }

    fn finish(self) -> io::Result<PathBuf> {
        let mut writer = self.encoder.finish()?;
        writer.flush()?;
        Ok(self.path)
    }
}

/// Time-rotated gzip writer
pub struct BatchWriter {
    dir: PathBuf,
    interval: chrono::Duration,
    current: Option<Batch>,
}

impl BatchWriter {
    /// Create `dir` if needed; no file is opened until the first line
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let interval = chrono::Duration::from_std(interval)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        Ok(Self {
            dir,
            interval,
            current: None,
        })
    }

    /// Path of the batch currently being written
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|batch| batch.path.as_path())
    }

    /// Append one line, rotating first when the open batch has expired
    pub fn write_line(&mut self, line: &str, now: DateTime<Utc>) -> io::Result<()> {
        let expired = self
            .current
            .as_ref()
            .is_some_and(|batch| now.signed_duration_since(batch.opened_at) >= self.interval);
        if expired {
            self.finish()?;
        }

        let batch = match self.current.take() {
            Some(batch) => batch,
            None => Batch::open(&self.dir, now)?,
        };
        let batch = self.current.insert(batch);
        batch.encoder.write_all(line.as_bytes())?;
        batch.encoder.write_all(b"\n")
    }

    /// Close the open batch, returning its path
    pub fn finish(&mut self) -> io::Result<Option<PathBuf>> {
        let Some(batch) = self.current.take() else {
            return Ok(None);
        };
        let path = batch.finish()?;
        info!(path = %path.display(), "Batch file complete");
        Ok(Some(path))
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if let Some(batch) = self.current.take() {
            let _ = batch.finish();
        }
    }
}
