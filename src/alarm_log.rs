//! Append-only CSV record of every alarm the pipeline receives.

use crate::core::{AlarmEvent, AlarmRecorder, LogRecord};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

const HEADER: [&str; 3] = ["logged_at", "occurred_at", "message"];

#[derive(Error, Debug)]
pub enum LogError {
    #[error("alarm log I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode alarm log record: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes one CSV row per alarm to a file opened in append mode.
///
/// Rows are encoded in full before the file lock is taken, so concurrent
/// writers never interleave partial lines.
#[derive(Debug)]
pub struct CsvAlarmLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvAlarmLog {
    /// Opens (or creates) the log at `path`.
    ///
    /// A header row is written only when the file is created empty; existing
    /// logs are appended to as they are.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            debug!(path = %path.display(), "Writing alarm log header");
            file.write_all(&encode_row(&HEADER)?)?;
            file.flush()?;
        }

        info!("Alarm log opened at {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlarmRecorder for CsvAlarmLog {
    fn append(&self, event: &AlarmEvent) -> Result<(), LogError> {
        let record = LogRecord::from_event(event, Utc::now());
        let line = encode_record(&record)?;

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

fn encode_record(record: &LogRecord) -> Result<Vec<u8>, LogError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.serialize(record)?;
    writer.into_inner().map_err(|e| LogError::Io(e.into_error()))
}

fn encode_row(fields: &[&str]) -> Result<Vec<u8>, LogError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(fields)?;
    writer.into_inner().map_err(|e| LogError::Io(e.into_error()))
}
