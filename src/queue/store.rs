use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::Session;

pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("queue file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode queue record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One accepted submission, as a line in the night's queue file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub version: u32,
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub session: Session,
}

/// Append-only storage for queued sessions, one JSON document per line,
/// one file per night.
pub struct QueueStore {
    base: PathBuf,
    prefix: String,
}

impl QueueStore {
    pub fn new(base: impl Into<PathBuf>, prefix: Option<String>) -> Self {
        Self {
            base: base.into(),
            prefix: prefix.unwrap_or_default(),
        }
    }

    pub fn night_file(&self, night: NaiveDate) -> PathBuf {
        self.base.join(format!(
            "{}{}_imaging_queue.json",
            self.prefix,
            night.format("%Y-%m-%d")
        ))
    }

    pub fn report_file(&self, night: NaiveDate) -> PathBuf {
        self.base.join(format!(
            "{}{}_night_report.yaml",
            self.prefix,
            night.format("%Y-%m-%d")
        ))
    }

    /// Stamps the session with an id and appends it to tonight's file.
    pub fn append(&self, session: &Session) -> Result<QueueRecord, StoreError> {
        let received_at = Utc::now();
        let record = QueueRecord {
            version: RECORD_VERSION,
            id: generate_id(&received_at),
            received_at,
            session: session.clone(),
        };
        let line = serde_json::to_string(&record)?;

        fs::create_dir_all(&self.base)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.night_file(received_at.date_naive()))?;
        writeln!(file, "{}", line)?;
        Ok(record)
    }

    /// Everything queued for the given night, in submission order. Lines
    /// that fail to parse or carry an unknown version are logged and
    /// skipped rather than poisoning the rest of the file.
    pub fn load_all(&self, night: NaiveDate) -> Result<Vec<QueueRecord>, StoreError> {
        let path = self.night_file(night);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<QueueRecord>(line) {
                Ok(record) if record.version == RECORD_VERSION => records.push(record),
                Ok(record) => {
                    error!(
                        "{}:{}: unsupported record version {}, skipping",
                        path.display(),
                        lineno + 1,
                        record.version
                    );
                }
                Err(e) => {
                    error!(
                        "{}:{}: could not parse queue record: {}",
                        path.display(),
                        lineno + 1,
                        e
                    );
                }
            }
        }
        Ok(records)
    }
}

fn generate_id(received_at: &DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        received_at.format("%Y%m%dT%H%M%SZ"),
        uuid::Uuid::new_v4()
    )
}
