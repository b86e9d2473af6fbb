use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How one queued session went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub id: String,
    pub user: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub targets_imaged: Vec<String>,
    pub targets_skipped: Vec<String>,
    pub science_frames: u32,
    pub dark_frames: u32,
    pub bias_frames: u32,
    pub artifacts: Vec<String>,
}

/// Record of a whole night's run, written back out after every session so
/// a crash loses at most the session in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightReport {
    pub night: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sessions: Vec<SessionResult>,
}

impl NightReport {
    pub fn new(night: impl Into<String>) -> Self {
        Self {
            night: night.into(),
            started_at: Utc::now(),
            completed_at: None,
            sessions: Vec::new(),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| io::Error::other(format!("could not serialize night report: {}", e)))?;
        std::fs::write(path, contents)
    }
}
