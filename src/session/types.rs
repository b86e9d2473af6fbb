use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("session lists no targets")]
    NoTargets,
    #[error("exposure time {0} is not positive")]
    BadExposureTime(f64),
    #[error("exposure count must be at least 1")]
    BadExposureCount,
    #[error("binning must be at least 1")]
    BadBinning,
    #[error("target name {0:?} contains unsupported characters")]
    BadTarget(String),
    #[error("filter name {0:?} contains unsupported characters")]
    BadFilter(String),
    #[error("user name {0:?} contains unsupported characters")]
    BadUser(String),
}

/// One observer's imaging request: which targets to shoot and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub targets: Vec<String>,
    pub exposure_time: f64,
    #[serde(default = "default_exposure_count")]
    pub exposure_count: u32,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub rgb: bool,
    #[serde(default = "default_binning")]
    pub binning: u32,
    pub user: String,
    #[serde(default = "default_close_after")]
    pub close_after: bool,
    #[serde(default)]
    pub test_only: bool,
    #[serde(default)]
    pub nodark: bool,
    #[serde(default)]
    pub nobias: bool,
}

fn default_exposure_count() -> u32 {
    1
}

fn default_binning() -> u32 {
    2
}

fn default_close_after() -> bool {
    true
}

/// Target, filter and user names end up unquoted inside shell command
/// lines, so only plain catalog characters get through.
fn name_is_clean(name: &str) -> bool {
    !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '+' | '-' | '_' | '.'))
}

impl Session {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.targets.is_empty() {
            return Err(SessionError::NoTargets);
        }
        if !(self.exposure_time > 0.0) {
            return Err(SessionError::BadExposureTime(self.exposure_time));
        }
        if self.exposure_count == 0 {
            return Err(SessionError::BadExposureCount);
        }
        if self.binning == 0 {
            return Err(SessionError::BadBinning);
        }
        for target in &self.targets {
            if !name_is_clean(target) {
                return Err(SessionError::BadTarget(target.clone()));
            }
        }
        for filter in &self.filters {
            if !name_is_clean(filter) {
                return Err(SessionError::BadFilter(filter.clone()));
            }
        }
        if !name_is_clean(&self.user) {
            return Err(SessionError::BadUser(self.user.clone()));
        }
        Ok(())
    }

    /// The filters each target is imaged through, in order. Explicit
    /// filters win over the `rgb` shorthand; with neither, everything goes
    /// through clear glass.
    pub fn filter_plan(&self) -> Vec<String> {
        if !self.filters.is_empty() {
            self.filters.clone()
        } else if self.rgb {
            vec!["r".to_string(), "g".to_string(), "b".to_string()]
        } else {
            vec!["clear".to_string()]
        }
    }
}
