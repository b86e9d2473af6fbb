pub mod report;

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use thiserror::Error;

use crate::queue::QueueRecord;
use crate::session::{run_session, SessionOutcome};
use crate::telescope::{CommandChannel, DomeState, DryRunChannel, Telescope, TelescopeError};

pub use report::{NightReport, SessionResult};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("session {id} failed: {source}")]
    Session {
        id: String,
        source: TelescopeError,
    },
    #[error("could not close the dome at the end of the night: {0}")]
    Closeout(TelescopeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Drains a night's queue against one telescope, in submission order.
/// The dome is guaranteed shut on every way out of `run`.
pub struct Executor<C> {
    telescope: Telescope<C>,
    records: Vec<QueueRecord>,
    report: NightReport,
    report_path: PathBuf,
}

impl<C: CommandChannel> Executor<C> {
    pub fn new(
        telescope: Telescope<C>,
        records: Vec<QueueRecord>,
        night: String,
        report_path: PathBuf,
    ) -> Self {
        Self {
            telescope,
            records,
            report: NightReport::new(night),
            report_path,
        }
    }

    pub fn run(mut self) -> Result<NightReport, ExecutorError> {
        info!("Executing {} queued sessions", self.records.len());

        let records = std::mem::take(&mut self.records);
        for record in records {
            if let Err(e) = record.session.validate() {
                warn!("Skipping session {}: {}", record.id, e);
                self.push_result(
                    &record,
                    Utc::now(),
                    SessionOutcome::default(),
                    Some(e.to_string()),
                );
                continue;
            }

            let started_at = Utc::now();
            info!("Starting session {} for {}", record.id, record.session.user);

            let result = if record.session.test_only {
                info!(
                    "Session {} is a rehearsal, imaging against a dry run channel",
                    record.id
                );
                let mut rehearsal = self.rehearsal_telescope();
                run_session(&mut rehearsal, &record.session)
            } else {
                run_session(&mut self.telescope, &record.session)
            };

            match result {
                Ok(outcome) => {
                    info!(
                        "Session {} finished: {} science, {} dark, {} bias frames",
                        record.id,
                        outcome.science_frames,
                        outcome.dark_frames,
                        outcome.bias_frames
                    );
                    self.push_result(&record, started_at, outcome, None);
                }
                Err(e) => {
                    error!("Session {} failed: {}", record.id, e);
                    self.emergency_close();
                    let outcome = SessionOutcome {
                        artifacts: self.telescope.take_artifacts(),
                        ..SessionOutcome::default()
                    };
                    self.push_result(&record, started_at, outcome, Some(e.to_string()));
                    if let Err(save) = self.finish() {
                        error!("Could not save the night report: {}", save);
                    }
                    return Err(ExecutorError::Session {
                        id: record.id,
                        source: e,
                    });
                }
            }
        }

        let close_result = self.close_out();
        let finish_result = self.finish();
        close_result?;
        finish_result?;
        Ok(self.report)
    }

    fn rehearsal_telescope(&self) -> Telescope<DryRunChannel> {
        Telescope::new(DryRunChannel::default(), self.telescope.keep_open())
    }

    fn emergency_close(&mut self) {
        warn!("Closing the dome after a failed session");
        if let Err(e) = self.telescope.close_dome() {
            error!("Dome close failed: {}", e);
            error!("Close the dome manually with `closedown` and `logout`");
        }
    }

    /// End of night close-out. An unreadable dome state is treated as
    /// open.
    fn close_out(&mut self) -> Result<(), ExecutorError> {
        match self.telescope.dome_status() {
            Ok(DomeState::Closed) => return Ok(()),
            Ok(DomeState::Open) => info!("Dome still open at the end of the night"),
            Err(e) => warn!("Could not read the dome state, closing anyway: {}", e),
        }
        self.telescope.close_dome().map_err(|e| {
            error!("Close the dome manually with `closedown` and `logout`");
            ExecutorError::Closeout(e)
        })
    }

    /// Records one session and checkpoints the report to disk. Checkpoint
    /// saves are best effort, the final save in `finish` surfaces errors.
    fn push_result(
        &mut self,
        record: &QueueRecord,
        started_at: DateTime<Utc>,
        outcome: SessionOutcome,
        error: Option<String>,
    ) {
        self.report.sessions.push(SessionResult {
            id: record.id.clone(),
            user: record.session.user.clone(),
            started_at,
            completed_at: Utc::now(),
            success: error.is_none() && outcome.success,
            error,
            targets_imaged: outcome.targets_imaged,
            targets_skipped: outcome.targets_skipped,
            science_frames: outcome.science_frames,
            dark_frames: outcome.dark_frames,
            bias_frames: outcome.bias_frames,
            artifacts: outcome.artifacts,
        });
        if let Err(e) = self.report.save(&self.report_path) {
            warn!("Could not save the night report: {}", e);
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.report.completed_at = Some(Utc::now());
        self.report.save(&self.report_path)
    }
}
