use chrono::Utc;
use log::{info, warn};

use crate::session::types::Session;
use crate::telescope::{CommandChannel, ExposureSettings, Telescope, TelescopeError};

/// What one session actually produced, for the night report.
#[derive(Debug, Default)]
pub struct SessionOutcome {
    pub success: bool,
    pub targets_imaged: Vec<String>,
    pub targets_skipped: Vec<String>,
    pub science_frames: u32,
    pub dark_frames: u32,
    pub bias_frames: u32,
    pub artifacts: Vec<String>,
}

/// Drives a full session: open the dome, visit every target, and for each
/// one shoot science frames through the planned filters plus matching
/// calibration frames. Hardware failures abort with the error; a dome
/// refused by the weather abandons the whole session instead.
pub fn run_session<C: CommandChannel>(
    telescope: &mut Telescope<C>,
    session: &Session,
) -> Result<SessionOutcome, TelescopeError> {
    telescope.configure(ExposureSettings {
        exposure_time: session.exposure_time,
        binning: session.binning,
        nodark: session.nodark,
        nobias: session.nobias,
    });

    let mut outcome = SessionOutcome::default();

    if !telescope.open_dome()? {
        warn!("Weather is not safe, abandoning session for {}", session.user);
        outcome.targets_skipped = session.targets.clone();
        outcome.artifacts = telescope.take_artifacts();
        return Ok(outcome);
    }

    let filters = session.filter_plan();
    let night = Utc::now().format("%Y-%m-%d").to_string();

    for target in &session.targets {
        // The mount may drop tracking between targets, re-enable every time.
        telescope.enable_tracking()?;
        if !telescope.goto_target(target)? {
            outcome.targets_skipped.push(target.clone());
            continue;
        }

        // One dark per filter, capped at the exposure count, topped up
        // afterwards so every target ends the night with exactly
        // exposure_count darks.
        let mut darks_taken = 0;
        for filter in &filters {
            telescope.enable_tracking()?;
            telescope.change_filter(filter)?;
            for seq in 0..session.exposure_count {
                let name = frame_name(
                    target,
                    filter,
                    session.exposure_time,
                    session.binning,
                    &night,
                    &session.user,
                    seq,
                );
                telescope.take_exposure(&name)?;
                outcome.science_frames += 1;
            }
            if !session.nodark && darks_taken < session.exposure_count {
                let name = frame_name(
                    target,
                    "dark",
                    session.exposure_time,
                    session.binning,
                    &night,
                    &session.user,
                    darks_taken,
                );
                telescope.take_dark(&name)?;
                darks_taken += 1;
                outcome.dark_frames += 1;
            }
        }
        telescope.change_filter("clear")?;

        while !session.nodark && darks_taken < session.exposure_count {
            let name = frame_name(
                target,
                "dark",
                session.exposure_time,
                session.binning,
                &night,
                &session.user,
                darks_taken,
            );
            telescope.take_dark(&name)?;
            darks_taken += 1;
            outcome.dark_frames += 1;
        }

        if !session.nobias {
            for seq in 0..10 * session.exposure_count {
                let name = frame_name(
                    target,
                    "bias",
                    crate::telescope::BIAS_EXPOSURE_S,
                    session.binning,
                    &night,
                    &session.user,
                    seq,
                );
                telescope.take_bias(&name)?;
                outcome.bias_frames += 1;
            }
        }

        info!("Finished imaging {}", target);
        outcome.targets_imaged.push(target.clone());
    }

    if session.close_after {
        telescope.close_dome()?;
    }

    outcome.success = true;
    outcome.artifacts = telescope.take_artifacts();
    Ok(outcome)
}

fn frame_name(
    target: &str,
    label: &str,
    seconds: f64,
    binning: u32,
    night: &str,
    user: &str,
    seq: u32,
) -> String {
    format!(
        "{}_{}_{}s_bin{}_{}_{}_num{}",
        sanitize(target),
        label,
        seconds,
        binning,
        night,
        sanitize(user),
        seq
    )
}

fn sanitize(part: &str) -> String {
    part.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telescope::channel::testing::{CommandLog, ScriptedChannel};
    use crate::telescope::command::{Command, FrameKind};
    use crate::telescope::DEFAULT_KEEP_OPEN;

    fn session(targets: &[&str]) -> Session {
        Session {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            exposure_time: 60.0,
            exposure_count: 1,
            filters: Vec::new(),
            rgb: false,
            binning: 2,
            user: "sam".to_string(),
            close_after: true,
            test_only: false,
            nodark: false,
            nobias: false,
        }
    }

    fn frames_of_kind(log: &CommandLog, kind: FrameKind) -> usize {
        log.borrow()
            .iter()
            .filter(|c| matches!(c, Command::TakeImage { kind: k, .. } if *k == kind))
            .count()
    }

    #[test]
    fn single_filter_darks_are_topped_up_to_the_exposure_count() {
        let (channel, log) = ScriptedChannel::clear_night();
        let mut scope = Telescope::new(channel, DEFAULT_KEEP_OPEN);
        let mut s = session(&["m31"]);
        s.exposure_count = 3;

        let outcome = run_session(&mut scope, &s).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.science_frames, 3);
        assert_eq!(outcome.dark_frames, 3);
        assert_eq!(frames_of_kind(&log, FrameKind::Dark), 3);
    }

    #[test]
    fn many_filters_never_push_darks_past_the_exposure_count() {
        let (channel, log) = ScriptedChannel::clear_night();
        let mut scope = Telescope::new(channel, DEFAULT_KEEP_OPEN);
        let mut s = session(&["m31"]);
        s.exposure_count = 2;
        s.filters = vec!["r", "g", "b", "h-alpha", "clear"]
            .into_iter()
            .map(String::from)
            .collect();

        let outcome = run_session(&mut scope, &s).unwrap();
        assert_eq!(outcome.science_frames, 10);
        assert_eq!(outcome.dark_frames, 2);
        assert_eq!(frames_of_kind(&log, FrameKind::Dark), 2);
    }

    #[test]
    fn ten_biases_per_science_exposure() {
        let (channel, log) = ScriptedChannel::clear_night();
        let mut scope = Telescope::new(channel, DEFAULT_KEEP_OPEN);
        let mut s = session(&["m31"]);
        s.exposure_count = 2;

        let outcome = run_session(&mut scope, &s).unwrap();
        assert_eq!(outcome.bias_frames, 20);
        assert_eq!(frames_of_kind(&log, FrameKind::Bias), 20);
    }

    #[test]
    fn nodark_and_nobias_skip_calibration_entirely() {
        let (channel, log) = ScriptedChannel::clear_night();
        let mut scope = Telescope::new(channel, DEFAULT_KEEP_OPEN);
        let mut s = session(&["m31"]);
        s.nodark = true;
        s.nobias = true;

        let outcome = run_session(&mut scope, &s).unwrap();
        assert_eq!(outcome.dark_frames, 0);
        assert_eq!(outcome.bias_frames, 0);
        assert_eq!(frames_of_kind(&log, FrameKind::Dark), 0);
        assert_eq!(frames_of_kind(&log, FrameKind::Bias), 0);
        assert_eq!(frames_of_kind(&log, FrameKind::Light), 1);
    }

    #[test]
    fn invisible_targets_are_skipped_without_slewing() {
        let mut dome_open = false;
        let (channel, log) = ScriptedChannel::new(move |command| {
            Ok(match command {
                Command::OpenDome { .. } => {
                    dome_open = true;
                    String::new()
                }
                Command::SlitStatus => {
                    if dome_open { "slit=open" } else { "slit=closed" }.to_string()
                }
                Command::SunAltitude => "alt=-30.0".to_string(),
                Command::Weather => "rain=0 cloud=0.1".to_string(),
                Command::TargetAltAz { target } if target == "ngc1" => {
                    "alt=12.0 az=40.0".to_string()
                }
                Command::TargetAltAz { .. } => "alt=55.0 az=90.0".to_string(),
                _ => String::new(),
            })
        });
        let mut scope = Telescope::new(channel, DEFAULT_KEEP_OPEN);
        let s = session(&["m31", "ngc1"]);

        let outcome = run_session(&mut scope, &s).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.targets_imaged, vec!["m31".to_string()]);
        assert_eq!(outcome.targets_skipped, vec!["ngc1".to_string()]);
        assert!(!log
            .borrow()
            .iter()
            .any(|c| matches!(c, Command::Point { target } if target == "ngc1")));
    }

    #[test]
    fn bad_weather_abandons_the_session_with_the_dome_shut() {
        let (channel, log) = ScriptedChannel::new(|command| {
            Ok(match command {
                Command::SlitStatus => "slit=closed".to_string(),
                Command::SunAltitude => "alt=-30.0".to_string(),
                Command::Weather => "rain=1 cloud=0.8".to_string(),
                _ => String::new(),
            })
        });
        let mut scope = Telescope::new(channel, DEFAULT_KEEP_OPEN);
        let s = session(&["m31", "m42"]);

        let outcome = run_session(&mut scope, &s).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.targets_skipped.len(), 2);
        assert!(outcome.targets_imaged.is_empty());
        assert_eq!(outcome.science_frames, 0);
        let history = log.borrow();
        assert!(!history.iter().any(|c| matches!(c, Command::OpenDome { .. })));
        assert!(!history.iter().any(|c| matches!(c, Command::TakeImage { .. })));
    }

    #[test]
    fn close_after_controls_the_end_of_session_closedown() {
        let (channel, log) = ScriptedChannel::clear_night();
        let mut scope = Telescope::new(channel, DEFAULT_KEEP_OPEN);
        let mut s = session(&["m31"]);
        s.close_after = false;
        run_session(&mut scope, &s).unwrap();
        assert!(!log.borrow().iter().any(|c| matches!(c, Command::CloseDome)));

        let (channel, log) = ScriptedChannel::clear_night();
        let mut scope = Telescope::new(channel, DEFAULT_KEEP_OPEN);
        let s = session(&["m31"]);
        run_session(&mut scope, &s).unwrap();
        let closes = log
            .borrow()
            .iter()
            .filter(|c| matches!(c, Command::CloseDome))
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn frame_names_carry_the_whole_capture_context() {
        assert_eq!(
            frame_name("C 34", "r", 60.0, 2, "2026-08-22", "sam smith", 4),
            "C_34_r_60s_bin2_2026-08-22_sam_smith_num4"
        );
        assert_eq!(
            frame_name("m31", "bias", 0.5, 1, "2026-08-22", "sam", 0),
            "m31_bias_0.5s_bin1_2026-08-22_sam_num0"
        );
    }
}
