use std::time::Duration;

use log::{error, info, warn};
use strum_macros::Display;

use crate::telescope::command::{Command, FrameKind};
use crate::telescope::parsing;
use crate::telescope::{CommandChannel, TelescopeError};

pub const MAX_SUN_ALT_DEG: f64 = -1.0;
pub const MAX_CLOUD_COVER: f64 = 0.4;
pub const MIN_TARGET_ALT_DEG: f64 = 40.0;
pub const BIAS_EXPOSURE_S: f64 = 0.5;
pub const DEFAULT_KEEP_OPEN: Duration = Duration::from_secs(20_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DomeState {
    Open,
    Closed,
}

/// Exposure parameters for the frames of one session.
#[derive(Debug, Clone)]
pub struct ExposureSettings {
    pub exposure_time: f64,
    pub binning: u32,
    pub nodark: bool,
    pub nobias: bool,
}

impl Default for ExposureSettings {
    fn default() -> Self {
        Self {
            exposure_time: 1.0,
            binning: 1,
            nodark: false,
            nobias: false,
        }
    }
}

/// Hardware-facing state machine. Holds no authoritative state of its own:
/// dome, tracking and filter belong to the hardware and are re-queried
/// whenever they matter.
pub struct Telescope<C> {
    channel: C,
    keep_open_s: u64,
    settings: ExposureSettings,
    artifacts: Vec<String>,
}

impl<C: CommandChannel> Telescope<C> {
    pub fn new(channel: C, keep_open: Duration) -> Self {
        Self {
            channel,
            keep_open_s: keep_open.as_secs(),
            settings: ExposureSettings::default(),
            artifacts: Vec::new(),
        }
    }

    /// Sets the exposure parameters used by subsequent captures; called
    /// once per session.
    pub fn configure(&mut self, settings: ExposureSettings) {
        self.settings = settings;
    }

    /// Names of every frame captured so far, drained by the caller.
    pub fn take_artifacts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.artifacts)
    }

    pub fn keep_open(&self) -> Duration {
        Duration::from_secs(self.keep_open_s)
    }

    pub fn dome_status(&mut self) -> Result<DomeState, TelescopeError> {
        let output = self.channel.run(&Command::SlitStatus)?;
        parsing::parse_slit_status(&output)
    }

    /// Fail-safe weather gate. The sun must sit below -1 degrees, it must not
    /// rain and cloud cover must stay under 0.4; a failed query or a
    /// missing token counts as bad weather. The weather line is only
    /// queried once the sun check has passed.
    pub fn weather_ok(&mut self) -> bool {
        let sun = match self.channel.run(&Command::SunAltitude) {
            Ok(output) => output,
            Err(e) => {
                error!("Sun altitude query failed: {}", e);
                return false;
            }
        };
        let sun_alt = match parsing::find_float("alt", &sun) {
            Some(alt) => alt,
            None => {
                error!("No alt= token in sun output {:?}", sun);
                return false;
            }
        };
        if sun_alt >= MAX_SUN_ALT_DEG {
            info!("Sun at {:.1} deg, too high to open", sun_alt);
            return false;
        }

        let weather = match self.channel.run(&Command::Weather) {
            Ok(output) => output,
            Err(e) => {
                error!("Weather query failed: {}", e);
                return false;
            }
        };
        match (
            parsing::find_float("rain", &weather),
            parsing::find_float("cloud", &weather),
        ) {
            (Some(rain), Some(cloud)) => {
                let ok = rain == 0.0 && cloud < MAX_CLOUD_COVER;
                if !ok {
                    info!("Weather not safe: rain={} cloud={}", rain, cloud);
                }
                ok
            }
            _ => {
                error!("Weather output missing rain=/cloud= tokens: {:?}", weather);
                false
            }
        }
    }

    /// Fail-safe visibility gate: the target must sit at 40 degrees or
    /// higher.
    pub fn target_visible(&mut self, target: &str) -> bool {
        let command = Command::TargetAltAz {
            target: target.to_string(),
        };
        let output = match self.channel.run(&command) {
            Ok(output) => output,
            Err(e) => {
                error!("Alt/az query for {} failed: {}", target, e);
                return false;
            }
        };
        match parsing::find_float("alt", &output) {
            Some(alt) => alt >= MIN_TARGET_ALT_DEG,
            None => {
                error!("No alt= token in altaz output {:?}", output);
                false
            }
        }
    }

    /// Opens the dome if the weather allows it. `Ok(true)` means the dome
    /// is open when this returns; `Ok(false)` means the weather said no.
    /// Already-open is a no-op success.
    pub fn open_dome(&mut self) -> Result<bool, TelescopeError> {
        if self.dome_status()? == DomeState::Open {
            info!("Dome already open");
            return Ok(true);
        }
        if !self.weather_ok() {
            return Ok(false);
        }
        info!("Opening dome");
        self.channel.run(&Command::OpenDome {
            keep_open_s: self.keep_open_s,
        })?;
        Ok(true)
    }

    /// Closes the dome and logs out, unconditionally.
    pub fn close_dome(&mut self) -> Result<(), TelescopeError> {
        info!("Closing dome");
        self.channel.run(&Command::CloseDome)?;
        Ok(())
    }

    /// Points at the target if it is visible; `Ok(false)` skips without
    /// touching the mount.
    pub fn goto_target(&mut self, target: &str) -> Result<bool, TelescopeError> {
        if !self.target_visible(target) {
            warn!("{} is not visible, not slewing", target);
            return Ok(false);
        }
        info!("Pointing at {}", target);
        self.channel.run(&Command::Point {
            target: target.to_string(),
        })?;
        Ok(true)
    }

    pub fn current_filter(&mut self) -> Result<String, TelescopeError> {
        let output = self.channel.run(&Command::GetFilter)?;
        let name = output.trim().to_string();
        if name.is_empty() {
            return Err(TelescopeError::UnexpectedOutput {
                query: "filter",
                output,
            });
        }
        Ok(name)
    }

    pub fn change_filter(&mut self, name: &str) -> Result<(), TelescopeError> {
        info!("Changing filter to {}", name);
        self.channel.run(&Command::SetFilter {
            name: name.to_string(),
        })?;
        Ok(())
    }

    pub fn enable_tracking(&mut self) -> Result<(), TelescopeError> {
        self.channel.run(&Command::Track { enable: true })?;
        Ok(())
    }

    pub fn take_exposure(&mut self, outfile: &str) -> Result<(), TelescopeError> {
        self.capture(FrameKind::Light, self.settings.exposure_time, outfile)
    }

    pub fn take_dark(&mut self, outfile: &str) -> Result<(), TelescopeError> {
        if self.settings.nodark {
            return Ok(());
        }
        self.capture(FrameKind::Dark, self.settings.exposure_time, outfile)
    }

    pub fn take_bias(&mut self, outfile: &str) -> Result<(), TelescopeError> {
        if self.settings.nobias {
            return Ok(());
        }
        self.capture(FrameKind::Bias, BIAS_EXPOSURE_S, outfile)
    }

    fn capture(
        &mut self,
        kind: FrameKind,
        seconds: f64,
        outfile: &str,
    ) -> Result<(), TelescopeError> {
        info!("Capturing {} frame {}", kind, outfile);
        self.channel.run(&Command::TakeImage {
            seconds,
            binning: self.settings.binning,
            kind,
            outfile: outfile.to_string(),
        })?;
        self.artifacts.push(format!("{}.fits", outfile));
        Ok(())
    }
}
