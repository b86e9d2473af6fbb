use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FrameKind {
    Light,
    Dark,
    Bias,
}

/// Control commands understood by the telescope host. `shell_line` renders
/// the exact command string the hardware expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenDome { keep_open_s: u64 },
    CloseDome,
    SlitStatus,
    SunAltitude,
    Weather,
    TargetAltAz { target: String },
    Point { target: String },
    GetFilter,
    SetFilter { name: String },
    Track { enable: bool },
    TakeImage {
        seconds: f64,
        binning: u32,
        kind: FrameKind,
        outfile: String,
    },
}

impl Command {
    pub fn shell_line(&self) -> String {
        match self {
            Command::OpenDome { keep_open_s } => format!(
                "openup nocloud && keepopen maxtime={} slit && track on",
                keep_open_s
            ),
            Command::CloseDome => "closedown && logout".to_string(),
            Command::SlitStatus => "tx slit".to_string(),
            Command::SunAltitude => "sun".to_string(),
            Command::Weather => "tx taux".to_string(),
            Command::TargetAltAz { target } => format!("catalog {} | altaz", target),
            Command::Point { target } => format!("catalog {} | dopoint", target),
            Command::GetFilter => "pfilter".to_string(),
            Command::SetFilter { name } => format!("pfilter {}", name),
            Command::Track { enable: true } => "track on".to_string(),
            Command::Track { enable: false } => "track off".to_string(),
            Command::TakeImage {
                seconds,
                binning,
                kind,
                outfile,
            } => {
                let dark_flag = match kind {
                    FrameKind::Light => "",
                    FrameKind::Dark | FrameKind::Bias => "dark ",
                };
                format!(
                    "image time={} bin={} {}outfile={}.fits",
                    seconds, binning, dark_flag, outfile
                )
            }
        }
    }
}
