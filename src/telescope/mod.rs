pub mod channel;
pub mod command;
pub mod controller;
pub mod error;
pub mod parsing;

pub use channel::{ChannelError, CommandChannel, DryRunChannel, ShellChannel};
pub use controller::{
    DomeState, ExposureSettings, Telescope, BIAS_EXPOSURE_S, DEFAULT_KEEP_OPEN,
};
pub use error::TelescopeError;
