use std::process::Command as StdCommand;

use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::telescope::command::Command;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
    },
}

/// Synchronous pipe to the telescope control host. Implementations run one
/// rendered command line to completion and hand back captured stdout.
pub trait CommandChannel {
    fn run(&mut self, command: &Command) -> Result<String, ChannelError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    pub host: String,
    pub user: String,
}

/// Runs commands through a local shell, or over ssh when the telescope is
/// only reachable from its control host.
pub struct ShellChannel {
    ssh: Option<SshConfig>,
}

impl ShellChannel {
    pub fn new(ssh: Option<SshConfig>) -> Self {
        Self { ssh }
    }
}

impl CommandChannel for ShellChannel {
    fn run(&mut self, command: &Command) -> Result<String, ChannelError> {
        let line = command.shell_line();
        info!("Executing `{}`", line);

        let output = match &self.ssh {
            Some(ssh) => StdCommand::new("ssh")
                .arg(format!("{}@{}", ssh.user, ssh.host))
                .arg(&line)
                .output(),
            None => StdCommand::new("sh").arg("-c").arg(&line).output(),
        };

        let output = output.map_err(|e| ChannelError::Io {
            command: line.clone(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(ChannelError::Failed {
                command: line,
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Logs every command instead of executing it. Queries answer with canned
/// values that keep a session moving: the sun is down, the sky is clear
/// and every target rides high. Dome state is tracked across open/close.
#[derive(Debug, Default)]
pub struct DryRunChannel {
    dome_open: bool,
}

impl CommandChannel for DryRunChannel {
    fn run(&mut self, command: &Command) -> Result<String, ChannelError> {
        info!("[dry run] {}", command.shell_line());
        let output = match command {
            Command::OpenDome { .. } => {
                self.dome_open = true;
                ""
            }
            Command::CloseDome => {
                self.dome_open = false;
                ""
            }
            Command::SlitStatus => {
                if self.dome_open {
                    "slit=open"
                } else {
                    "slit=closed"
                }
            }
            Command::SunAltitude => "alt=-35.2",
            Command::Weather => "rain=0 cloud=0.05",
            Command::TargetAltAz { .. } => "alt=55.0 az=120.0",
            Command::GetFilter => "clear",
            _ => "",
        };
        Ok(output.to_string())
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{ChannelError, Command, CommandChannel};

    pub type CommandLog = Rc<RefCell<Vec<Command>>>;

    /// Channel driven by a programmable script; records every command so
    /// tests can assert on exactly what reached the hardware.
    pub struct ScriptedChannel {
        log: CommandLog,
        respond: Box<dyn FnMut(&Command) -> Result<String, ChannelError>>,
    }

    impl ScriptedChannel {
        pub fn new<F>(respond: F) -> (Self, CommandLog)
        where
            F: FnMut(&Command) -> Result<String, ChannelError> + 'static,
        {
            let log: CommandLog = Rc::new(RefCell::new(Vec::new()));
            let channel = Self {
                log: log.clone(),
                respond: Box::new(respond),
            };
            (channel, log)
        }

        /// A cooperative night: dome state tracked, sun down, clear sky,
        /// every target at 50 degrees.
        pub fn clear_night() -> (Self, CommandLog) {
            let mut dome_open = false;
            Self::new(move |command| {
                Ok(match command {
                    Command::OpenDome { .. } => {
                        dome_open = true;
                        String::new()
                    }
                    Command::CloseDome => {
                        dome_open = false;
                        String::new()
                    }
                    Command::SlitStatus => if dome_open { "slit=open" } else { "slit=closed" }.to_string(),
                    Command::SunAltitude => "alt=-30.0".to_string(),
                    Command::Weather => "rain=0 cloud=0.1".to_string(),
                    Command::TargetAltAz { .. } => "alt=50.0 az=90.0".to_string(),
                    _ => String::new(),
                })
            })
        }
    }

    impl CommandChannel for ScriptedChannel {
        fn run(&mut self, command: &Command) -> Result<String, ChannelError> {
            self.log.borrow_mut().push(command.clone());
            (self.respond)(command)
        }
    }
}
