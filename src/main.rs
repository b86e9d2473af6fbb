mod client;
mod config;
mod console;
mod executor;
mod protocol;
mod queue;
mod server;
mod session;
mod telescope;

use std::io;
use std::path::Path;
use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};

use crate::client::Submitter;
use crate::config::Config;
use crate::executor::{Executor, ExecutorError, NightReport};
use crate::queue::QueueStore;
use crate::session::Session;
use crate::telescope::channel::SshConfig;
use crate::telescope::command::Command;
use crate::telescope::{CommandChannel, ShellChannel, Telescope};

#[derive(Parser)]
#[command(name = "nightqueue")]
#[command(about = "Telescope imaging queue control")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept imaging submissions over the network
    Serve {
        #[arg(short, long, default_value = "nightqueue.yaml")]
        config: String,
    },
    /// Queue an imaging session with a running server
    Submit {
        #[arg(short, long, default_value = "localhost:27748")]
        server: String,
        /// Catalog names of the targets to image
        #[arg(required = true)]
        targets: Vec<String>,
        /// Seconds per science frame
        #[arg(short = 't', long, default_value_t = 60.0)]
        exposure_time: f64,
        /// Frames per target and filter
        #[arg(short = 'c', long, default_value_t = 1)]
        exposure_count: u32,
        /// Filter to image through, may be given more than once
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        /// Shorthand for the r, g and b filters
        #[arg(long)]
        rgb: bool,
        #[arg(short, long, default_value_t = 2)]
        binning: u32,
        /// Observer the frames belong to
        #[arg(short, long)]
        user: String,
        /// Skip dark frames
        #[arg(long)]
        nodark: bool,
        /// Skip bias frames
        #[arg(long)]
        nobias: bool,
        /// Leave the dome open when the session finishes
        #[arg(long)]
        leave_open: bool,
        /// Rehearse against a dry run telescope instead of the hardware
        #[arg(long)]
        test_only: bool,
    },
    /// Open or close the server for submissions
    Intake {
        #[arg(short, long, default_value = "localhost:27748")]
        server: String,
        action: IntakeAction,
    },
    /// Execute a night's queue against the telescope
    Run {
        #[arg(short, long, default_value = "nightqueue.yaml")]
        config: String,
        /// Night to execute, defaults to today (UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// List the sessions queued for a night
    ShowQueue {
        #[arg(short, long, default_value = "nightqueue.yaml")]
        config: String,
        /// Night to list, defaults to today (UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Query the dome, filter and weather
    Status {
        #[arg(short, long, default_value = "nightqueue.yaml")]
        config: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum IntakeAction {
    Enable,
    Disable,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config),
        Commands::Submit {
            server,
            targets,
            exposure_time,
            exposure_count,
            filters,
            rgb,
            binning,
            user,
            nodark,
            nobias,
            leave_open,
            test_only,
        } => {
            let session = Session {
                targets,
                exposure_time,
                exposure_count,
                filters,
                rgb,
                binning,
                user,
                close_after: !leave_open,
                test_only,
                nodark,
                nobias,
            };
            submit(&server, session)
        }
        Commands::Intake { server, action } => intake(&server, action),
        Commands::Run { config, date } => run_night(&config, date),
        Commands::ShowQueue { config, date } => show_queue(&config, date),
        Commands::Status { config } => status(&config),
    }
}

fn serve(config_path: &str) -> ExitCode {
    let config = match Config::from_file(Path::new(config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Could not start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server::run_server(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn submit(server: &str, session: Session) -> ExitCode {
    if let Err(e) = session.validate() {
        eprintln!("Refusing to submit: {}", e);
        return ExitCode::FAILURE;
    }

    match Submitter::new(server).submit(&session) {
        Ok(reply) if reply.is_ack() => {
            println!("Session queued");
            ExitCode::SUCCESS
        }
        Ok(reply) => {
            eprintln!(
                "Server rejected the session: {}",
                reply.error.unwrap_or_default()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Submission failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn intake(server: &str, action: IntakeAction) -> ExitCode {
    let enable = matches!(action, IntakeAction::Enable);
    match Submitter::new(server).set_intake(enable) {
        Ok(reply) if reply.is_ack() => {
            println!("Intake {}", if enable { "enabled" } else { "disabled" });
            ExitCode::SUCCESS
        }
        Ok(reply) => {
            eprintln!(
                "Server refused the change: {}",
                reply.error.unwrap_or_default()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Could not reach the server: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_night(config_path: &str, date: Option<NaiveDate>) -> ExitCode {
    let config = match Config::from_file(Path::new(config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let night = date.unwrap_or_else(|| Utc::now().date_naive());
    let store = QueueStore::new(config.queue.base_folder.clone(), config.queue.name.clone());
    let records = match store.load_all(night) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Could not read the queue: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if records.is_empty() {
        println!("No sessions queued for {}", night);
        return ExitCode::SUCCESS;
    }
    println!("Executing {} sessions for {}", records.len(), night);

    let channel = ShellChannel::new(config.telescope.ssh.clone());
    let telescope = Telescope::new(channel, config.telescope.keep_open);
    let executor = Executor::new(
        telescope,
        records,
        night.to_string(),
        store.report_file(night),
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Could not start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_attended(executor, config.telescope.ssh)) {
        Ok(report) => {
            let succeeded = report.sessions.iter().filter(|s| s.success).count();
            println!(
                "{}/{} sessions succeeded, report at {}",
                succeeded,
                report.sessions.len(),
                store.report_file(night).display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Night run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs the executor on a blocking task while watching for Ctrl-C. An
/// interrupt asks for confirmation, closes the dome and exits.
async fn run_attended(
    executor: Executor<ShellChannel>,
    ssh: Option<SshConfig>,
) -> Result<NightReport, ExecutorError> {
    let mut night = tokio::task::spawn_blocking(move || executor.run());

    loop {
        tokio::select! {
            joined = &mut night => {
                return joined
                    .unwrap_or_else(|e| Err(ExecutorError::Io(io::Error::other(e.to_string()))));
            }
            _ = tokio::signal::ctrl_c() => {
                let confirmed = tokio::task::spawn_blocking(|| {
                    console::confirm("Interrupt the imaging run and close the dome?")
                })
                .await
                .map(|answer| answer.unwrap_or(false))
                .unwrap_or(false);

                if confirmed {
                    warn!("Run interrupted, closing the dome");
                    let mut channel = ShellChannel::new(ssh.clone());
                    if let Err(e) = channel.run(&Command::CloseDome) {
                        error!("Dome close failed: {}", e);
                        error!("Close the dome manually with `closedown` and `logout`");
                    }
                    std::process::exit(130);
                }
                info!("Resuming imaging run");
            }
        }
    }
}

fn status(config_path: &str) -> ExitCode {
    let config = match Config::from_file(Path::new(config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let channel = ShellChannel::new(config.telescope.ssh);
    let mut telescope = Telescope::new(channel, config.telescope.keep_open);

    match telescope.dome_status() {
        Ok(state) => println!("Dome is {}", state),
        Err(e) => {
            eprintln!("Could not query the dome: {}", e);
            return ExitCode::FAILURE;
        }
    }
    match telescope.current_filter() {
        Ok(name) => println!("Filter is {}", name),
        Err(e) => {
            eprintln!("Could not query the filter: {}", e);
            return ExitCode::FAILURE;
        }
    }
    println!(
        "Weather {} imaging",
        if telescope.weather_ok() { "allows" } else { "does not allow" }
    );
    ExitCode::SUCCESS
}

fn show_queue(config_path: &str, date: Option<NaiveDate>) -> ExitCode {
    let config = match Config::from_file(Path::new(config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let night = date.unwrap_or_else(|| Utc::now().date_naive());
    let store = QueueStore::new(config.queue.base_folder, config.queue.name);
    match store.load_all(night) {
        Ok(records) if records.is_empty() => {
            println!("No sessions queued for {}", night);
            ExitCode::SUCCESS
        }
        Ok(records) => {
            println!("{} sessions queued for {}", records.len(), night);
            for record in records {
                let s = &record.session;
                println!(
                    "  {}: {} [{}] {}x{}s bin{} filters={:?}{}",
                    record.id,
                    s.user,
                    s.targets.join(", "),
                    s.exposure_count,
                    s.exposure_time,
                    s.binning,
                    s.filter_plan(),
                    if s.test_only { " (test only)" } else { "" }
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Could not read the queue: {}", e);
            ExitCode::FAILURE
        }
    }
}
