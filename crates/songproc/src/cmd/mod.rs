use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use songproc_service::{ProcessLauncher, StatusKind, StatusLog};

use songproc::exit::CliResult;

use crate::output::OutputFormat;

pub mod doctor;
pub mod play;
pub mod probe;
pub mod version;

/// Env var naming the folder that holds `songproc-worker`.
pub const WORKER_DIR_ENV: &str = "SONGPROC_WORKER_DIR";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a song file through the worker.
    Play(PlayArgs),
    /// Start the worker, connect, and report the connection state.
    Probe(ProbeArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Play(args) => play::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct WorkerArgs {
    /// Folder containing the worker executable. Default: this program's folder.
    #[arg(long, value_name = "DIR", env = WORKER_DIR_ENV)]
    pub worker_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Song file to send to the worker.
    pub file: PathBuf,
    /// Loop the song until stopped.
    #[arg(long = "loop")]
    pub looping: bool,
    /// Volume level applied before playback starts.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(i32).range(0..=127))]
    pub volume: i32,
    /// How long to play before stopping (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub duration: Duration,
    #[command(flatten)]
    pub worker: WorkerArgs,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub worker: WorkerArgs,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub worker: WorkerArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Folder the worker is expected in.
pub fn worker_dir(args: &WorkerArgs) -> Option<PathBuf> {
    args.worker_dir.clone().or_else(|| {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
    })
}

/// Start the worker and forward the launcher's status lines to the log.
pub fn start_worker(args: &WorkerArgs) -> (ProcessLauncher, Vec<String>) {
    let log = StatusLog::new();
    let mut launcher = ProcessLauncher::with_reporter(log.clone());
    match worker_dir(args) {
        Some(dir) => {
            launcher.start(dir);
        }
        None => {
            launcher.start_beside_current_exe();
        }
    }

    let lines = log
        .entries()
        .into_iter()
        .map(|(kind, line)| {
            match kind {
                StatusKind::Info => tracing::info!("{line}"),
                StatusKind::Warning => tracing::warn!("{line}"),
            }
            line
        })
        .collect();
    (launcher, lines)
}

fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
