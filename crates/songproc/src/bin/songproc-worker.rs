//! Reference worker: serves the supervisor's playback requests with an
//! in-memory [`SongSession`] until told to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use songproc::exit::{service_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS};
use songproc::logging::{init_logging, LogFormat, LogLevel, WORKER_LOG_LEVEL_ENV};
use songproc_service::{ServiceConfig, ServiceHost, SongSession};

fn main() {
    init_logging(
        LogFormat::Text,
        LogLevel::from_env(WORKER_LOG_LEVEL_ENV, LogLevel::Info),
    );

    match run() {
        Ok(()) => std::process::exit(SUCCESS),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

fn run() -> CliResult<()> {
    let config = ServiceConfig::default();
    let host = ServiceHost::bind(&config).map_err(|err| service_error("bind failed", err))?;
    tracing::info!(path = ?host.path(), pid = std::process::id(), "worker listening");

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(&host, Arc::clone(&stop))?;

    let mut session = SongSession::new();
    host.serve_until(&mut session, &stop)
        .map_err(|err| service_error("serve failed", err))?;

    tracing::info!("worker stopped");
    Ok(())
}

/// First Ctrl-C asks the serve loop to stop after the current session; a
/// second one exits immediately.
fn install_ctrlc_handler(host: &ServiceHost, stop: Arc<AtomicBool>) -> CliResult<()> {
    let path = host.path().to_path_buf();
    ctrlc::set_handler(move || {
        if stop.swap(true, Ordering::SeqCst) {
            let _ = std::fs::remove_file(&path);
            std::process::exit(INTERRUPTED);
        }
        // Wake a pending accept so the loop sees the flag.
        #[cfg(unix)]
        let _ = songproc_transport::UnixDomainSocket::connect(&path);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
