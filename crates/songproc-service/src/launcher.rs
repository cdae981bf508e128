use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::status::{StatusReporter, TracingReporter};

/// File name of the worker executable, without the platform suffix.
pub const WORKER_FILE_NAME: &str = "songproc-worker";

/// How long a released worker gets to exit on its own before it is killed.
pub const STOP_GRACE: Duration = Duration::from_millis(500);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Starts the worker process and remembers whether that succeeded.
pub struct ProcessLauncher {
    reporter: Arc<dyn StatusReporter>,
    child: Option<Child>,
    started: bool,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher {
    /// Launcher that reports status through `tracing`.
    pub fn new() -> Self {
        Self::with_reporter(TracingReporter)
    }

    pub fn with_reporter(reporter: impl StatusReporter + 'static) -> Self {
        Self {
            reporter: Arc::new(reporter),
            child: None,
            started: false,
        }
    }

    /// Full path of the worker executable inside `folder`.
    pub fn worker_path(folder: impl AsRef<Path>) -> PathBuf {
        folder.as_ref().join(format!(
            "{WORKER_FILE_NAME}{}",
            std::env::consts::EXE_SUFFIX
        ))
    }

    /// Launch the worker found in `folder`.
    ///
    /// Returns `false` after reporting a warning when the executable is missing
    /// or the OS refuses to create the process. Exactly one spawn is attempted.
    /// Calling this while a worker is already running is a no-op returning `true`.
    pub fn start(&mut self, folder: impl AsRef<Path>) -> bool {
        if self.started {
            debug!("worker already started");
            return true;
        }

        let path = Self::worker_path(folder);
        if !is_executable_file(&path) {
            self.reporter.warning(&format!(
                "The worker {} couldn't be found.",
                path.display()
            ));
            return false;
        }

        let spawned = Command::new(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                debug!(pid = child.id(), ?path, "worker process created");
                self.child = Some(child);
                self.started = true;
                self.reporter.info(&format!(
                    "Using the worker {} to play songs.",
                    path.display()
                ));
                true
            }
            Err(err) => {
                self.reporter.warning(&format!(
                    "The worker {} couldn't be started: {err}",
                    path.display()
                ));
                false
            }
        }
    }

    /// Launch the worker that sits next to the running executable.
    pub fn start_beside_current_exe(&mut self) -> bool {
        match std::env::current_exe() {
            Ok(exe) => {
                let folder = exe.parent().map(Path::to_path_buf).unwrap_or_default();
                self.start(folder)
            }
            Err(err) => {
                self.reporter
                    .warning(&format!("The worker couldn't be located: {err}"));
                false
            }
        }
    }

    /// Whether the last [`start`](Self::start) created the worker process.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Process id of the launched worker.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Forget the launched worker. A process still running after
    /// [`STOP_GRACE`] is killed, and the child is always reaped before this
    /// returns.
    pub(crate) fn release(&mut self) {
        self.started = false;
        let Some(mut child) = self.child.take() else {
            return;
        };

        let deadline = Instant::now() + STOP_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "worker exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL_INTERVAL),
                Ok(None) => break,
                Err(err) => {
                    debug!(error = %err, "worker status unavailable");
                    break;
                }
            }
        }

        if let Err(err) = child.kill() {
            debug!(error = %err, "worker kill failed");
        }
        match child.wait() {
            Ok(status) => debug!(%status, "worker killed"),
            Err(err) => debug!(error = %err, "worker wait failed"),
        }
    }
}

impl std::fmt::Debug for ProcessLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLauncher")
            .field("started", &self.started)
            .field("pid", &self.pid())
            .finish()
    }
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
