use std::sync::{Arc, Mutex};

/// One-line, human-readable status sink for worker launch events.
pub trait StatusReporter: Send + Sync {
    /// The worker was located and started.
    fn info(&self, message: &str);
    /// The worker is missing or could not be started.
    fn warning(&self, message: &str);
}

/// Forwards status lines to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

/// Severity of a captured status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Warning,
}

/// Keeps every status line in memory, for callers that render them later.
#[derive(Debug, Default, Clone)]
pub struct StatusLog {
    entries: Arc<Mutex<Vec<(StatusKind, String)>>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines captured so far.
    pub fn entries(&self) -> Vec<(StatusKind, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn push(&self, kind: StatusKind, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((kind, message.to_string()));
        }
    }
}

impl StatusReporter for StatusLog {
    fn info(&self, message: &str) {
        self.push(StatusKind::Info, message);
    }

    fn warning(&self, message: &str) {
        self.push(StatusKind::Warning, message);
    }
}
