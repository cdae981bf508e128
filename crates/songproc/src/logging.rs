use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Env var read by `songproc-worker`, which takes no arguments.
pub const WORKER_LOG_LEVEL_ENV: &str = "SONGPROC_LOG_LEVEL";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Level named by `key`, or `fallback` when unset or unrecognized.
    pub fn from_env(key: &str, fallback: LogLevel) -> LogLevel {
        std::env::var(key)
            .ok()
            .and_then(|value| LogLevel::from_str(value.trim(), true).ok())
            .unwrap_or(fallback)
    }
}

/// Install the stderr subscriber. A second call is ignored.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
