//! Out-of-process song playback.
//!
//! The supervisor side starts a worker executable with [`ProcessLauncher`],
//! binds to it and drives playback through [`ServiceClient`]. Every client
//! operation answers with a plain `bool`; faults are logged, never raised.
//! The worker side accepts that connection with [`ServiceHost`] and applies
//! requests to a [`SongEngine`].

pub mod address;
pub mod binding;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod launcher;
pub mod protocol;
pub mod session;
pub mod status;

pub use address::BindingAddress;
pub use binding::{Binder, LocalBinder, LocalBinding, RemoteBinding};
pub use client::{ClientState, ServiceClient};
pub use config::{
    runtime_dir, socket_path, ServiceConfig, PROTOCOL_SEQUENCE, READY_MAX_ATTEMPTS,
    READY_POLL_INTERVAL, RUNTIME_DIR_ENV, SERVICE_ID, SESSION_IDLE_TIMEOUT,
};
pub use error::{Result, ServiceError};
pub use host::{EngineResult, ServiceHost, SongEngine};
pub use launcher::{ProcessLauncher, STOP_GRACE, WORKER_FILE_NAME};
pub use protocol::{ControlMessage, Request, Response, CONTROL_PING, CONTROL_PONG};
pub use session::{SongSession, DEFAULT_VOLUME};
pub use status::{StatusKind, StatusLog, StatusReporter, TracingReporter};
