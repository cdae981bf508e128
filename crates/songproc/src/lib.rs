//! Supervised out-of-process song playback.
//!
//! songproc starts a worker executable, binds to it over a local socket, and
//! forwards a small playback command set to it. A crashed or missing worker
//! degrades every command to a `false` result instead of an error.
//!
//! # Crate Structure
//!
//! - [`transport`]: local stream transport (Unix domain sockets)
//! - [`frame`]: length-prefixed message framing
//! - [`service`]: launcher, guarded client, and the worker-side host

/// Re-export transport types.
pub mod transport {
    pub use songproc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use songproc_frame::*;
}

/// Re-export service types.
pub mod service {
    pub use songproc_service::*;
}

pub use songproc_service::{
    ProcessLauncher, ServiceClient, ServiceConfig, ServiceHost, SongEngine, SongSession,
    StatusReporter,
};

#[cfg(feature = "cli")]
#[doc(hidden)]
pub mod exit;

#[cfg(feature = "cli")]
#[doc(hidden)]
pub mod logging;
