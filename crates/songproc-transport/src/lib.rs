//! Local stream transport for the songproc worker connection.
//!
//! The worker and its supervisor talk over a single machine-local stream.
//! On Unix that stream is a filesystem Unix domain socket; everything above
//! this crate only sees [`IpcStream`].

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
