/// Errors raised while binding to or calling the worker.
///
/// None of these escape [`ServiceClient`](crate::ServiceClient)'s public
/// operations; they are logged and collapsed to `false` there.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] songproc_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] songproc_frame::FrameError),

    /// A binding address could not be composed or parsed.
    #[error("invalid binding address: {0}")]
    InvalidAddress(String),

    /// The binding names a protocol sequence this client cannot serve.
    #[error("unsupported protocol sequence '{0}'")]
    UnsupportedProtocol(String),

    /// The worker received the call and reported a failure.
    #[error("worker fault: {0}")]
    Remote(String),

    /// The worker answered with something other than the expected reply.
    #[error("unexpected response opcode {0:#04x}")]
    UnexpectedResponse(u16),

    /// A message body did not match its opcode's layout.
    #[error("malformed message: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error on the control opcode.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The launch/bind guard rejected the call before anything was sent.
    #[error("worker not started or not bound")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
