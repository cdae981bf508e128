use std::path::PathBuf;
use std::time::Duration;

use songproc_frame::DEFAULT_MAX_PAYLOAD;

/// Protocol sequence for machine-local connections.
pub const PROTOCOL_SEQUENCE: &str = "ncalrpc";

/// Well-known endpoint the worker listens on.
///
/// Part of the wire contract: a worker built against a different identifier
/// will never be found.
pub const SERVICE_ID: &str = "2d4dc2f9-ce90-4080-8a00-1cb819086970";

/// Interval between readiness probes.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Readiness probes attempted before giving up (10 ms × 50 ≈ 500 ms).
pub const READY_MAX_ATTEMPTS: u32 = 50;

/// How long the worker waits on a silent supervisor before dropping it.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Overrides the directory holding the worker socket.
pub const RUNTIME_DIR_ENV: &str = "SONGPROC_RUNTIME_DIR";

/// Connection settings shared by the client and the worker.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Protocol sequence placed in the binding address.
    pub protocol_sequence: String,
    /// Network address placed in the binding address. Local bindings leave it empty.
    pub network_address: Option<String>,
    /// Endpoint (service identifier) placed in the binding address.
    pub endpoint: String,
    /// Delay between readiness probes.
    pub ready_poll_interval: Duration,
    /// Readiness probes before the connect attempt is abandoned.
    pub ready_max_attempts: u32,
    /// Read/write timeout applied to each remote call on the stream.
    pub call_timeout: Duration,
    /// Largest song accepted by `register_song` in one chunk.
    pub max_chunk_size: usize,
    /// Worker side: a supervisor silent for this long is disconnected so the
    /// next one can be accepted.
    pub session_idle_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            protocol_sequence: PROTOCOL_SEQUENCE.to_string(),
            network_address: None,
            endpoint: SERVICE_ID.to_string(),
            ready_poll_interval: READY_POLL_INTERVAL,
            ready_max_attempts: READY_MAX_ATTEMPTS,
            call_timeout: Duration::from_secs(5),
            max_chunk_size: DEFAULT_MAX_PAYLOAD - CHUNK_HEADER_SIZE,
            session_idle_timeout: SESSION_IDLE_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    /// Upper bound on the readiness wait: one poll interval per probe, plus
    /// one so the last probe still gets a slice of time.
    pub fn ready_window(&self) -> Duration {
        self.ready_poll_interval
            .saturating_mul(self.ready_max_attempts.max(1).saturating_add(1))
    }
}

/// Bytes of the size prefix carried in an `AddChunk` body.
pub(crate) const CHUNK_HEADER_SIZE: usize = 4;

/// Directory that holds the worker socket.
///
/// `SONGPROC_RUNTIME_DIR`, then `XDG_RUNTIME_DIR`, then the system temp dir.
pub fn runtime_dir() -> PathBuf {
    [RUNTIME_DIR_ENV, "XDG_RUNTIME_DIR"]
        .iter()
        .filter_map(|key| std::env::var_os(key))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Socket path the worker for `endpoint` listens on.
pub fn socket_path(endpoint: &str) -> PathBuf {
    runtime_dir().join(format!("songproc-{endpoint}.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_contract() {
        let config = ServiceConfig::default();
        assert_eq!(config.protocol_sequence, "ncalrpc");
        assert_eq!(config.endpoint, SERVICE_ID);
        assert!(config.network_address.is_none());
        assert_eq!(config.ready_poll_interval, Duration::from_millis(10));
        assert_eq!(config.ready_max_attempts, 50);
        assert_eq!(config.ready_window(), Duration::from_millis(510));
    }

    #[test]
    fn socket_file_name_embeds_endpoint() {
        let path = socket_path("abc-123");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("songproc-abc-123.sock")
        );
    }
}
