use std::path::{Path, PathBuf};
use std::time::Duration;

use songproc_frame::{Frame, FrameConfig, FrameReader, FrameWriter, DEFAULT_MAX_PAYLOAD};
use songproc_transport::IpcStream;
use tracing::debug;

use crate::address::BindingAddress;
use crate::config::{socket_path, ServiceConfig, PROTOCOL_SEQUENCE};
use crate::error::{Result, ServiceError};
use crate::protocol::{ControlMessage, Request, Response, CONTROL_PONG};

/// Turns a binding address into something remote calls can be issued through.
pub trait Binder {
    type Binding: RemoteBinding;

    /// Compose the address string for `config`.
    fn compose(&self, config: &ServiceConfig) -> Result<BindingAddress> {
        BindingAddress::compose(
            &config.protocol_sequence,
            config.network_address.as_deref(),
            &config.endpoint,
        )
    }

    /// Build a binding for `address`. This must not require the worker to be up.
    fn bind(&self, address: &BindingAddress) -> Result<Self::Binding>;
}

/// A resolved binding to the worker.
pub trait RemoteBinding {
    /// Succeeds once the worker is accepting calls. Must give up after
    /// roughly `timeout`, whatever state the worker is in.
    fn is_listening(&mut self, timeout: Duration) -> Result<()>;

    /// Deliver `request` and wait for the worker's acknowledgement.
    fn call(&mut self, request: &Request) -> Result<()>;
}

const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(1);

/// Binds `ncalrpc` addresses to the worker's local socket.
#[derive(Debug, Clone)]
pub struct LocalBinder {
    frame_config: FrameConfig,
}

impl Default for LocalBinder {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

impl LocalBinder {
    /// Binder whose calls time out after `config.call_timeout`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            frame_config: FrameConfig {
                max_payload_size: DEFAULT_MAX_PAYLOAD,
                read_timeout: Some(config.call_timeout),
                write_timeout: Some(config.call_timeout),
            },
        }
    }
}

impl Binder for LocalBinder {
    type Binding = LocalBinding;

    fn bind(&self, address: &BindingAddress) -> Result<LocalBinding> {
        if address.protocol_sequence() != PROTOCOL_SEQUENCE {
            return Err(ServiceError::UnsupportedProtocol(
                address.protocol_sequence().to_string(),
            ));
        }
        if let Some(network_address) = address.network_address() {
            return Err(ServiceError::InvalidAddress(format!(
                "local bindings take no network address, got '{network_address}'"
            )));
        }

        let path = socket_path(address.endpoint());
        #[cfg(unix)]
        songproc_transport::UnixDomainSocket::check_path(&path)?;

        debug!(%address, ?path, "binding resolved");
        Ok(LocalBinding {
            path,
            endpoint: address.endpoint().to_string(),
            frame_config: self.frame_config.clone(),
            connection: None,
        })
    }
}

/// Binding over the worker's Unix domain socket.
///
/// The stream is opened on first use and dropped after any failure, so the
/// next probe or call reconnects from scratch.
#[derive(Debug)]
pub struct LocalBinding {
    path: PathBuf,
    endpoint: String,
    frame_config: FrameConfig,
    connection: Option<Connection>,
}

struct Connection {
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("stream", self.writer.get_ref())
            .finish()
    }
}

impl Connection {
    #[cfg(unix)]
    fn open(path: &Path, config: &FrameConfig) -> Result<Self> {
        let stream = songproc_transport::UnixDomainSocket::connect(path)?;
        let reader_stream = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::with_config_ipc(reader_stream, config.clone())?,
            writer: FrameWriter::with_config_ipc(stream, config.clone())?,
        })
    }

    #[cfg(not(unix))]
    fn open(_path: &Path, _config: &FrameConfig) -> Result<Self> {
        Err(songproc_transport::TransportError::Unsupported.into())
    }

    /// The reader and writer share one socket, so setting the timeouts
    /// through the writer covers both.
    fn set_timeouts(&self, read: Option<Duration>, write: Option<Duration>) -> Result<()> {
        let stream = self.writer.get_ref();
        stream.set_read_timeout(read)?;
        stream.set_write_timeout(write)?;
        Ok(())
    }
}

impl LocalBinding {
    /// Socket path this binding resolved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a stream to the worker is currently open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Write `frame` and wait for the reply. `timeout` overrides the call
    /// timeouts for this exchange only.
    ///
    /// A reused stream the worker has since closed fails on write, before
    /// anything is delivered, so that case gets one retry on a fresh stream.
    fn exchange(&mut self, frame: &Frame, timeout: Option<Duration>) -> Result<Frame> {
        let reused = self.connection.is_some();
        if let Err(err) = self.send(frame, timeout) {
            if !reused {
                return Err(err);
            }
            debug!(error = %err, path = ?self.path, "worker stream went stale; reconnecting");
            self.send(frame, timeout)?;
        }
        self.receive()
    }

    fn send(&mut self, frame: &Frame, timeout: Option<Duration>) -> Result<()> {
        let (read, write) = match timeout {
            Some(limit) => (Some(limit), Some(limit)),
            None => (self.frame_config.read_timeout, self.frame_config.write_timeout),
        };
        if self.connection.is_none() {
            self.connection = Some(Connection::open(&self.path, &self.frame_config)?);
        }
        let Some(conn) = self.connection.as_mut() else {
            return Err(ServiceError::NotConnected);
        };

        let result = conn
            .set_timeouts(read, write)
            .and_then(|()| conn.writer.write_frame(frame).map_err(Into::into));
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn receive(&mut self) -> Result<Frame> {
        let Some(conn) = self.connection.as_mut() else {
            return Err(ServiceError::NotConnected);
        };
        let result = conn.reader.read_frame();
        if result.is_err() {
            self.disconnect();
        }
        Ok(result?)
    }

    fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.writer.get_ref().close();
            debug!(path = ?self.path, "worker stream dropped");
        }
    }
}

impl RemoteBinding for LocalBinding {
    fn is_listening(&mut self, timeout: Duration) -> Result<()> {
        // Zero is rejected by the socket layer as a timeout value.
        let limit = timeout.max(MIN_PROBE_TIMEOUT);
        let reply = self.exchange(&ControlMessage::ping().to_frame()?, Some(limit))?;
        match ControlMessage::from_frame(&reply) {
            Ok(pong)
                if pong.msg_type == CONTROL_PONG
                    && pong.service.as_deref() == Some(self.endpoint.as_str()) =>
            {
                Ok(())
            }
            Ok(other) => {
                self.disconnect();
                Err(ServiceError::Decode(format!(
                    "unexpected control reply '{}'",
                    other.msg_type
                )))
            }
            Err(err) => {
                self.disconnect();
                Err(err)
            }
        }
    }

    fn call(&mut self, request: &Request) -> Result<()> {
        let reply = self.exchange(&request.to_frame()?, None)?;
        match Response::from_frame(&reply) {
            Ok(response) => response.into_result(),
            Err(err) => {
                self.disconnect();
                Err(err)
            }
        }
    }
}

impl Drop for LocalBinding {
    fn drop(&mut self) {
        self.disconnect();
    }
}
