//! Worker side of the connection: accept the supervisor and run its requests
//! against a [`SongEngine`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use songproc_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use songproc_transport::IpcStream;
#[cfg(unix)]
use songproc_transport::UnixDomainSocket;
use tracing::{debug, info, warn};

use crate::config::{socket_path, ServiceConfig};
use crate::error::Result;
use crate::protocol::{ControlMessage, Request, Response, CONTROL_PING, OP_CONTROL};

/// Outcome of one engine operation; the message becomes the fault text.
pub type EngineResult = std::result::Result<(), String>;

/// Playback backend driven by the worker. Errors are reported back to the
/// supervisor as faults.
pub trait SongEngine {
    fn prepare_new_song(&mut self) -> EngineResult;
    fn add_chunk(&mut self, data: &[u8]) -> EngineResult;
    fn play_song(&mut self, looping: bool) -> EngineResult;
    fn stop_song(&mut self) -> EngineResult;
    fn change_volume(&mut self, level: i32) -> EngineResult;
    fn pause_song(&mut self) -> EngineResult;
    fn resume_song(&mut self) -> EngineResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Idle,
    StopRequested,
}

/// Listening endpoint of the worker process.
pub struct ServiceHost {
    #[cfg(unix)]
    socket: UnixDomainSocket,
    endpoint: String,
    frame_config: FrameConfig,
}

impl ServiceHost {
    /// Listen on the socket derived from `config.endpoint`.
    #[cfg(unix)]
    pub fn bind(config: &ServiceConfig) -> Result<Self> {
        let socket = UnixDomainSocket::bind(socket_path(&config.endpoint))?;
        Ok(Self {
            socket,
            endpoint: config.endpoint.clone(),
            frame_config: FrameConfig {
                read_timeout: Some(config.session_idle_timeout),
                write_timeout: Some(config.call_timeout),
                ..FrameConfig::default()
            },
        })
    }

    #[cfg(not(unix))]
    pub fn bind(config: &ServiceConfig) -> Result<Self> {
        let _ = socket_path(&config.endpoint);
        Err(songproc_transport::TransportError::Unsupported.into())
    }

    #[cfg(unix)]
    pub fn path(&self) -> &Path {
        self.socket.path()
    }

    #[cfg(not(unix))]
    pub fn path(&self) -> &Path {
        Path::new("")
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Serve supervisors one at a time until one of them sends StopServer.
    pub fn serve<E: SongEngine>(&self, engine: &mut E) -> Result<()> {
        self.serve_until(engine, &AtomicBool::new(false))
    }

    /// Like [`serve`](Self::serve), but also returns once `stop` is set and
    /// the current accept or session finishes.
    pub fn serve_until<E: SongEngine>(&self, engine: &mut E, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::SeqCst) {
            let stream = self.accept()?;
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match self.serve_session(stream, engine) {
                Ok(SessionEnd::StopRequested) => {
                    info!("stop requested by supervisor");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => debug!("supervisor disconnected"),
                Ok(SessionEnd::Idle) => info!("supervisor idle; connection dropped"),
                Err(err) => warn!(error = %err, "session aborted"),
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn accept(&self) -> Result<IpcStream> {
        Ok(self.socket.accept()?)
    }

    #[cfg(not(unix))]
    fn accept(&self) -> Result<IpcStream> {
        Err(songproc_transport::TransportError::Unsupported.into())
    }

    fn serve_session<E: SongEngine>(&self, stream: IpcStream, engine: &mut E) -> Result<SessionEnd> {
        debug!(peer_pid = ?stream.peer_pid(), "supervisor connected");
        let mut reader =
            FrameReader::with_config_ipc(stream.try_clone()?, self.frame_config.clone())?;
        let mut writer = FrameWriter::with_config_ipc(stream, self.frame_config.clone())?;

        loop {
            let frame = match reader.read_frame() {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => return Ok(SessionEnd::Disconnected),
                Err(FrameError::Io(err)) if is_timeout(&err) => {
                    writer.get_ref().close();
                    return Ok(SessionEnd::Idle);
                }
                Err(err) => return Err(err.into()),
            };

            if frame.opcode == OP_CONTROL {
                let reply = match ControlMessage::from_frame(&frame) {
                    Ok(msg) if msg.msg_type == CONTROL_PING => {
                        ControlMessage::pong(&self.endpoint).to_frame()?
                    }
                    Ok(msg) => {
                        Response::Fault(format!("unknown control message '{}'", msg.msg_type))
                            .to_frame()
                    }
                    Err(err) => Response::Fault(err.to_string()).to_frame(),
                };
                writer.write_frame(&reply)?;
                continue;
            }

            let (response, end) = match Request::from_frame(&frame) {
                Ok(Request::StopServer) => (Response::Ack, true),
                Ok(request) => (dispatch(engine, request), false),
                Err(err) => (Response::Fault(err.to_string()), false),
            };
            writer.write_frame(&response.to_frame())?;
            if end {
                return Ok(SessionEnd::StopRequested);
            }
        }
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn dispatch<E: SongEngine>(engine: &mut E, request: Request) -> Response {
    let name = request.name();
    let outcome = match request {
        Request::PrepareNewSong => engine.prepare_new_song(),
        Request::AddChunk(data) => engine.add_chunk(data.as_ref()),
        Request::PlaySong { looping } => engine.play_song(looping),
        Request::StopSong => engine.stop_song(),
        Request::ChangeVolume(level) => engine.change_volume(level),
        Request::PauseSong => engine.pause_song(),
        Request::ResumeSong => engine.resume_song(),
        Request::StopServer => Ok(()),
    };
    match outcome {
        Ok(()) => Response::Ack,
        Err(message) => {
            debug!(operation = name, %message, "engine rejected request");
            Response::Fault(message)
        }
    }
}

impl std::fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost")
            .field("path", &self.path())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
