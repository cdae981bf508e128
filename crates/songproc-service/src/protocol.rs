//! Messages exchanged with the worker, one frame per message.
//!
//! Every request frame is answered by exactly one [`Response`] frame.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use songproc_frame::Frame;

use crate::config::CHUNK_HEADER_SIZE;
use crate::error::{Result, ServiceError};

/// JSON control messages (readiness probe).
pub const OP_CONTROL: u16 = 0x00;
pub const OP_PREPARE_NEW_SONG: u16 = 0x01;
pub const OP_ADD_CHUNK: u16 = 0x02;
pub const OP_PLAY_SONG: u16 = 0x03;
pub const OP_STOP_SONG: u16 = 0x04;
pub const OP_CHANGE_VOLUME: u16 = 0x05;
pub const OP_PAUSE_SONG: u16 = 0x06;
pub const OP_RESUME_SONG: u16 = 0x07;
pub const OP_STOP_SERVER: u16 = 0x08;
pub const OP_ACK: u16 = 0x80;
pub const OP_FAULT: u16 = 0x81;

/// A remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    PrepareNewSong,
    /// One chunk of song data. On the wire: u32 LE size, then the bytes.
    AddChunk(Bytes),
    PlaySong { looping: bool },
    StopSong,
    ChangeVolume(i32),
    PauseSong,
    ResumeSong,
    StopServer,
}

impl Request {
    pub fn opcode(&self) -> u16 {
        match self {
            Request::PrepareNewSong => OP_PREPARE_NEW_SONG,
            Request::AddChunk(_) => OP_ADD_CHUNK,
            Request::PlaySong { .. } => OP_PLAY_SONG,
            Request::StopSong => OP_STOP_SONG,
            Request::ChangeVolume(_) => OP_CHANGE_VOLUME,
            Request::PauseSong => OP_PAUSE_SONG,
            Request::ResumeSong => OP_RESUME_SONG,
            Request::StopServer => OP_STOP_SERVER,
        }
    }

    /// Operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::PrepareNewSong => "PrepareNewSong",
            Request::AddChunk(_) => "AddChunk",
            Request::PlaySong { .. } => "PlaySong",
            Request::StopSong => "StopSong",
            Request::ChangeVolume(_) => "ChangeVolume",
            Request::PauseSong => "PauseSong",
            Request::ResumeSong => "ResumeSong",
            Request::StopServer => "StopServer",
        }
    }

    pub fn to_frame(&self) -> Result<Frame> {
        let payload = match self {
            Request::AddChunk(data) => {
                let size = u32::try_from(data.len()).map_err(|_| {
                    ServiceError::Decode(format!("chunk of {} bytes exceeds u32", data.len()))
                })?;
                let mut body = BytesMut::with_capacity(CHUNK_HEADER_SIZE + data.len());
                body.put_u32_le(size);
                body.put_slice(data);
                body.freeze()
            }
            Request::PlaySong { looping } => Bytes::copy_from_slice(&[u8::from(*looping)]),
            Request::ChangeVolume(level) => Bytes::copy_from_slice(&level.to_le_bytes()),
            _ => Bytes::new(),
        };
        Ok(Frame::new(self.opcode(), payload))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let body = frame.payload.as_ref();
        let request = match frame.opcode {
            OP_PREPARE_NEW_SONG => expect_empty(body, Request::PrepareNewSong)?,
            OP_ADD_CHUNK => {
                let (size, data) = body
                    .split_first_chunk::<CHUNK_HEADER_SIZE>()
                    .ok_or_else(|| ServiceError::Decode("AddChunk missing size".to_string()))?;
                let size = u32::from_le_bytes(*size) as usize;
                if size != data.len() {
                    return Err(ServiceError::Decode(format!(
                        "AddChunk size {size} does not match {} data bytes",
                        data.len()
                    )));
                }
                Request::AddChunk(frame.payload.slice(CHUNK_HEADER_SIZE..))
            }
            OP_PLAY_SONG => match body {
                [0] => Request::PlaySong { looping: false },
                [1] => Request::PlaySong { looping: true },
                _ => return Err(ServiceError::Decode("PlaySong flag must be 0 or 1".to_string())),
            },
            OP_STOP_SONG => expect_empty(body, Request::StopSong)?,
            OP_CHANGE_VOLUME => {
                let level: [u8; 4] = body.try_into().map_err(|_| {
                    ServiceError::Decode("ChangeVolume expects a 4-byte level".to_string())
                })?;
                Request::ChangeVolume(i32::from_le_bytes(level))
            }
            OP_PAUSE_SONG => expect_empty(body, Request::PauseSong)?,
            OP_RESUME_SONG => expect_empty(body, Request::ResumeSong)?,
            OP_STOP_SERVER => expect_empty(body, Request::StopServer)?,
            other => return Err(ServiceError::Decode(format!("unknown opcode {other:#04x}"))),
        };
        Ok(request)
    }
}

fn expect_empty(body: &[u8], request: Request) -> Result<Request> {
    if body.is_empty() {
        Ok(request)
    } else {
        Err(ServiceError::Decode(format!(
            "{} carries no payload, got {} bytes",
            request.name(),
            body.len()
        )))
    }
}

/// The worker's answer to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack,
    Fault(String),
}

impl Response {
    pub fn to_frame(&self) -> Frame {
        match self {
            Response::Ack => Frame::empty(OP_ACK),
            Response::Fault(message) => Frame::new(OP_FAULT, message.clone().into_bytes()),
        }
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        match frame.opcode {
            OP_ACK => Ok(Response::Ack),
            OP_FAULT => Ok(Response::Fault(
                String::from_utf8_lossy(frame.payload.as_ref()).into_owned(),
            )),
            other => Err(ServiceError::UnexpectedResponse(other)),
        }
    }

    /// `Ack` becomes `Ok(())`, `Fault` becomes [`ServiceError::Remote`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Response::Ack => Ok(()),
            Response::Fault(message) => Err(ServiceError::Remote(message)),
        }
    }
}

/// Control message type: readiness probe.
pub const CONTROL_PING: &str = "ping";
/// Control message type: readiness reply.
pub const CONTROL_PONG: &str = "pong";

/// Body of an [`OP_CONTROL`] frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl ControlMessage {
    pub fn ping() -> Self {
        Self {
            msg_type: CONTROL_PING.to_string(),
            service: None,
        }
    }

    /// Reply naming the endpoint the worker serves.
    pub fn pong(service: &str) -> Self {
        Self {
            msg_type: CONTROL_PONG.to_string(),
            service: Some(service.to_string()),
        }
    }

    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame::new(OP_CONTROL, serde_json::to_vec(self)?))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.opcode != OP_CONTROL {
            return Err(ServiceError::UnexpectedResponse(frame.opcode));
        }
        Ok(serde_json::from_slice(frame.payload.as_ref())?)
    }
}
