//! Length-prefixed framing for the songproc worker protocol.
//!
//! Every message on the worker connection is one frame:
//! - 2-byte magic `"SP"` for stream synchronization
//! - 4-byte little-endian payload length
//! - 2-byte little-endian opcode naming the message
//!
//! Opcode meanings are defined by the service layer; this crate only moves
//! complete frames across a byte stream.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
