//! Wire framing for the core/display link.
//!
//! Every message travels as
//! - a start marker byte (`0xA5`) the decoder hunts for after corruption
//! - a one-byte message kind
//! - a two-byte little-endian payload length
//! - the payload
//! - a one-byte additive checksum over kind, length and payload
//!
//! Readers only ever hand out frames that passed every check; anything else
//! is dropped and counted in [`FrameStats`].

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    checksum, decode_frame, encode_frame, Frame, FrameConfig, FRAME_START, HEADER_SIZE,
    MAX_PAYLOAD, TRAILER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::{FrameReader, FrameStats};
pub use writer::FrameWriter;
