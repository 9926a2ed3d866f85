//! Wire codec shared by clients, servers and the on-disk log
//!
//! Every unit on a socket or in a decompressed log file is a frame:
//! `[varint payload length][payload]`. A zero-length frame (a single `0x00`
//! byte) marks the end of a bounded transmission, such as a replay reply or
//! one subscription burst.

mod errors;
mod frame;
mod reader;
pub mod varint;

pub use errors::{CodecError, CodecResult};
pub use frame::{decode, encode, encode_into, scan, write_eot, Scan, DEFAULT_MAX_FRAME_LEN, EOT};
pub use reader::{BlockingFrameReader, Frame, FrameReader};
