//! # Center Agent Codec
//!
//! ## Purpose
//!
//! Wire framing shared by the agent and any center implementation. Every frame
//! on a center connection, in either direction, is a fixed 8-byte header
//! followed by `size` payload bytes:
//!
//! ```text
//! ┌────────────────┬───────────────────┬──────────────────────┐
//! │ size (u32, BE) │ command (u32, BE) │ payload (size bytes) │
//! └────────────────┴───────────────────┴──────────────────────┘
//! ```
//!
//! ## What This Crate Contains
//! - [`Header`]: the decoded frame header and its network-endian encoding
//! - [`Message`]: an owned, immutable outbound frame (header + payload)
//! - [`decode_frame`]: incremental-friendly decoding of one frame from a buffer
//! - Reserved command codes and protocol limits
//!
//! ## What This Crate Does NOT Contain
//! - Socket handling or resumable I/O (belongs in the agent crate)
//! - Command dispatch

pub mod error;
pub mod header;
pub mod message;
pub mod parser;
pub mod protocol_constants;

pub use error::{ProtocolError, ProtocolResult};
pub use header::Header;
pub use message::Message;
pub use parser::{decode_frame, DecodedFrame};
pub use protocol_constants::*;
