//! Frame Header Implementation
//!
//! The header is identical for every frame in both directions. It carries the
//! payload length and the command code used for dispatch.

use crate::error::{ProtocolError, ProtocolResult};
use std::mem::size_of;
use zerocopy::byteorder::network_endian::U32;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// On-the-wire layout (8 bytes, network byte order, no padding)
#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
struct WireHeader {
    size: U32,    // payload bytes, excluding the header (bytes 0-3)
    command: U32, // command code (bytes 4-7)
}

/// Decoded frame header
///
/// `size` is the payload length and never includes the header itself, so a
/// complete frame occupies exactly [`Header::frame_len`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Header {
    pub size: u32,
    pub command: u32,
}

impl Header {
    /// Header size in bytes
    pub const SIZE: usize = size_of::<WireHeader>();

    pub fn new(command: u32, size: u32) -> Self {
        Self { size, command }
    }

    /// Parse a header from the start of `data`
    ///
    /// Trailing bytes are ignored; a buffer shorter than [`Header::SIZE`] is a
    /// protocol error.
    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        let wire = WireHeader::read_from_prefix(data).ok_or_else(|| {
            ProtocolError::message_too_small(Self::SIZE, data.len(), "frame header")
        })?;

        Ok(Self {
            size: wire.size.get(),
            command: wire.command.get(),
        })
    }

    /// Encode to network byte order
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let wire = WireHeader {
            size: U32::new(self.size),
            command: U32::new(self.command),
        };

        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(wire.as_bytes());
        out
    }

    /// Total frame length, header included
    pub fn frame_len(&self) -> usize {
        Self::SIZE + self.size as usize
    }
}
