//! # Frame Parser
//!
//! Decodes one complete frame from the front of a byte buffer. The agent's
//! receive path uses its own resumable state machine so that large bodies can
//! be dispatched incrementally; this function is the whole-frame counterpart
//! used by centers, tests and tools that already hold buffered bytes.

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::Header;

/// A frame borrowed from the input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub header: Header,
    pub payload: &'a [u8],
    /// Bytes consumed from the input, always `Header::SIZE + payload.len()`
    pub consumed: usize,
}

/// Decode the first frame in `buf`
///
/// Returns `Ok(None)` while the buffer holds less than one full frame. Bytes
/// after the frame are left for the next call. A declared payload above
/// `max_payload` is rejected before waiting for the body.
pub fn decode_frame(buf: &[u8], max_payload: usize) -> ProtocolResult<Option<DecodedFrame<'_>>> {
    if buf.len() < Header::SIZE {
        return Ok(None);
    }

    let header = Header::parse(buf)?;
    let size = header.size as usize;
    if size > max_payload {
        return Err(ProtocolError::frame_too_large(size, max_payload, header.command));
    }

    let end = header.frame_len();
    if buf.len() < end {
        return Ok(None);
    }

    Ok(Some(DecodedFrame {
        header,
        payload: &buf[Header::SIZE..end],
        consumed: end,
    }))
}
