//! Owned outbound frames
//!
//! A [`Message`] is built once by its producer (an application thread or the
//! heartbeat generator) and then moved: into the report queue, out to the
//! connector's send slot, and dropped after the last byte is written. It is
//! deliberately not `Clone`, so a frame has exactly one owner at a time.

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::Header;
use crate::protocol_constants::{REPORT_MESSAGE, SIMPLE_HEARTBEAT_MESSAGE};
use bytes::{BufMut, Bytes, BytesMut};

/// Encoded frame (header followed by payload) ready to be written to a socket
#[derive(Debug, PartialEq, Eq)]
pub struct Message {
    header: Header,
    frame: Bytes,
}

impl Message {
    /// Build a frame for `command` carrying `payload`
    pub fn new(command: u32, payload: &[u8]) -> ProtocolResult<Self> {
        let size = u32::try_from(payload.len())
            .map_err(|_| ProtocolError::frame_too_large(payload.len(), u32::MAX as usize, command))?;
        let header = Header::new(command, size);

        let mut frame = BytesMut::with_capacity(header.frame_len());
        frame.put_slice(&header.to_bytes());
        frame.put_slice(payload);

        Ok(Self {
            header,
            frame: frame.freeze(),
        })
    }

    /// Application report frame
    pub fn report(payload: &[u8]) -> ProtocolResult<Self> {
        Self::new(REPORT_MESSAGE, payload)
    }

    /// Heartbeat frame, optionally carrying application data
    pub fn heartbeat(app_data: &[u8]) -> ProtocolResult<Self> {
        Self::new(SIMPLE_HEARTBEAT_MESSAGE, app_data)
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn command(&self) -> u32 {
        self.header.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.frame[Header::SIZE..]
    }

    /// Full frame bytes as they go on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame
    }

    /// Frame length including the header
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    /// True when the frame carries no payload
    pub fn is_empty(&self) -> bool {
        self.header.size == 0
    }
}
