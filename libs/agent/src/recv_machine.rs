//! Resumable frame receiver
//!
//! Bytes arrive in arbitrary chunks. The receiver first accumulates the fixed
//! header, then streams the body straight to the processor table without
//! buffering it. Unknown commands are skipped byte for byte so the stream
//! stays aligned on the next frame.

use crate::error::{AgentError, Result};
use crate::processor::{Dispatch, ProcessorManager};
use codec::Header;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvState {
    /// Collecting header bytes
    Header { filled: usize },
    /// Streaming the body of `header`
    Body {
        header: Header,
        finished: u32,
        skip: bool,
    },
}

/// Per-connection receive state
#[derive(Debug)]
pub struct RecvMachine {
    state: RecvState,
    header_buf: [u8; Header::SIZE],
    max_frame_size: usize,
}

impl RecvMachine {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            state: RecvState::Header { filled: 0 },
            header_buf: [0u8; Header::SIZE],
            max_frame_size,
        }
    }

    /// Forget any partial frame
    pub fn reset(&mut self) {
        self.state = RecvState::Header { filled: 0 };
    }

    /// True between frames
    pub fn is_idle(&self) -> bool {
        self.state == RecvState::Header { filled: 0 }
    }

    /// Consume one chunk, dispatching every header and body slice it contains
    ///
    /// An error leaves the machine reset; the caller is expected to close the
    /// connection.
    pub fn feed(&mut self, mut data: &[u8], processors: &ProcessorManager) -> Result<()> {
        while !data.is_empty() {
            match self.state {
                RecvState::Header { filled } => {
                    let take = (Header::SIZE - filled).min(data.len());
                    self.header_buf[filled..filled + take].copy_from_slice(&data[..take]);
                    data = &data[take..];

                    if filled + take < Header::SIZE {
                        self.state = RecvState::Header { filled: filled + take };
                        continue;
                    }

                    let header = match Header::parse(&self.header_buf) {
                        Ok(header) => header,
                        Err(e) => {
                            self.reset();
                            return Err(e.into());
                        }
                    };
                    self.begin_frame(header, processors)?;
                }
                RecvState::Body {
                    header,
                    finished,
                    skip,
                } => {
                    let remaining = (header.size - finished) as usize;
                    let take = remaining.min(data.len());
                    let (chunk, rest) = data.split_at(take);
                    data = rest;

                    if !skip && !processors.on_message(&header, finished, chunk) {
                        self.reset();
                        return Err(AgentError::protocol(format!(
                            "Processor rejected body of command {}",
                            header.command
                        )));
                    }

                    let finished = finished + take as u32;
                    self.state = if finished == header.size {
                        RecvState::Header { filled: 0 }
                    } else {
                        RecvState::Body {
                            header,
                            finished,
                            skip,
                        }
                    };
                }
            }
        }
        Ok(())
    }

    fn begin_frame(&mut self, header: Header, processors: &ProcessorManager) -> Result<()> {
        if header.size as usize > self.max_frame_size {
            self.reset();
            return Err(codec::ProtocolError::frame_too_large(
                header.size as usize,
                self.max_frame_size,
                header.command,
            )
            .into());
        }

        let skip = match processors.on_header(&header) {
            Dispatch::Accepted => false,
            Dispatch::Unknown => true,
            Dispatch::Rejected => {
                self.reset();
                return Err(AgentError::protocol(format!(
                    "Processor rejected header of command {}",
                    header.command
                )));
            }
        };

        if header.size == 0 {
            // bodiless frames still get one delivery so processors see them
            if !skip && !processors.on_message(&header, 0, &[]) {
                self.reset();
                return Err(AgentError::protocol(format!(
                    "Processor rejected empty body of command {}",
                    header.command
                )));
            }
            self.state = RecvState::Header { filled: 0 };
        } else {
            if skip {
                debug!(command = header.command, size = header.size, "Skipping frame body");
            }
            self.state = RecvState::Body {
                header,
                finished: 0,
                skip,
            };
        }
        Ok(())
    }
}
