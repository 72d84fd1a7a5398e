//! # Command Processors
//!
//! ## Purpose
//!
//! Dispatches inbound frames to application-registered handlers keyed by the
//! frame's command code. The table is the only structure besides the report
//! queue that producer threads and the reactor share, so it sits behind a
//! mutex. Registration is expected at setup time; dispatch happens on the
//! reactor thread.
//!
//! ## Incremental Bodies
//!
//! Bodies are not buffered. A processor sees `on_header` once per frame and
//! then `on_message` for each chunk as it arrives, with a [`MessageContext`]
//! describing how far into the body the chunk starts.

use codec::Header;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Progress of the frame body being dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageContext {
    /// Declared payload size of the frame
    pub total_size: u32,
    /// Body bytes delivered before the current chunk
    pub finished_size: u32,
}

impl MessageContext {
    /// True when `chunk_len` bytes complete the body
    pub fn is_last_chunk(&self, chunk_len: usize) -> bool {
        self.finished_size as usize + chunk_len >= self.total_size as usize
    }
}

/// Handler for one inbound command code
///
/// Returning `false` from either method rejects the frame and closes the
/// connection; the agent reconnects through the normal path.
///
/// Callbacks run on the reactor thread with the processor table locked. A
/// processor must not register or deregister processors from inside a
/// callback: the table lock is not reentrant and the reactor deadlocks.
pub trait CommandProcessor: Send {
    fn on_header(&mut self, _header: &Header) -> bool {
        true
    }

    fn on_message(&mut self, ctx: &MessageContext, chunk: &[u8]) -> bool;
}

impl<F> CommandProcessor for F
where
    F: FnMut(&MessageContext, &[u8]) -> bool + Send,
{
    fn on_message(&mut self, ctx: &MessageContext, chunk: &[u8]) -> bool {
        self(ctx, chunk)
    }
}

/// Outcome of header dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A processor accepted the frame; deliver the body
    Accepted,
    /// The processor refused the frame
    Rejected,
    /// No processor for this command; skip the body
    Unknown,
}

/// Command-code to processor table
#[derive(Default)]
pub struct ProcessorManager {
    processors: Mutex<HashMap<u32, Box<dyn CommandProcessor>>>,
}

impl ProcessorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor; fails if the code is taken
    pub fn register(&self, command: u32, processor: Box<dyn CommandProcessor>) -> bool {
        let mut processors = self.processors.lock();
        if processors.contains_key(&command) {
            warn!(command, "Command processor already registered");
            return false;
        }
        processors.insert(command, processor);
        debug!(command, "Registered command processor");
        true
    }

    /// Remove a processor; removing an absent code is a no-op
    pub fn deregister(&self, command: u32) {
        if self.processors.lock().remove(&command).is_some() {
            debug!(command, "Deregistered command processor");
        }
    }

    pub fn is_registered(&self, command: u32) -> bool {
        self.processors.lock().contains_key(&command)
    }

    pub fn len(&self) -> usize {
        self.processors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.lock().is_empty()
    }

    pub fn on_header(&self, header: &Header) -> Dispatch {
        let mut processors = self.processors.lock();
        match processors.get_mut(&header.command) {
            Some(processor) => {
                if processor.on_header(header) {
                    Dispatch::Accepted
                } else {
                    Dispatch::Rejected
                }
            }
            None => {
                warn!(command = header.command, size = header.size, "Unknown command, dropping frame");
                Dispatch::Unknown
            }
        }
    }

    /// Forward one body chunk
    ///
    /// A processor deregistered mid-frame makes the rest of the body silently
    /// dropped, which is reported as accepted.
    pub fn on_message(&self, header: &Header, finished_size: u32, chunk: &[u8]) -> bool {
        let ctx = MessageContext {
            total_size: header.size,
            finished_size,
        };
        let mut processors = self.processors.lock();
        match processors.get_mut(&header.command) {
            Some(processor) => processor.on_message(&ctx, chunk),
            None => true,
        }
    }
}

impl std::fmt::Debug for ProcessorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<u32> = self.processors.lock().keys().copied().collect();
        commands.sort_unstable();
        f.debug_struct("ProcessorManager")
            .field("commands", &commands)
            .finish()
    }
}
