//! Protocol-level errors for frame processing

use thiserror::Error;

/// Framing errors with enough context to diagnose a broken peer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Declared payload exceeds the negotiated frame limit
    #[error("Frame too large: {size} bytes exceeds limit {limit} (command {command}, cause: {likely_cause})")]
    FrameTooLarge {
        size: usize,
        limit: usize,
        command: u32,
        likely_cause: String,
    },
}

impl ProtocolError {
    /// Create MessageTooSmall error with diagnostic context
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    /// Create FrameTooLarge error, guessing whether the size field is garbage
    pub fn frame_too_large(size: usize, limit: usize, command: u32) -> Self {
        let likely_cause = if size > limit.saturating_mul(16) {
            "corrupted size field or stream desynchronised"
        } else {
            "peer sent a frame above the configured limit"
        };

        Self::FrameTooLarge {
            size,
            limit,
            command,
            likely_cause: likely_cause.to_string(),
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
