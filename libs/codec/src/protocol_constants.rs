//! Protocol constants for the center connection
//!
//! These values are part of the wire contract between agents and centers and
//! must stay stable across releases.

/// Idle heartbeat sent by the agent; payload is optional application data.
pub const SIMPLE_HEARTBEAT_MESSAGE: u32 = 1;

/// Application report forwarded to the center.
pub const REPORT_MESSAGE: u32 = 2;

/// Upper bound for a single formatted report, in bytes.
pub const REPORT_MAX: usize = 10240;

/// Default upper bound for an inbound frame payload (16MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
