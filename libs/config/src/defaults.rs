//! Default configuration values
//!
//! Centralised so the binary, the library defaults and the serde defaults agree.

/// Report queue capacity (messages)
pub const QUEUE_SIZE: u32 = 100;

/// Center connect timeout, also the flat backoff after a failed connect (milliseconds)
pub const CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Idle time without any traffic before a heartbeat is queued (milliseconds)
pub const HEARTBEAT_INTERVAL_MS: u64 = 2_000;

/// Largest inbound frame payload accepted from a center (bytes)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Bytes read from the socket per receive call
pub const RECV_CHUNK_SIZE: usize = 1024;

/// Environment variable prefix for overrides, e.g. `AGENT__QUEUE_SIZE=500`
pub const ENV_PREFIX: &str = "AGENT";
