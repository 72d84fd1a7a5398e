//! # Center Agent
//!
//! Forwards application reports to a center over a single TCP connection
//! and dispatches commands the center sends back.
//!
//! ## Architecture
//!
//! ```text
//! app threads ── report() ──> ReportQueue ──> Connector ──> center
//!                                  │ waker        │
//!                                  v              v
//!                             AgentThread <── RecvMachine ──> ProcessorManager
//! ```
//!
//! One reactor thread ([`agent_thread::AgentThread`]) owns the connection,
//! the host ring and all send/receive state. Producer threads touch only the
//! report queue and the processor table, both lock-guarded.
//!
//! ## Usage
//!
//! ```no_run
//! use agent::{AgentContext, MessageContext};
//! use agent_config::AgentConfig;
//! use std::time::Duration;
//!
//! let agent = AgentContext::create(AgentConfig::default())?;
//! agent.set_center("10.0.0.1,10.0.0.2", 9000)?;
//! agent.register_command_processor(3, |ctx: &MessageContext, chunk: &[u8]| {
//!     println!("{} of {} bytes", ctx.finished_size as usize + chunk.len(), ctx.total_size);
//!     true
//! });
//! agent.report(b"cpu=12", Duration::from_millis(100))?;
//! # Ok::<(), agent::AgentError>(())
//! ```

pub mod agent_thread;
pub mod center_host;
pub mod connector;
pub mod context;
pub mod error;
pub mod heartbeat;
pub mod interest;
pub mod processor;
pub mod recv_machine;
pub mod report_queue;
pub mod resolver;

pub use agent_thread::AgentState;
pub use center_host::{CenterHost, CenterHostRing};
pub use connector::{ConnectionState, Connector};
pub use context::{AgentBuilder, AgentContext};
pub use error::{AgentError, Result};
pub use heartbeat::HeartbeatHook;
pub use interest::{NextInterest, Readiness};
pub use processor::{CommandProcessor, Dispatch, MessageContext, ProcessorManager};
pub use recv_machine::RecvMachine;
pub use report_queue::ReportQueue;
pub use resolver::{Resolver, SystemResolver};
