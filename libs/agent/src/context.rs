//! Agent facade owned by the embedding application
//!
//! [`AgentContext`] starts the reactor thread, forwards reports into the
//! queue and manages command processors. Dropping it stops and joins the
//! reactor.

use crate::agent_thread::{AgentShared, AgentState, AgentThread, WAKER};
use crate::error::{AgentError, Result};
use crate::heartbeat::HeartbeatHook;
use crate::processor::CommandProcessor;
use crate::resolver::{Resolver, SystemResolver};
use agent_config::{AgentConfig, CenterSettings};
use codec::{Message, REPORT_MAX};
use mio::{Poll, Waker};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const THREAD_NAME: &str = "center-agent";

/// Configures and starts an agent
pub struct AgentBuilder {
    config: AgentConfig,
    resolver: Option<Box<dyn Resolver>>,
    heartbeat_hook: Option<Box<dyn HeartbeatHook>>,
}

impl AgentBuilder {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            resolver: None,
            heartbeat_hook: None,
        }
    }

    /// Replace the system name resolver
    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Attach application data to heartbeats
    pub fn with_heartbeat_hook(mut self, hook: impl HeartbeatHook + 'static) -> Self {
        self.heartbeat_hook = Some(Box::new(hook));
        self
    }

    /// Validate the configuration and spawn the reactor thread
    pub fn start(self) -> Result<AgentContext> {
        self.config
            .validate()
            .map_err(|e| AgentError::configuration(e.to_string(), None))?;

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let shared = Arc::new(AgentShared::new(self.config.queue_size as usize, waker));
        if let Some(center) = self.config.center.clone() {
            shared.set_center(center);
        }

        let reactor = AgentThread::new(
            shared.clone(),
            self.config.clone(),
            poll,
            self.resolver.unwrap_or_else(|| Box::new(SystemResolver)),
            self.heartbeat_hook,
        );

        shared.set_state(AgentState::Running);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || reactor.run())
            .map_err(|e| {
                shared.set_state(AgentState::Stopped);
                AgentError::from(e)
            })?;

        info!(queue_size = self.config.queue_size, "Agent started");
        Ok(AgentContext {
            shared,
            handle: Some(handle),
            config: self.config,
        })
    }
}

/// Running agent
pub struct AgentContext {
    shared: Arc<AgentShared>,
    handle: Option<JoinHandle<()>>,
    config: AgentConfig,
}

impl AgentContext {
    /// Start an agent with the system resolver and no heartbeat hook
    pub fn create(config: AgentConfig) -> Result<Self> {
        AgentBuilder::new(config).start()
    }

    pub fn builder(config: AgentConfig) -> AgentBuilder {
        AgentBuilder::new(config)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> AgentState {
        self.shared.state()
    }

    /// Point the agent at a center
    ///
    /// `target` is a DNS name or a comma-separated IP list. The reactor
    /// applies it on its next reconciliation pass.
    pub fn set_center(&self, target: &str, port: u16) -> Result<()> {
        let target = target.trim();
        if target.is_empty() {
            return Err(AgentError::configuration("Center target is empty", Some("target")));
        }
        if port == 0 {
            return Err(AgentError::configuration("Center port is zero", Some("port")));
        }

        self.shared.set_center(CenterSettings {
            target: target.to_string(),
            port,
        });
        Ok(())
    }

    /// Queue a report, waiting up to `timeout` for space
    ///
    /// A report that cannot be queued in time is dropped and
    /// [`AgentError::QueueFull`] is returned.
    pub fn report(&self, data: &[u8], timeout: Duration) -> Result<()> {
        if data.len() > self.config.max_frame_size {
            return Err(AgentError::PayloadTooLarge {
                size: data.len(),
                limit: self.config.max_frame_size,
            });
        }
        if self.shared.is_stopping() {
            return Err(AgentError::Stopped);
        }

        let msg = Message::report(data)?;
        match self.shared.queue.push(msg, timeout) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                debug!(bytes = rejected.len(), "Report rejected, queue full");
                Err(AgentError::queue_full(self.shared.queue.capacity(), timeout))
            }
        }
    }

    /// Format and queue a report, truncated to `REPORT_MAX` bytes
    pub fn report_fmt(&self, timeout: Duration, args: fmt::Arguments<'_>) -> Result<()> {
        let text = fmt::format(args);
        self.report(truncate_report(&text), timeout)
    }

    /// Register the handler for an inbound command; false if taken
    pub fn register_command_processor(
        &self,
        command: u32,
        processor: impl CommandProcessor + 'static,
    ) -> bool {
        self.shared.processors.register(command, Box::new(processor))
    }

    pub fn deregister_command_processor(&self, command: u32) {
        self.shared.processors.deregister(command);
    }

    /// Stop the reactor and wait for it to exit
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.shared.request_stop();
        if handle.join().is_err() {
            warn!("Agent thread panicked");
        }
        self.shared.set_state(AgentState::Stopped);
        info!("Agent stopped");
    }
}

impl Drop for AgentContext {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("state", &self.state())
            .field("queue", &self.shared.queue)
            .field("processors", &self.shared.processors)
            .finish()
    }
}

/// Longest prefix within `REPORT_MAX` that ends on a char boundary
fn truncate_report(text: &str) -> &[u8] {
    if text.len() <= REPORT_MAX {
        return text.as_bytes();
    }
    let mut end = REPORT_MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text.as_bytes()[..end]
}
