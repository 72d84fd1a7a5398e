//! # Agent Reactor Thread
//!
//! ## Purpose
//!
//! The single thread that performs all socket I/O for the agent. It waits on
//! a mio [`Poll`] with the idle-heartbeat interval as timeout and dispatches
//! readiness for two sources:
//!
//! - [`CONNECTOR`]: the center connection
//! - [`WAKER`]: fired by the report queue when a watched queue fills, and by
//!   [`AgentShared::request_stop`]
//!
//! ## Host Management
//!
//! While disconnected, each iteration re-resolves the center target,
//! reconciles the host ring, picks the next host round-robin and tries to
//! connect. A failed attempt bumps the host's failure counter and backs off
//! for the connect timeout. Both the wait for a center and the backoff are
//! interrupted by a stop request.
//!
//! ## Heartbeat
//!
//! A heartbeat is queued only when a poll returns with no events at all, so
//! any traffic within the window suppresses it.

use crate::center_host::CenterHostRing;
use crate::connector::Connector;
use crate::heartbeat::{build_heartbeat, HeartbeatHook};
use crate::interest::Readiness;
use crate::processor::ProcessorManager;
use crate::report_queue::ReportQueue;
use crate::resolver::Resolver;
use agent_config::{AgentConfig, CenterSettings};
use mio::{Events, Poll, Token, Waker};
use parking_lot::{Condvar, Mutex};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Token of the center connection
pub const CONNECTOR: Token = Token(0);
/// Token of the shared waker
pub const WAKER: Token = Token(1);

const EVENTS_CAPACITY: usize = 16;

/// Agent lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AgentState {
    NotStarted = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl AgentState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AgentState::NotStarted,
            1 => AgentState::Running,
            2 => AgentState::Stopping,
            _ => AgentState::Stopped,
        }
    }
}

/// State shared between the reactor and producer threads
pub struct AgentShared {
    pub(crate) queue: ReportQueue,
    pub(crate) processors: ProcessorManager,
    center: Mutex<Option<CenterSettings>>,
    signal: Condvar,
    state: AtomicU8,
    waker: Arc<Waker>,
}

impl AgentShared {
    pub(crate) fn new(queue_size: usize, waker: Arc<Waker>) -> Self {
        Self {
            queue: ReportQueue::new(queue_size, Some(waker.clone())),
            processors: ProcessorManager::new(),
            center: Mutex::new(None),
            signal: Condvar::new(),
            state: AtomicU8::new(AgentState::NotStarted as u8),
            waker,
        }
    }

    pub fn state(&self) -> AgentState {
        AgentState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: AgentState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self.state(), AgentState::Stopping | AgentState::Stopped)
    }

    /// Replace the center target; picked up by the next reconciliation
    pub(crate) fn set_center(&self, center: CenterSettings) {
        let mut guard = self.center.lock();
        info!(center = %center.target, port = center.port, "Center set");
        *guard = Some(center);
        self.signal.notify_all();
    }

    /// Block until a center is set; `None` once stopping
    fn wait_center(&self) -> Option<CenterSettings> {
        let mut guard = self.center.lock();
        loop {
            if self.is_stopping() {
                return None;
            }
            if let Some(center) = guard.as_ref() {
                return Some(center.clone());
            }
            self.signal.wait(&mut guard);
        }
    }

    /// Sleep for `duration` unless a stop request arrives first
    fn sleep_unless_stopped(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut guard = self.center.lock();
        while !self.is_stopping() {
            if self.signal.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
    }

    /// Ask the reactor to exit and wake it wherever it is blocked
    pub(crate) fn request_stop(&self) {
        {
            let _guard = self.center.lock();
            self.set_state(AgentState::Stopping);
            self.signal.notify_all();
        }
        if let Err(e) = self.waker.wake() {
            error!(error = %e, "Failed to wake reactor for stop");
        }
    }
}

/// Reactor-thread state; moved onto the thread by [`AgentThread::run`]
pub struct AgentThread {
    shared: Arc<AgentShared>,
    config: AgentConfig,
    poll: Poll,
    events: Events,
    connector: Connector,
    hosts: CenterHostRing,
    resolver: Box<dyn Resolver>,
    heartbeat_hook: Option<Box<dyn HeartbeatHook>>,
}

impl AgentThread {
    pub(crate) fn new(
        shared: Arc<AgentShared>,
        config: AgentConfig,
        poll: Poll,
        resolver: Box<dyn Resolver>,
        heartbeat_hook: Option<Box<dyn HeartbeatHook>>,
    ) -> Self {
        let connector = Connector::new(config.recv_chunk_size, config.max_frame_size);
        Self {
            shared,
            config,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            connector,
            hosts: CenterHostRing::new(),
            resolver,
            heartbeat_hook,
        }
    }

    /// Reactor loop; returns after a stop request
    pub fn run(mut self) {
        info!(
            heartbeat_interval = ?self.config.heartbeat_interval(),
            connect_timeout = ?self.config.connect_timeout(),
            "Agent thread started"
        );

        let mut ready = Vec::with_capacity(EVENTS_CAPACITY);
        'reactor: loop {
            if self.shared.is_stopping() {
                break;
            }

            if !self.connector.is_connected() {
                self.connect_to_center();
                continue;
            }

            if let Err(e) = self
                .poll
                .poll(&mut self.events, Some(self.config.heartbeat_interval()))
            {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "Poll failed");
                self.connector.close(self.poll.registry());
                continue;
            }

            if self.events.is_empty() {
                debug!("Agent timeout to send heartbeat");
                self.send_heartbeat();
                continue;
            }

            ready.clear();
            ready.extend(
                self.events
                    .iter()
                    .map(|event| (event.token(), Readiness::of(event))),
            );

            for &(token, readiness) in &ready {
                match token {
                    CONNECTOR => {
                        let next = self.connector.handle_readiness(
                            readiness,
                            &self.shared.queue,
                            &self.shared.processors,
                        );
                        self.connector.apply(next, self.poll.registry(), CONNECTOR);
                    }
                    WAKER => {
                        if self.shared.is_stopping() {
                            break 'reactor;
                        }
                        if self.shared.queue.take_ready() {
                            self.connector.enable_write(self.poll.registry(), CONNECTOR);
                        }
                    }
                    token => warn!(?token, "Event for unknown token"),
                }
            }
        }

        self.connector.close(self.poll.registry());
        self.shared.set_state(AgentState::Stopped);
        info!(queued = self.shared.queue.len(), "Agent thread exited");
    }

    fn connect_to_center(&mut self) {
        let Some(center) = self.shared.wait_center() else {
            return;
        };

        let resolved = self.resolver.resolve(&center.target);
        if !self.hosts.reconcile(&resolved, center.port) {
            warn!(center = %center.target, port = center.port, "No center host available");
            self.shared.sleep_unless_stopped(self.config.connect_timeout());
            return;
        }

        let Some(host) = self.hosts.select() else {
            return;
        };

        let timeout = self.config.connect_timeout();
        let result = host.socket_addr().and_then(|addr| {
            self.connector
                .connect(addr, timeout, self.poll.registry(), CONNECTOR)
        });

        match result {
            Ok(()) => host.reset_failures(),
            Err(e) => {
                host.record_failure();
                error!(
                    center = %host,
                    failures = host.consecutive_failures(),
                    error = %e,
                    "Connect center failed"
                );
                self.shared.sleep_unless_stopped(timeout);
            }
        }
    }

    /// Queue a heartbeat without blocking; dropped if the queue is full
    fn send_heartbeat(&mut self) {
        let msg = match build_heartbeat(self.heartbeat_hook.as_deref_mut()) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Failed to build heartbeat");
                return;
            }
        };

        if let Err(msg) = self.shared.queue.push(msg, Duration::ZERO) {
            debug!(bytes = msg.len(), "Report queue full, heartbeat dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn shared() -> (Poll, Arc<AgentShared>) {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), WAKER).unwrap());
        (poll, Arc::new(AgentShared::new(4, waker)))
    }

    #[test]
    fn test_state_transitions() {
        let (_poll, shared) = shared();
        assert_eq!(shared.state(), AgentState::NotStarted);
        shared.set_state(AgentState::Running);
        assert!(!shared.is_stopping());
        shared.request_stop();
        assert_eq!(shared.state(), AgentState::Stopping);
        assert!(shared.is_stopping());
    }

    #[test]
    fn test_wait_center_released_by_set_center() {
        let (_poll, shared) = shared();
        let waiter = {
            let shared = shared.clone();
            thread::spawn(move || shared.wait_center())
        };

        thread::sleep(Duration::from_millis(50));
        shared.set_center(CenterSettings {
            target: "127.0.0.1".to_string(),
            port: 9000,
        });

        let center = waiter.join().unwrap().unwrap();
        assert_eq!(center.port, 9000);
    }

    #[test]
    fn test_wait_center_released_by_stop() {
        let (_poll, shared) = shared();
        let waiter = {
            let shared = shared.clone();
            thread::spawn(move || shared.wait_center())
        };

        thread::sleep(Duration::from_millis(50));
        shared.request_stop();

        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn test_backoff_interrupted_by_stop() {
        let (_poll, shared) = shared();
        let sleeper = {
            let shared = shared.clone();
            thread::spawn(move || {
                let start = Instant::now();
                shared.sleep_unless_stopped(Duration::from_secs(30));
                start.elapsed()
            })
        };

        thread::sleep(Duration::from_millis(50));
        shared.request_stop();

        assert!(sleeper.join().unwrap() < Duration::from_secs(5));
    }

    #[test]
    fn test_heartbeat_dropped_when_queue_full() {
        let (poll, shared) = shared();
        let mut thread = AgentThread::new(
            shared.clone(),
            AgentConfig::default(),
            poll,
            Box::new(crate::resolver::SystemResolver),
            None,
        );

        for _ in 0..6 {
            thread.send_heartbeat();
        }

        assert_eq!(shared.queue.len(), 4);
    }

    struct FixedResolver(Vec<String>);

    impl Resolver for FixedResolver {
        fn resolve(&self, _target: &str) -> Vec<String> {
            self.0.clone()
        }
    }

    fn failures(thread: &AgentThread) -> Vec<(String, u32)> {
        thread
            .hosts
            .iter()
            .map(|h| (h.address().to_string(), h.consecutive_failures()))
            .collect()
    }

    #[test]
    fn test_connect_failure_accounting_and_rotation() {
        let port = std::net::TcpListener::bind("127.0.0.2:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let (poll, shared) = shared();
        shared.set_center(CenterSettings {
            target: "centers".to_string(),
            port,
        });
        let config = AgentConfig {
            connect_timeout_ms: 200,
            ..AgentConfig::default()
        };
        let mut thread = AgentThread::new(
            shared.clone(),
            config,
            poll,
            Box::new(FixedResolver(vec![
                "127.0.0.1".to_string(),
                "127.0.0.2".to_string(),
            ])),
            None,
        );

        // nobody listens yet: both hosts fail once, each with a flat backoff
        let start = Instant::now();
        thread.connect_to_center();
        thread.connect_to_center();
        assert!(start.elapsed() >= Duration::from_millis(400));
        assert!(!thread.connector.is_connected());
        assert_eq!(
            failures(&thread),
            vec![("127.0.0.1".to_string(), 1), ("127.0.0.2".to_string(), 1)]
        );

        // only 127.0.0.2 comes up; the same port on 127.0.0.1 keeps refusing
        let listener = std::net::TcpListener::bind(("127.0.0.2", port)).unwrap();
        thread.connect_to_center();
        assert!(!thread.connector.is_connected());
        thread.connect_to_center();
        assert!(thread.connector.is_connected());
        assert!(listener.accept().is_ok());

        // success resets, failure accumulates, ring order is unchanged
        assert_eq!(
            failures(&thread),
            vec![("127.0.0.1".to_string(), 2), ("127.0.0.2".to_string(), 0)]
        );

        thread.connector.close(thread.poll.registry());
    }
}
