//! # Center Connector
//!
//! ## Purpose
//!
//! Owns the single TCP connection to the selected center and performs
//! non-blocking, resumable I/O on it from the reactor thread.
//!
//! ## Send Path
//!
//! The message being written is held in a send slot together with its byte
//! offset. A writable event resumes the slot, then keeps pulling from the
//! report queue until the socket would block or the queue runs dry. On a dry
//! queue write interest is dropped and the queue's watch is armed instead.
//!
//! ## Receive Path
//!
//! Readable events drain the socket in fixed-size chunks through a
//! [`RecvMachine`]. Peer close, read errors and protocol faults all end in
//! [`NextInterest::Close`].
//!
//! ## Failure Semantics
//!
//! Closing discards the partially written message. Delivery is at most once.

use crate::error::{AgentError, Result};
use crate::interest::{NextInterest, Readiness};
use crate::processor::ProcessorManager;
use crate::recv_machine::RecvMachine;
use crate::report_queue::ReportQueue;
use codec::Message;
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle of the center connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// In-flight outbound message and how much of it has been written
#[derive(Debug, Default)]
struct SendState {
    current: Option<Message>,
    offset: usize,
}

impl SendState {
    fn clear(&mut self) -> Option<Message> {
        self.offset = 0;
        self.current.take()
    }
}

/// Non-blocking connection to one center host
pub struct Connector {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    state: ConnectionState,
    interest: Option<Interest>,
    want_write: bool,
    send: SendState,
    recv: RecvMachine,
    scratch: Vec<u8>,
    connected_at: Option<Instant>,
    bytes_sent: u64,
    bytes_received: u64,
}

impl Connector {
    pub fn new(recv_chunk_size: usize, max_frame_size: usize) -> Self {
        Self {
            stream: None,
            peer: None,
            state: ConnectionState::Disconnected,
            interest: None,
            want_write: false,
            send: SendState::default(),
            recv: RecvMachine::new(max_frame_size),
            scratch: vec![0u8; recv_chunk_size.max(1)],
            connected_at: None,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Connect within `timeout` and register for read and write
    ///
    /// Write interest is on from the start so a backlog queued while
    /// disconnected is flushed right away.
    pub fn connect(
        &mut self,
        addr: SocketAddr,
        timeout: Duration,
        registry: &Registry,
        token: Token,
    ) -> Result<()> {
        if self.stream.is_some() {
            self.close(registry);
        }
        self.state = ConnectionState::Connecting;

        match Self::open(addr, timeout) {
            Ok(mut stream) => {
                let interest = Interest::READABLE | Interest::WRITABLE;
                if let Err(e) = registry.register(&mut stream, token, interest) {
                    self.state = ConnectionState::Disconnected;
                    return Err(AgentError::connection_with_source(
                        "Failed to register connection",
                        Some(addr),
                        e,
                    ));
                }

                self.stream = Some(stream);
                self.peer = Some(addr);
                self.interest = Some(interest);
                self.want_write = true;
                self.connected_at = Some(Instant::now());
                self.state = ConnectionState::Connected;
                info!(peer = %addr, "Connected to center");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(AgentError::connection_with_source(
                    format!("Connect to center failed: {}", e),
                    Some(addr),
                    e,
                ))
            }
        }
    }

    fn open(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
        let stream = std::net::TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(TcpStream::from_std(stream))
    }

    /// Handle one readiness event for the connection
    pub fn handle_event(
        &mut self,
        event: &Event,
        queue: &ReportQueue,
        processors: &ProcessorManager,
    ) -> NextInterest {
        self.handle_readiness(Readiness::of(event), queue, processors)
    }

    /// Readiness dispatch independent of the event source
    pub fn handle_readiness(
        &mut self,
        readiness: Readiness,
        queue: &ReportQueue,
        processors: &ProcessorManager,
    ) -> NextInterest {
        if !self.is_connected() {
            return NextInterest::Close;
        }

        if readiness.readable && self.on_readable(processors) == NextInterest::Close {
            return NextInterest::Close;
        }

        if readiness.writable {
            return self.on_writable(queue);
        }

        if self.want_write {
            NextInterest::WatchBoth
        } else {
            NextInterest::KeepRead
        }
    }

    fn on_readable(&mut self, processors: &ProcessorManager) -> NextInterest {
        let Some(stream) = self.stream.as_mut() else {
            return NextInterest::Close;
        };

        loop {
            match stream.read(&mut self.scratch) {
                Ok(0) => {
                    info!(peer = ?self.peer, "Center closed connection");
                    return NextInterest::Close;
                }
                Ok(n) => {
                    self.bytes_received += n as u64;
                    if let Err(e) = self.recv.feed(&self.scratch[..n], processors) {
                        warn!(peer = ?self.peer, error = %e, "Receive failed, closing connection");
                        return NextInterest::Close;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return NextInterest::KeepRead,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(peer = ?self.peer, error = %e, "Read from center failed");
                    return NextInterest::Close;
                }
            }
        }
    }

    fn on_writable(&mut self, queue: &ReportQueue) -> NextInterest {
        let Some(stream) = self.stream.as_mut() else {
            return NextInterest::Close;
        };

        loop {
            if self.send.current.is_none() {
                match queue.pop_or_watch() {
                    Some(msg) => {
                        self.send.current = Some(msg);
                        self.send.offset = 0;
                    }
                    None => {
                        self.want_write = false;
                        return NextInterest::KeepRead;
                    }
                }
            }
            let Some(msg) = self.send.current.as_ref() else {
                return NextInterest::KeepRead;
            };

            let bytes = msg.as_bytes();
            match stream.write(&bytes[self.send.offset..]) {
                Ok(0) => {
                    warn!(peer = ?self.peer, "Center connection accepted zero bytes");
                    return NextInterest::Close;
                }
                Ok(n) => {
                    self.send.offset += n;
                    self.bytes_sent += n as u64;
                    if self.send.offset == bytes.len() {
                        self.send.clear();
                    } else {
                        debug!(
                            peer = ?self.peer,
                            written = self.send.offset,
                            total = bytes.len(),
                            "Partial send"
                        );
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.want_write = true;
                    return NextInterest::WatchBoth;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(peer = ?self.peer, error = %e, "Write to center failed");
                    return NextInterest::Close;
                }
            }
        }
    }

    /// Bring the registration in line with a handler outcome
    pub fn apply(&mut self, next: NextInterest, registry: &Registry, token: Token) {
        match next {
            NextInterest::Close => self.close(registry),
            NextInterest::Deregister => {
                if let Some(stream) = self.stream.as_mut() {
                    if let Err(e) = registry.deregister(stream) {
                        debug!(error = %e, "Deregister failed");
                    }
                }
                self.interest = None;
            }
            _ => {
                if let Some(interest) = next.interest() {
                    self.update_interest(interest, registry, token);
                }
            }
        }
    }

    /// Re-arm write interest after the report queue signalled data
    pub fn enable_write(&mut self, registry: &Registry, token: Token) {
        if !self.is_connected() {
            return;
        }
        self.want_write = true;
        self.update_interest(Interest::READABLE | Interest::WRITABLE, registry, token);
    }

    fn update_interest(&mut self, interest: Interest, registry: &Registry, token: Token) {
        if self.interest == Some(interest) {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let result = if self.interest.is_some() {
            registry.reregister(stream, token, interest)
        } else {
            registry.register(stream, token, interest)
        };

        match result {
            Ok(()) => self.interest = Some(interest),
            Err(e) => {
                warn!(peer = ?self.peer, error = %e, "Failed to update connection interest");
                self.close(registry);
            }
        }
    }

    /// Drop the connection and all per-connection state
    pub fn close(&mut self, registry: &Registry) {
        if let Some(mut stream) = self.stream.take() {
            if self.interest.is_some() {
                if let Err(e) = registry.deregister(&mut stream) {
                    debug!(error = %e, "Deregister on close failed");
                }
            }
            let uptime = self.connected_at.map(|at| at.elapsed());
            info!(
                peer = ?self.peer,
                ?uptime,
                bytes_sent = self.bytes_sent,
                bytes_received = self.bytes_received,
                "Closed center connection"
            );
        }

        if let Some(msg) = self.send.clear() {
            warn!(command = msg.command(), bytes = msg.len(), "Discarding partially sent message");
        }
        self.recv.reset();
        self.interest = None;
        self.want_write = false;
        self.connected_at = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("interest", &self.interest)
            .field("want_write", &self.want_write)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::MessageContext;
    use codec::{Header, REPORT_MESSAGE};
    use mio::Poll;
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    const TOKEN: Token = Token(0);

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn read_frame(stream: &mut std::net::TcpStream) -> (Header, Vec<u8>) {
        let mut header = [0u8; Header::SIZE];
        stream.read_exact(&mut header).unwrap();
        let header = Header::parse(&header).unwrap();
        let mut body = vec![0u8; header.size as usize];
        stream.read_exact(&mut body).unwrap();
        (header, body)
    }

    #[test]
    fn test_connect_refused_leaves_disconnected() {
        let (listener, addr) = listener();
        drop(listener);
        let poll = Poll::new().unwrap();
        let mut connector = Connector::new(1024, 1024);

        let err = connector
            .connect(addr, Duration::from_millis(500), poll.registry(), TOKEN)
            .unwrap_err();

        assert_eq!(err.category(), "connection");
        assert_eq!(connector.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_writable_drains_queue_then_watches() {
        let (listener, addr) = listener();
        let poll = Poll::new().unwrap();
        let mut connector = Connector::new(1024, 1024);
        connector
            .connect(addr, Duration::from_secs(1), poll.registry(), TOKEN)
            .unwrap();
        let (mut center, _) = listener.accept().unwrap();

        let queue = ReportQueue::new(4, None);
        let processors = ProcessorManager::new();
        queue.push(Message::report(b"one").unwrap(), Duration::ZERO).unwrap();
        queue.push(Message::report(b"two").unwrap(), Duration::ZERO).unwrap();

        let next = connector.handle_readiness(
            Readiness {
                readable: false,
                writable: true,
            },
            &queue,
            &processors,
        );

        assert_eq!(next, NextInterest::KeepRead);
        assert!(queue.is_watched());
        let (header, body) = read_frame(&mut center);
        assert_eq!(header.command, REPORT_MESSAGE);
        assert_eq!(body, b"one");
        assert_eq!(read_frame(&mut center).1, b"two");
        assert_eq!(connector.bytes_sent(), 2 * (Header::SIZE as u64 + 3));
    }

    #[test]
    fn test_readable_dispatches_and_detects_close() {
        let (listener, addr) = listener();
        let mut poll = Poll::new().unwrap();
        let mut events = mio::Events::with_capacity(8);
        let mut connector = Connector::new(4, 1024);
        connector
            .connect(addr, Duration::from_secs(1), poll.registry(), TOKEN)
            .unwrap();
        let (mut center, _) = listener.accept().unwrap();

        let queue = ReportQueue::new(4, None);
        let processors = ProcessorManager::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        processors.register(
            9,
            Box::new(move |_: &MessageContext, chunk: &[u8]| {
                sink.lock().unwrap().extend_from_slice(chunk);
                true
            }),
        );

        center
            .write_all(Message::new(9, b"command body").unwrap().as_bytes())
            .unwrap();
        drop(center);

        // keep polling until the close is seen
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut next = NextInterest::KeepRead;
        while next != NextInterest::Close && Instant::now() < deadline {
            poll.poll(&mut events, Some(Duration::from_millis(100))).unwrap();
            for event in events.iter() {
                next = connector.handle_event(event, &queue, &processors);
                if next == NextInterest::Close {
                    break;
                }
            }
        }

        assert_eq!(next, NextInterest::Close);
        assert_eq!(received.lock().unwrap().as_slice(), b"command body");
        connector.apply(next, poll.registry(), TOKEN);
        assert!(!connector.is_connected());
    }

    #[test]
    fn test_close_resets_state() {
        let (listener, addr) = listener();
        let poll = Poll::new().unwrap();
        let mut connector = Connector::new(1024, 1024);
        connector
            .connect(addr, Duration::from_secs(1), poll.registry(), TOKEN)
            .unwrap();
        let _center = listener.accept().unwrap();

        connector.close(poll.registry());

        assert_eq!(connector.state(), ConnectionState::Disconnected);
        let queue = ReportQueue::new(1, None);
        let processors = ProcessorManager::new();
        assert_eq!(
            connector.handle_readiness(
                Readiness {
                    readable: true,
                    writable: true,
                },
                &queue,
                &processors
            ),
            NextInterest::Close
        );
    }
}
