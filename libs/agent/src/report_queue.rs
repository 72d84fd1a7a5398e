//! # Report Queue
//!
//! ## Purpose
//!
//! Bounded hand-off between producer threads calling `report()` and the
//! reactor, which drains it from the connector's writable handler. Producers
//! block up to their own timeout while the queue is full; the reactor never
//! blocks on it beyond the lock acquire.
//!
//! ## Readiness
//!
//! When the connector finds the queue empty it arms a watch instead of
//! keeping write interest on the socket. The next push then flags the queue
//! ready and fires the reactor's waker, which re-arms the connector for
//! writing. The watch is one-shot: it is consumed by [`ReportQueue::take_ready`].
//!
//! ## Storage
//!
//! A ring of `capacity + 1` slots; one slot always stays empty so that
//! `head == tail` means empty and `tail + 1 == head` means full.

use codec::Message;
use mio::Waker;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

struct Ring {
    slots: Vec<Option<Message>>,
    head: usize,
    tail: usize,
    watched: bool,
    ready: bool,
}

impl Ring {
    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn is_full(&self) -> bool {
        (self.tail + 1) % self.slots.len() == self.head
    }

    fn len(&self) -> usize {
        (self.tail + self.slots.len() - self.head) % self.slots.len()
    }

    fn take_head(&mut self) -> Option<Message> {
        if self.is_empty() {
            return None;
        }
        let msg = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        msg
    }
}

/// Bounded FIFO of outbound messages
pub struct ReportQueue {
    ring: Mutex<Ring>,
    not_full: Condvar,
    waker: Option<Arc<Waker>>,
}

impl ReportQueue {
    /// Queue holding at most `capacity` messages
    ///
    /// `waker` is fired when a watched queue becomes non-empty.
    pub fn new(capacity: usize, waker: Option<Arc<Waker>>) -> Self {
        let slots = capacity.max(1) + 1;
        Self {
            ring: Mutex::new(Ring {
                slots: (0..slots).map(|_| None).collect(),
                head: 0,
                tail: 0,
                watched: false,
                ready: false,
            }),
            not_full: Condvar::new(),
            waker,
        }
    }

    /// Enqueue, waiting up to `timeout` for a free slot
    ///
    /// On timeout the message is handed back to the caller.
    pub fn push(&self, msg: Message, timeout: Duration) -> Result<(), Message> {
        let wake = {
            let mut ring = self.ring.lock();
            if ring.is_full() {
                if timeout.is_zero() {
                    return Err(msg);
                }
                let deadline = Instant::now() + timeout;
                while ring.is_full() {
                    if self.not_full.wait_until(&mut ring, deadline).timed_out() && ring.is_full() {
                        return Err(msg);
                    }
                }
            }

            let tail = ring.tail;
            ring.slots[tail] = Some(msg);
            ring.tail = (tail + 1) % ring.slots.len();

            if ring.watched && !ring.ready {
                ring.ready = true;
                true
            } else {
                false
            }
        };

        if wake {
            self.wake();
        }
        Ok(())
    }

    /// Dequeue the oldest message
    pub fn pop(&self) -> Option<Message> {
        let msg = self.ring.lock().take_head();
        if msg.is_some() {
            self.not_full.notify_one();
        }
        msg
    }

    /// Dequeue, or arm the watch if there is nothing to send
    pub fn pop_or_watch(&self) -> Option<Message> {
        let msg = {
            let mut ring = self.ring.lock();
            let msg = ring.take_head();
            if msg.is_none() {
                ring.watched = true;
            }
            msg
        };
        if msg.is_some() {
            self.not_full.notify_one();
        }
        msg
    }

    /// Consume a pending readiness flag, disarming the watch
    pub fn take_ready(&self) -> bool {
        let mut ring = self.ring.lock();
        if ring.ready {
            ring.ready = false;
            ring.watched = false;
            true
        } else {
            false
        }
    }

    pub fn is_watched(&self) -> bool {
        self.ring.lock().watched
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len() - 1
    }

    fn wake(&self) {
        if let Some(waker) = &self.waker {
            if let Err(e) = waker.wake() {
                error!(error = %e, "Failed to wake reactor for queued report");
            }
        }
    }
}

impl std::fmt::Debug for ReportQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("ReportQueue")
            .field("len", &ring.len())
            .field("capacity", &(ring.slots.len() - 1))
            .field("watched", &ring.watched)
            .field("ready", &ring.ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    fn report(text: &str) -> Message {
        Message::report(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_capacity_bound() {
        let queue = ReportQueue::new(3, None);
        for i in 0..3 {
            queue.push(report(&i.to_string()), Duration::ZERO).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert!(queue.push(report("overflow"), Duration::ZERO).is_err());

        queue.pop().unwrap();
        assert!(queue.push(report("fits"), Duration::ZERO).is_ok());
        assert_eq!(queue.len(), queue.capacity());
    }

    #[test]
    fn test_timeout_returns_ownership() {
        let queue = ReportQueue::new(1, None);
        queue.push(report("first"), Duration::ZERO).unwrap();

        let start = Instant::now();
        let rejected = queue
            .push(report("second"), Duration::from_millis(50))
            .unwrap_err();

        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(rejected.payload(), b"second");
        assert_eq!(queue.pop().unwrap().payload(), b"first");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_blocked_push_released_by_pop() {
        let queue = Arc::new(ReportQueue::new(1, None));
        queue.push(report("first"), Duration::ZERO).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(report("second"), Duration::from_secs(5)).is_ok())
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.pop().unwrap().payload(), b"first");
        assert!(producer.join().unwrap());
        assert_eq!(queue.pop().unwrap().payload(), b"second");
    }

    #[test]
    fn test_watch_is_one_shot() {
        let queue = ReportQueue::new(4, None);

        assert!(queue.pop_or_watch().is_none());
        assert!(queue.is_watched());
        assert!(!queue.take_ready());

        queue.push(report("a"), Duration::ZERO).unwrap();
        queue.push(report("b"), Duration::ZERO).unwrap();
        assert!(queue.take_ready());
        assert!(!queue.take_ready());
        assert!(!queue.is_watched());

        // unwatched pushes do not flag readiness
        queue.push(report("c"), Duration::ZERO).unwrap();
        assert!(!queue.take_ready());
    }

    #[test]
    fn test_push_wakes_poll() {
        let mut poll = mio::Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), mio::Token(7)).unwrap());
        let queue = ReportQueue::new(2, Some(waker));
        let mut events = mio::Events::with_capacity(4);

        assert!(queue.pop_or_watch().is_none());
        queue.push(report("wake"), Duration::ZERO).unwrap();

        poll.poll(&mut events, Some(Duration::from_secs(1))).unwrap();
        assert!(events.iter().any(|event| event.token() == mio::Token(7)));
        assert!(queue.take_ready());
    }

    proptest! {
        #[test]
        fn prop_fifo_order(payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 1..16)) {
            let queue = ReportQueue::new(payloads.len(), None);
            for payload in &payloads {
                prop_assert!(queue.push(Message::report(payload).unwrap(), Duration::ZERO).is_ok());
            }
            for payload in &payloads {
                let msg = queue.pop().unwrap();
                prop_assert_eq!(msg.payload(), payload.as_slice());
            }
            prop_assert!(queue.pop().is_none());
        }
    }
}
