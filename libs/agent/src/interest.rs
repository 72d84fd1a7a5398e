//! Readiness in, registration outcome out

use mio::event::Event;
use mio::Interest;

/// Readiness of one event
///
/// Errors and peer hang-ups count as readable so the handler sees them on
/// its next read; errors also count as writable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub fn of(event: &Event) -> Self {
        Self {
            readable: event.is_readable() || event.is_read_closed() || event.is_error(),
            writable: event.is_writable() || event.is_error(),
        }
    }
}

/// What the reactor should do with a source after handling its event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextInterest {
    /// Watch for readability only
    KeepRead,
    /// Watch for writability only
    WatchWrite,
    /// Watch for both
    WatchBoth,
    /// Stop watching but keep the source open
    Deregister,
    /// Stop watching and close the source
    Close,
}

impl NextInterest {
    /// Interest set to register, `None` when the source leaves the poll
    pub fn interest(self) -> Option<Interest> {
        match self {
            NextInterest::KeepRead => Some(Interest::READABLE),
            NextInterest::WatchWrite => Some(Interest::WRITABLE),
            NextInterest::WatchBoth => Some(Interest::READABLE | Interest::WRITABLE),
            NextInterest::Deregister | NextInterest::Close => None,
        }
    }
}
