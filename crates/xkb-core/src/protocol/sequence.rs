//! Per-client request sequence numbers.
//!
//! # What is the sequence number in an event? (for beginners)
//!
//! Every request a client sends is implicitly numbered.  Events carry the
//! number of the last request the server processed for *that* client, so
//! the client can tell which of its requests an event follows.  Only the
//! low 16 bits travel on the wire.
//!
//! The counter is an `AtomicU64` so a connection task can bump it while the
//! dispatcher reads it from another task without taking a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing request counter for one client.
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Records that one more request was processed and returns its number.
    ///
    /// The first request is number 1.  Wraps from `u64::MAX` to 0.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Number of the last processed request.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }

    /// The 16-bit sequence number written into events.
    pub fn wire(&self) -> u16 {
        self.current() as u16
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
