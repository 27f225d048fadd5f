//! Interrupt-fed tick queue.
//!
//! Timer and trigger callbacks run in interrupt context and must never
//! touch the store or block. They enqueue a [`TickEvent`] here; the
//! cooperative loop drains the queue through [`crate::Sampler::poll`].
//! Pushes use a try-lock and a bounded buffer, so the hot path cannot
//! stall - a contended or overflowing push is counted as dropped instead.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// A sampling cause delivered from interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    /// Periodic timer expiry.
    Timer,
    /// External trigger input (reed switch, pulse input, remote request).
    Trigger,
}

/// A bounded, non-blocking event queue.
#[derive(Debug)]
pub struct TickQueue {
    events: Mutex<VecDeque<TickEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl TickQueue {
    /// Creates a queue holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues an event without blocking.
    ///
    /// Returns false (and counts the event as dropped) if the queue is
    /// full or momentarily contended.
    pub fn push(&self, event: TickEvent) -> bool {
        if let Some(mut events) = self.events.try_lock() {
            if events.len() < self.capacity {
                events.push_back(event);
                return true;
            }
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Dequeues the oldest event, if any.
    pub fn pop(&self) -> Option<TickEvent> {
        self.events.lock().pop_front()
    }

    /// Discards all queued events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events dropped because the queue was full or contended.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
