//! Output router counters
//!
//! Relaxed-ordering atomics, eventually consistent. Shared with the
//! collector's shutdown report via `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for the Output Router
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Messages read from the router's input buffer
    messages_received: AtomicU64,

    /// Messages handed to a Domain Context queue
    messages_routed: AtomicU64,

    /// Domain Contexts created so far
    domains_created: AtomicU64,

    /// Times a domain queue was full and the router had to block
    backpressure_events: AtomicU64,
}

impl RouterMetrics {
    pub const fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_routed: AtomicU64::new(0),
            domains_created: AtomicU64::new(0),
            backpressure_events: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn domain_created(&self) {
        self.domains_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn backpressure(&self) {
        self.backpressure_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent point-in-time copy of all counters
    pub fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            domains_created: self.domains_created.load(Ordering::Relaxed),
            backpressure_events: self.backpressure_events.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the router's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterSnapshot {
    pub messages_received: u64,
    pub messages_routed: u64,
    pub domains_created: u64,
    pub backpressure_events: u64,
}
