//! Per-plugin counters
//!
//! Relaxed-ordering atomics; values are eventually consistent, not
//! real-time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics shared by all storage plugins
#[derive(Debug, Default)]
pub struct StorageMetrics {
    /// Messages handed to the plugin
    messages_received: AtomicU64,

    /// Messages the plugin stored successfully
    messages_stored: AtomicU64,

    /// Data Records written (template-less sets contribute nothing)
    records_written: AtomicU64,

    /// Failed `process` calls
    write_errors: AtomicU64,
}

impl StorageMetrics {
    pub const fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_stored: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_stored(&self, records: u64) {
        self.messages_stored.fetch_add(1, Ordering::Relaxed);
        self.records_written.fetch_add(records, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent point-in-time copy of all counters
    pub fn snapshot(&self) -> StorageSnapshot {
        StorageSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_stored: self.messages_stored.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a plugin's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageSnapshot {
    pub messages_received: u64,
    pub messages_stored: u64,
    pub records_written: u64,
    pub write_errors: u64,
}
