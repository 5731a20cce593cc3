//! Flowcol - Storage plugins
//!
//! Storage plugins sit at the end of a Domain Context's chain: every Message
//! routed to a domain is handed to each configured plugin in arrival order.
//! Plugins never own the Message - they receive a shared handle, read what
//! they need and return.
//!
//! # Available Plugins
//!
//! | Plugin | Purpose |
//! |--------|---------|
//! | `null` | Discard everything (pipeline benchmarking) |
//! | `dump` | Human-readable record dump to stdout or a writer |
//!
//! A plugin's `process` must never panic on template-less Data Sets: a
//! Message may legitimately carry sets whose Template has not arrived yet,
//! and storage still sees the framing.

use std::sync::Arc;

use flowcol_protocol::Message;
use thiserror::Error;

pub mod dump;
pub mod null;

mod metrics;

pub use dump::DumpStorage;
pub use metrics::{StorageMetrics, StorageSnapshot};
pub use null::NullStorage;

#[cfg(test)]
mod dump_test;

/// Errors surfaced by storage plugins
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing to the plugin's destination failed
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The plugin is closed and cannot accept further Messages
    #[error("storage plugin closed")]
    Closed,
}

/// A destination for decoded Messages
///
/// One instance serves exactly one Domain Context and is driven by a single
/// thread; implementations need `Send` but no internal synchronization.
/// `process` and `close` mirror the pipeline's exactly-once discipline:
/// every Message is processed at most once, `close` is called exactly once
/// after the last Message.
pub trait StoragePlugin: Send {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Store one Message
    fn process(&mut self, message: &Arc<Message>) -> Result<(), StorageError>;

    /// Flush and release the destination; no further calls follow
    fn close(&mut self) -> Result<(), StorageError>;
}
