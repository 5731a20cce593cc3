//! Flowcol Templates - the Template Manager
//!
//! IPFIX Data Records are meaningless without the Template that describes
//! them, and Templates arrive on the same stream, possibly after the data
//! that needs them. The `TemplateManager` is the registry bridging that gap:
//! it keeps the active Template per `(Observation Domain ID, source
//! fingerprint, Template ID)`, retains superseded versions for as long as
//! in-flight Messages still reference them, and hands out fresh Template IDs
//! to stages that synthesize their own announcements.
//!
//! # Design
//!
//! - **Bucket-per-source**: templates live in buckets keyed by
//!   `(ODID, fingerprint)`. Mutation locks one bucket; lookups on other
//!   buckets proceed concurrently.
//! - **Supersede, never free in place**: replacing a Template moves the old
//!   version onto a superseded list instead of dropping it. A superseded
//!   version is pruned opportunistically once its reference count hits zero;
//!   `Arc` keeps the memory valid for any Message still holding it.
//! - **Refresh dedup**: re-announcing a byte-identical Template returns the
//!   existing `Arc` unchanged. UDP exporters retransmit their Templates every
//!   refresh interval; that is not a change.

mod error;
mod key;
mod manager;
mod process;

pub use error::TemplateError;
pub use key::TemplateKey;
pub use manager::{Insertion, TemplateManager};
pub use process::{process_message, ProcessSummary, UDP_TEMPLATE_LIFETIME_SECS};

#[cfg(test)]
mod process_test;
#[cfg(test)]
pub(crate) mod testutil;
