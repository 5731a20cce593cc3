//! Flowcol - Pipeline
//!
//! The concurrency skeleton of the collector: bounded ring buffers between
//! stage threads, a transform stage runner, and the Output Router that fans
//! Messages out to per-domain storage chains.
//!
//! # Architecture
//!
//! ```text
//! [Input] ──RingBuffer──> [Transform stage]* ──RingBuffer──> [Output Router]
//!                                                                  │
//!                                                      one DomainContext per ODID
//!                                                                  │
//!                                                    RingBuffer (one consumer slot
//!                                                     per storage plugin thread)
//! ```
//!
//! # Key Design
//!
//! - **Thread per stage**: no async runtime; every stage is a plain thread
//!   blocking on its input buffer
//! - **Bounded queues**: a full buffer blocks the producer, so backpressure
//!   from a slow storage plugin reaches the input stage naturally
//! - **Exactly-once release**: every consumer releases each slot exactly
//!   once, as a forward or as a drop; slots are reused only after all
//!   consumers released them
//! - **Per-domain ordering**: one consuming thread per Domain Context
//!   processes that domain's queue strictly in arrival order

mod domain;
mod error;
mod metrics;
mod ring;
mod router;
mod stage;

pub use domain::DomainContext;
pub use error::{PipelineError, Result};
pub use metrics::{RouterMetrics, RouterSnapshot};
pub use ring::RingBuffer;
pub use router::OutputRouter;
pub use stage::spawn_stage;
