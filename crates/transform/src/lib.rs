//! Flowcol - Transform stages
//!
//! A Transform sits between the decoder and the Output Router. Each stage
//! runs on its own thread, receives Messages from its input queue and either
//! forwards Messages downstream (the same one, a newly built one, or several
//! when a rebuilt stream outgrows the u16 message length) or drops the
//! input. Forward and drop are the two terminal actions; exactly one of
//! them happens per received Message.
//!
//! A stage that builds a new Message owns a freshly allocated buffer and
//! forwards that, independent of the original packet's lifetime.

use std::sync::Arc;

use flowcol_protocol::Message;
use thiserror::Error;

pub mod join;

pub use join::DomainJoin;


/// Errors surfaced by transform stages
#[derive(Debug, Error)]
pub enum TransformError {
    /// A Message built by the stage failed to decode back
    #[error(transparent)]
    Decode(#[from] flowcol_protocol::DecodeError),

    /// Registry interaction failed (ID allocation exhausted and the like)
    #[error(transparent)]
    Template(#[from] flowcol_templates::TemplateError),
}

/// What a stage decided to do with one Message
pub enum Verdict {
    /// Send these Messages downstream, in order (usually one; a stage that
    /// grows records may have to split its output to honor the u16 length)
    Forward(Vec<Arc<Message>>),
    /// Terminal drop; nothing reaches downstream for this input
    Drop,
}

/// A pipeline stage rewriting or filtering Messages
///
/// Driven by exactly one thread; `process` is called once per input Message
/// and `close` exactly once after the last one.
pub trait Transform: Send {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Handle one Message
    fn process(&mut self, message: Arc<Message>) -> Result<Verdict, TransformError>;

    /// Input queue closed; release per-stage state
    fn close(&mut self);
}
