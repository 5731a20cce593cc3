//! Protocol error types
//!
//! Errors that can occur when decoding IPFIX messages and templates.
//! Header- and message-level malformation aborts the affected packet only;
//! it is never fatal to the collector.

use thiserror::Error;

/// Errors that can occur during IPFIX decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Message header is invalid (wrong version or impossible length)
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Set or record lengths are inconsistent with the packet
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Template Record cannot be parsed within its Set
    #[error("malformed template: {0}")]
    MalformedTemplate(String),

    /// Set ID in the reserved range 0..2, 4..255 (non-fatal, set is skipped)
    #[error("unknown set id {0}")]
    UnknownSetId(u16),

    /// No active Template for a Data Set (non-fatal, set kept undecoded)
    #[error("template {template_id} not found for domain {odid}")]
    TemplateNotFound { odid: u32, template_id: u16 },

    /// Message carries more Sets than the configured bound
    #[error("too many sets: message has more than {max} sets")]
    TooManySets { max: usize },

    /// Buffer too short for the structure being read
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort { expected: usize, actual: usize },
}

impl DecodeError {
    /// Create a message too short error
    #[inline]
    pub fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Create a malformed header error
    #[inline]
    pub fn header(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    /// Create a malformed message error
    #[inline]
    pub fn message(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }

    /// Create a malformed template error
    #[inline]
    pub fn template(msg: impl Into<String>) -> Self {
        Self::MalformedTemplate(msg.into())
    }

    /// Check if this error affects one Set only (processing can continue)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownSetId(_) | Self::TemplateNotFound { .. }
        )
    }
}
