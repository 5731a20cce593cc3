//! Flowcol Protocol - IPFIX (RFC 7011) wire format
//!
//! This crate provides the foundational types that flow through the pipeline:
//! - `Message` - decoded view of one IPFIX message, owning its packet bytes
//! - `Template` - immutable schema for Data Records referencing its ID
//! - `decode` - the set walker that turns raw bytes into a `Message`
//! - Record accessors - field lookup and record iteration against a Template
//!
//! # Design Principles
//!
//! - **Zero-copy**: a `Message` owns its packet as `bytes::Bytes`; every Set
//!   is a byte range into that buffer, never a copy
//! - **Arc-friendly**: `Message` and `Template` are shared across pipeline
//!   stages behind `Arc` with no further allocation
//! - **Bounds-checked**: malformed input yields errors, never panics or
//!   out-of-range reads
//!
//! # Wire Format
//!
//! The IPFIX layouts (message header, set header, template records and the
//! variable-length field encoding) are fixed by RFC 7011 §3 and reproduced
//! bit-exactly here. All integers on the wire are big-endian.

mod decode;
mod error;
mod message;
mod records;
mod source;
mod template;
mod wire;

pub use decode::decode;
pub use error::DecodeError;
pub use message::{DataCouple, Message, SetRef, SourceStatus};
pub use records::{DataRecords, TemplateRecords, record_length, field_location};
pub use source::{SourceInfo, Transport};
pub use template::{FieldSpecifier, Template, TemplateKind};
pub use wire::{MessageHeader, SetHeader};

// Re-export bytes for convenience
pub use bytes::Bytes;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// IPFIX protocol version carried in every message header
pub const IPFIX_VERSION: u16 = 10;

/// Length of the IPFIX message header in octets
pub const HEADER_LENGTH: usize = 16;

/// Length of a Set header in octets
pub const SET_HEADER_LENGTH: usize = 4;

/// Set ID announcing Template Records
pub const TEMPLATE_SET_ID: u16 = 2;

/// Set ID announcing Options Template Records
pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;

/// Smallest Set ID that refers to a Data Set (value = Template ID)
pub const MIN_DATA_SET_ID: u16 = 256;

/// Field length marking a variable-length Information Element
pub const VARIABLE_LENGTH: u16 = 0xFFFF;

/// Length of a Template withdrawal record in octets
pub const WITHDRAWAL_RECORD_LENGTH: usize = 4;

/// Default bound on the number of Sets accepted in a single message
pub const DEFAULT_MAX_SETS: usize = 1024;

#[cfg(test)]
mod records_test;
#[cfg(test)]
pub(crate) mod testpkt;
