//! Template - schema for Data Records
//!
//! A `Template` is parsed once from a Template Record (or Options Template
//! Record) and is immutable afterwards: its field layout never changes. The
//! mutable bookkeeping a collector needs - in-flight reference count,
//! withdrawal state, UDP refresh markers - lives in atomics so a Template can
//! be shared across stages behind `Arc` without locking.
//!
//! # Wire Format
//!
//! ```text
//! Template Record:          template_id:u16, field_count:u16, fields...
//! Options Template Record:  template_id:u16, field_count:u16,
//!                           scope_field_count:u16, fields...
//! Field specifier:          ie_id:u16 (top bit = enterprise flag), length:u16
//!                           [enterprise_number:u32 when the flag is set]
//! ```
//!
//! `field_count` counts all fields including scope fields. A field length of
//! 0xFFFF marks a variable-length Information Element; the true length is
//! encoded per record in the data (see `records`).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::wire::{read_u16, read_u32};
use crate::{DecodeError, Result, VARIABLE_LENGTH};

/// Octets of a field specifier without the enterprise number
const FIELD_SPEC_LEN: usize = 4;

/// Octets of the enterprise number following an enterprise-flagged specifier
const ENTERPRISE_NUM_LEN: usize = 4;

/// Kind of a Template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Ordinary Template (announced in Set 2)
    Template,
    /// Options Template with leading scope fields (announced in Set 3)
    OptionsTemplate,
}

/// One Information Element in a Template's field layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpecifier {
    /// Information Element identifier (enterprise bit stripped)
    pub ie_id: u16,
    /// Declared field length, or `VARIABLE_LENGTH` (0xFFFF)
    pub length: u16,
    /// Enterprise number when the specifier carried the enterprise flag
    pub enterprise_number: Option<u32>,
}

impl FieldSpecifier {
    /// Whether this field uses the RFC 7011 variable-length encoding
    #[inline]
    pub fn is_variable(&self) -> bool {
        self.length == VARIABLE_LENGTH
    }
}

/// Schema for the Data Records referencing one Template ID
///
/// Field specifiers are immutable once constructed. The reference count
/// tracks Data Records/Messages currently pointing at this Template; a
/// Template is reclaimed only once it has been superseded or withdrawn *and*
/// the count reaches zero (the `Arc` holding it is then dropped by the
/// Template Manager and memory follows the last in-flight handle).
#[derive(Debug)]
pub struct Template {
    id: u16,
    kind: TemplateKind,
    scope_field_count: u16,
    fields: Vec<FieldSpecifier>,

    /// Total Data Record length when no field is variable-length
    fixed_record_length: Option<u16>,

    /// Smallest possible record length (fixed fields + 1 octet per
    /// variable-length field), used to terminate record iteration
    min_record_length: u16,

    /// Number of in-flight Data Records/Messages pointing at this Template
    references: AtomicU32,

    /// Set once the Template is withdrawn or superseded
    withdrawn: AtomicBool,

    /// UDP only: UNIX time of the last (re)transmission
    last_refresh: AtomicU64,

    /// UDP only: message counter at the last (re)transmission
    last_message: AtomicU32,
}

impl Template {
    /// Parse one (Options) Template Record starting at `buf`
    ///
    /// `buf` must be limited to the end of the enclosing Set; parsing never
    /// reads past it. Returns the Template and the number of octets the
    /// record occupied (callers advance by this to the next record).
    ///
    /// # Errors
    ///
    /// `MalformedTemplate` when the record is truncated, declares zero
    /// fields, declares more scope fields than fields, or an
    /// enterprise-flagged specifier's 4-byte enterprise number would overrun
    /// the Set.
    pub fn parse(buf: &[u8], kind: TemplateKind) -> Result<(Self, usize)> {
        let header_len = match kind {
            TemplateKind::Template => 4,
            TemplateKind::OptionsTemplate => 6,
        };
        if buf.len() < header_len {
            return Err(DecodeError::template(format!(
                "record header needs {header_len} bytes, {} available",
                buf.len()
            )));
        }

        let id = read_u16(buf, 0)?;
        let field_count = read_u16(buf, 2)?;
        if field_count == 0 {
            return Err(DecodeError::template("record declares zero fields"));
        }

        let scope_field_count = match kind {
            TemplateKind::Template => 0,
            TemplateKind::OptionsTemplate => {
                let scope = read_u16(buf, 4)?;
                if scope == 0 {
                    return Err(DecodeError::template(
                        "options template scope field count is zero",
                    ));
                }
                if scope > field_count {
                    return Err(DecodeError::template(format!(
                        "scope field count {scope} exceeds field count {field_count}"
                    )));
                }
                scope
            }
        };

        let mut fields = Vec::with_capacity(field_count as usize);
        let mut offset = header_len;
        let mut fixed_length: u32 = 0;
        let mut min_length: u32 = 0;
        let mut variable = false;

        for _ in 0..field_count {
            if offset + FIELD_SPEC_LEN > buf.len() {
                return Err(DecodeError::template(format!(
                    "field specifier at {offset} overruns set"
                )));
            }
            let raw_id = read_u16(buf, offset)?;
            let length = read_u16(buf, offset + 2)?;
            offset += FIELD_SPEC_LEN;

            let enterprise_number = if raw_id & 0x8000 != 0 {
                if offset + ENTERPRISE_NUM_LEN > buf.len() {
                    return Err(DecodeError::template(format!(
                        "enterprise number at {offset} overruns set"
                    )));
                }
                let en = read_u32(buf, offset)?;
                offset += ENTERPRISE_NUM_LEN;
                Some(en)
            } else {
                None
            };

            if length == VARIABLE_LENGTH {
                variable = true;
                min_length += 1; // shortest encoding: 1-byte length prefix
            } else {
                fixed_length += u32::from(length);
                min_length += u32::from(length);
            }

            fields.push(FieldSpecifier {
                ie_id: raw_id & 0x7FFF,
                length,
                enterprise_number,
            });
        }

        if fixed_length > u32::from(u16::MAX) || min_length > u32::from(u16::MAX) {
            return Err(DecodeError::template(format!(
                "record length {fixed_length} exceeds 65535"
            )));
        }

        let template = Self {
            id,
            kind,
            scope_field_count,
            fields,
            fixed_record_length: if variable {
                None
            } else {
                Some(fixed_length as u16)
            },
            min_record_length: min_length as u16,
            references: AtomicU32::new(0),
            withdrawn: AtomicBool::new(false),
            last_refresh: AtomicU64::new(0),
            last_message: AtomicU32::new(0),
        };
        Ok((template, offset))
    }

    /// Template ID this schema is announced under
    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Template kind
    #[inline]
    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Whether this is an Options Template
    #[inline]
    pub fn is_options(&self) -> bool {
        self.kind == TemplateKind::OptionsTemplate
    }

    /// Number of leading scope fields (zero for ordinary Templates)
    #[inline]
    pub fn scope_field_count(&self) -> u16 {
        self.scope_field_count
    }

    /// Total number of fields including scope fields
    #[inline]
    pub fn field_count(&self) -> u16 {
        self.fields.len() as u16
    }

    /// Ordered field specifiers
    #[inline]
    pub fn fields(&self) -> &[FieldSpecifier] {
        &self.fields
    }

    /// Fixed Data Record length, or `None` when a field is variable-length
    #[inline]
    pub fn fixed_record_length(&self) -> Option<u16> {
        self.fixed_record_length
    }

    /// Whether any field uses the variable-length encoding
    #[inline]
    pub fn has_variable_length(&self) -> bool {
        self.fixed_record_length.is_none()
    }

    /// Shortest Data Record this Template can describe
    #[inline]
    pub fn min_record_length(&self) -> u16 {
        self.min_record_length
    }

    /// Whether this Template describes the same field layout as `other`
    ///
    /// Identity (Template ID) is excluded: content equality is what matters
    /// for refresh dedup and content-addressed reuse.
    pub fn same_layout(&self, other: &Template) -> bool {
        self.kind == other.kind
            && self.scope_field_count == other.scope_field_count
            && self.fields == other.fields
    }

    // =========================================================================
    // Reference counting and lifecycle
    // =========================================================================

    /// Current number of in-flight references
    #[inline]
    pub fn references(&self) -> u32 {
        self.references.load(Ordering::Acquire)
    }

    /// Record one more in-flight Data Record/Message pointing here
    #[inline]
    pub fn reference_inc(&self) {
        self.references.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one in-flight reference, returning the remaining count
    ///
    /// Driving the count below zero is a caller bug; in debug builds it
    /// asserts, in release builds the count saturates at zero.
    pub fn reference_dec(&self) -> u32 {
        let prev = self.references.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "template reference count underflow");
        if prev == 0 {
            self.references.store(0, Ordering::Release);
            0
        } else {
            prev - 1
        }
    }

    /// Mark this Template withdrawn or superseded
    #[inline]
    pub fn withdraw(&self) {
        self.withdrawn.store(true, Ordering::Release);
    }

    /// Whether this Template has been withdrawn or superseded
    #[inline]
    pub fn is_withdrawn(&self) -> bool {
        self.withdrawn.load(Ordering::Acquire)
    }

    // =========================================================================
    // UDP refresh bookkeeping
    // =========================================================================

    /// Record a (re)transmission of this Template over UDP
    pub fn touch(&self, now_unix_secs: u64, message_counter: u32) {
        self.last_refresh.store(now_unix_secs, Ordering::Release);
        self.last_message.store(message_counter, Ordering::Release);
    }

    /// UNIX time of the last transmission (0 when never touched)
    #[inline]
    pub fn last_refresh_secs(&self) -> u64 {
        self.last_refresh.load(Ordering::Acquire)
    }

    /// Message counter at the last transmission
    #[inline]
    pub fn last_message(&self) -> u32 {
        self.last_message.load(Ordering::Acquire)
    }

    /// Whether the UDP refresh lifetime has elapsed
    pub fn expired(&self, lifetime_secs: u64, now_unix_secs: u64) -> bool {
        let last = self.last_refresh_secs();
        last != 0 && now_unix_secs.saturating_sub(last) > lifetime_secs
    }
}
