//! Record accessors - walking Data Sets and Template Sets
//!
//! Data Records carry no self-description: their layout comes entirely from
//! the Template. These accessors reproduce the RFC 7011 variable-length
//! encoding exactly - a field declared 0xFFFF stores its true length in a
//! 1-byte prefix (0..=254), or, when that prefix is 255, in the following
//! big-endian u16 (so a variable field occupies `1 + len` or `3 + len`
//! octets).
//!
//! Iteration terminates exactly at the Set's declared length; a record that
//! computes to zero length aborts with `MalformedMessage` instead of looping
//! forever.

use crate::template::Template;
use crate::wire::{read_u8, read_u16};
use crate::{DecodeError, Result, TemplateKind, WITHDRAWAL_RECORD_LENGTH};

/// Compute the true length of one Data Record described by `template`
///
/// For templates without variable-length fields this is the fixed record
/// length. Otherwise the record is walked field by field, consuming the
/// 1-byte or 3-byte length prefixes of variable fields.
pub fn record_length(record: &[u8], template: &Template) -> Result<usize> {
    if let Some(fixed) = template.fixed_record_length() {
        return Ok(fixed as usize);
    }

    let mut offset = 0usize;
    for field in template.fields() {
        if field.is_variable() {
            let prefix = read_u8(record, offset)?;
            offset += 1;
            let len = if prefix == 255 {
                let real = read_u16(record, offset)?;
                offset += 2;
                real as usize
            } else {
                prefix as usize
            };
            offset += len;
        } else {
            offset += field.length as usize;
        }
    }

    if offset == 0 {
        return Err(DecodeError::message("zero-length data record"));
    }
    Ok(offset)
}

/// Locate a field's value inside one Data Record
///
/// Returns `(offset, length)` of the value bytes (for variable-length
/// fields the offset is past the length prefix), or `None` when the
/// Template does not carry that Information Element.
pub fn field_location(
    record: &[u8],
    template: &Template,
    enterprise_number: Option<u32>,
    ie_id: u16,
) -> Result<Option<(usize, usize)>> {
    let mut offset = 0usize;
    for field in template.fields() {
        let (value_offset, value_len) = if field.is_variable() {
            let prefix = read_u8(record, offset)?;
            offset += 1;
            let len = if prefix == 255 {
                let real = read_u16(record, offset)?;
                offset += 2;
                real as usize
            } else {
                prefix as usize
            };
            let at = offset;
            offset += len;
            (at, len)
        } else {
            let at = offset;
            offset += field.length as usize;
            (at, field.length as usize)
        };

        if field.ie_id == ie_id && field.enterprise_number == enterprise_number {
            return Ok(Some((value_offset, value_len)));
        }
    }
    Ok(None)
}

/// Iterator over the Data Records of one Data Set payload
///
/// Yields each record as a byte slice. For fixed-length templates the Set
/// payload must divide exactly into records; a remainder yields
/// `MalformedMessage`. For variable-length templates iteration stops once
/// fewer than the minimum record length remains.
pub struct DataRecords<'a> {
    payload: &'a [u8],
    template: &'a Template,
    offset: usize,
    failed: bool,
}

impl<'a> DataRecords<'a> {
    /// Iterate the records of `payload` against `template`
    pub fn new(payload: &'a [u8], template: &'a Template) -> Self {
        Self {
            payload,
            template,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for DataRecords<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let remaining = self.payload.len() - self.offset;

        if let Some(fixed) = self.template.fixed_record_length() {
            let fixed = fixed as usize;
            if remaining == 0 {
                return None;
            }
            if fixed == 0 || remaining < fixed {
                // Trailing bytes that cannot form a record.
                self.failed = true;
                return Some(Err(DecodeError::message(format!(
                    "data set payload leaves {remaining} bytes, record length is {fixed}"
                ))));
            }
            let record = &self.payload[self.offset..self.offset + fixed];
            self.offset += fixed;
            return Some(Ok(record));
        }

        if remaining < self.template.min_record_length() as usize {
            return None;
        }

        let record_start = &self.payload[self.offset..];
        match record_length(record_start, self.template) {
            Ok(len) => {
                if len == 0 || self.offset + len > self.payload.len() {
                    self.failed = true;
                    return Some(Err(DecodeError::message(format!(
                        "variable-length record of {len} bytes overruns set"
                    ))));
                }
                let record = &self.payload[self.offset..self.offset + len];
                self.offset += len;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// One raw (Options) Template Record inside a Template Set
#[derive(Debug, Clone, Copy)]
pub struct TemplateRecordRef<'a> {
    /// Exact record bytes (header plus field specifiers)
    pub bytes: &'a [u8],
    /// Template ID the record announces or withdraws
    pub template_id: u16,
    /// Declared field count (0 for a withdrawal)
    pub field_count: u16,
}

impl TemplateRecordRef<'_> {
    /// Whether this record withdraws its Template ID
    #[inline]
    pub fn is_withdrawal(&self) -> bool {
        self.field_count == 0
    }
}

/// Iterator over the (Options) Template Records of one Template Set payload
///
/// Yields raw record slices; callers parse non-withdrawal records with
/// `Template::parse`. Iteration stops at trailing padding (fewer than 4
/// bytes, or an all-zero record header).
pub struct TemplateRecords<'a> {
    payload: &'a [u8],
    kind: TemplateKind,
    offset: usize,
    failed: bool,
}

impl<'a> TemplateRecords<'a> {
    /// Iterate the records of a Template Set payload
    pub fn new(payload: &'a [u8], kind: TemplateKind) -> Self {
        Self {
            payload,
            kind,
            offset: 0,
            failed: false,
        }
    }

    /// Octets one record occupies, starting at `buf[0]`
    fn record_span(&self, buf: &[u8]) -> Result<usize> {
        let field_count = read_u16(buf, 2)?;
        if field_count == 0 {
            return Ok(WITHDRAWAL_RECORD_LENGTH);
        }

        let mut offset = match self.kind {
            TemplateKind::Template => 4,
            TemplateKind::OptionsTemplate => 6,
        };
        if offset > buf.len() {
            return Err(DecodeError::template("record header overruns set"));
        }
        for _ in 0..field_count {
            if offset + 4 > buf.len() {
                return Err(DecodeError::template("field specifier overruns set"));
            }
            let raw_id = read_u16(buf, offset)?;
            offset += 4;
            if raw_id & 0x8000 != 0 {
                if offset + 4 > buf.len() {
                    return Err(DecodeError::template("enterprise number overruns set"));
                }
                offset += 4;
            }
        }
        Ok(offset)
    }
}

impl<'a> Iterator for TemplateRecords<'a> {
    type Item = Result<TemplateRecordRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let remaining = &self.payload[self.offset..];
        if remaining.len() < 4 {
            return None;
        }
        // All-zero header is padding, not a withdrawal of template 0.
        if remaining[..4] == [0, 0, 0, 0] {
            return None;
        }

        match self.record_span(remaining) {
            Ok(span) => {
                let template_id = read_u16(remaining, 0).ok()?;
                let field_count = read_u16(remaining, 2).ok()?;
                let record = TemplateRecordRef {
                    bytes: &remaining[..span],
                    template_id,
                    field_count,
                };
                self.offset += span;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
