//! Raw wire layout: bounds-checked big-endian reads, message and set headers
//!
//! Every structure here is a plain view over packet bytes. Parsing validates
//! the fixed-size layout only; semantic checks (version, length consistency
//! against the buffer) belong to the decoder.

use crate::{DecodeError, HEADER_LENGTH, Result, SET_HEADER_LENGTH};

#[inline]
pub(crate) fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    buf.get(offset)
        .copied()
        .ok_or_else(|| DecodeError::too_short(offset + 1, buf.len()))
}

#[inline]
pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > buf.len() {
        return Err(DecodeError::too_short(offset + 2, buf.len()));
    }
    Ok(u16::from_be_bytes([buf[offset], buf[offset + 1]]))
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > buf.len() {
        return Err(DecodeError::too_short(offset + 4, buf.len()));
    }
    Ok(u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

/// IPFIX message header (RFC 7011 §3.1), 16 octets on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Protocol version, must be 10
    pub version: u16,
    /// Total message length in octets, including this header
    pub length: u16,
    /// Export timestamp (seconds since UNIX epoch)
    pub export_time: u32,
    /// Running count of Data Records exported on this stream
    pub sequence_number: u32,
    /// Observation Domain ID partitioning the exporter's streams
    pub observation_domain_id: u32,
}

impl MessageHeader {
    /// Parse a message header from the start of `buf`
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LENGTH {
            return Err(DecodeError::too_short(HEADER_LENGTH, buf.len()));
        }
        Ok(Self {
            version: read_u16(buf, 0)?,
            length: read_u16(buf, 2)?,
            export_time: read_u32(buf, 4)?,
            sequence_number: read_u32(buf, 8)?,
            observation_domain_id: read_u32(buf, 12)?,
        })
    }

    /// Serialize the header into a 16-byte array (used by stages that
    /// construct new messages)
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut out = [0u8; HEADER_LENGTH];
        out[0..2].copy_from_slice(&self.version.to_be_bytes());
        out[2..4].copy_from_slice(&self.length.to_be_bytes());
        out[4..8].copy_from_slice(&self.export_time.to_be_bytes());
        out[8..12].copy_from_slice(&self.sequence_number.to_be_bytes());
        out[12..16].copy_from_slice(&self.observation_domain_id.to_be_bytes());
        out
    }
}

/// Set header (RFC 7011 §3.3.2), 4 octets on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetHeader {
    /// 2 = Template Set, 3 = Options Template Set, >= 256 = Data Set
    pub set_id: u16,
    /// Total set length in octets, including this header
    pub length: u16,
}

impl SetHeader {
    /// Parse a set header at `offset` into `buf`
    pub fn parse(buf: &[u8], offset: usize) -> Result<Self> {
        if offset + SET_HEADER_LENGTH > buf.len() {
            return Err(DecodeError::too_short(offset + SET_HEADER_LENGTH, buf.len()));
        }
        Ok(Self {
            set_id: read_u16(buf, offset)?,
            length: read_u16(buf, offset + 2)?,
        })
    }

    /// Serialize the set header into a 4-byte array
    pub fn to_bytes(&self) -> [u8; SET_HEADER_LENGTH] {
        let mut out = [0u8; SET_HEADER_LENGTH];
        out[0..2].copy_from_slice(&self.set_id.to_be_bytes());
        out[2..4].copy_from_slice(&self.length.to_be_bytes());
        out
    }
}
