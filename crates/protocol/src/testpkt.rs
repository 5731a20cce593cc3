//! Test helpers for building IPFIX packets byte by byte

use bytes::Bytes;

use crate::source::{SourceInfo, Transport};
use crate::{HEADER_LENGTH, IPFIX_VERSION, OPTIONS_TEMPLATE_SET_ID, TEMPLATE_SET_ID};

/// Builds a complete IPFIX message with a correct length field
pub(crate) struct PacketBuilder {
    version: u16,
    export_time: u32,
    sequence_number: u32,
    odid: u32,
    sets: Vec<(u16, Vec<u8>)>,
}

impl PacketBuilder {
    pub(crate) fn new(odid: u32) -> Self {
        Self {
            version: IPFIX_VERSION,
            export_time: 1_700_000_000,
            sequence_number: 0,
            odid,
            sets: Vec::new(),
        }
    }

    pub(crate) fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn sequence(mut self, seq: u32) -> Self {
        self.sequence_number = seq;
        self
    }

    pub(crate) fn template_set(self, records: Vec<u8>) -> Self {
        self.raw_set(TEMPLATE_SET_ID, records)
    }

    pub(crate) fn options_template_set(self, records: Vec<u8>) -> Self {
        self.raw_set(OPTIONS_TEMPLATE_SET_ID, records)
    }

    pub(crate) fn data_set(self, template_id: u16, payload: Vec<u8>) -> Self {
        self.raw_set(template_id, payload)
    }

    pub(crate) fn raw_set(mut self, set_id: u16, payload: Vec<u8>) -> Self {
        self.sets.push((set_id, payload));
        self
    }

    pub(crate) fn build(self) -> Bytes {
        let total = HEADER_LENGTH + self.sets.iter().map(|(_, p)| 4 + p.len()).sum::<usize>();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&(total as u16).to_be_bytes());
        out.extend_from_slice(&self.export_time.to_be_bytes());
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
        out.extend_from_slice(&self.odid.to_be_bytes());
        for (set_id, payload) in self.sets {
            out.extend_from_slice(&set_id.to_be_bytes());
            out.extend_from_slice(&((4 + payload.len()) as u16).to_be_bytes());
            out.extend_from_slice(&payload);
        }
        Bytes::from(out)
    }
}

/// One Template Record: header plus field specifiers
///
/// Fields are `(ie_id, length, enterprise_number)`; the enterprise flag bit
/// is set automatically when an enterprise number is given.
pub(crate) fn template_record(id: u16, fields: &[(u16, u16, Option<u32>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    push_fields(&mut out, fields);
    out
}

/// One Options Template Record with the given scope field count
pub(crate) fn options_template_record(
    id: u16,
    scope_count: u16,
    fields: &[(u16, u16, Option<u32>)],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    out.extend_from_slice(&scope_count.to_be_bytes());
    push_fields(&mut out, fields);
    out
}

/// A withdrawal record for one Template ID (field count zero)
pub(crate) fn withdrawal_record(id: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out
}

fn push_fields(out: &mut Vec<u8>, fields: &[(u16, u16, Option<u32>)]) {
    for &(ie_id, length, enterprise) in fields {
        let raw_id = if enterprise.is_some() {
            ie_id | 0x8000
        } else {
            ie_id
        };
        out.extend_from_slice(&raw_id.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        if let Some(en) = enterprise {
            out.extend_from_slice(&en.to_be_bytes());
        }
    }
}

/// A UDP exporter at a fixed address
pub(crate) fn udp_source() -> SourceInfo {
    SourceInfo::new("192.0.2.1:4739".parse().unwrap(), Transport::Udp)
}

/// A TCP exporter at a fixed address
pub(crate) fn tcp_source() -> SourceInfo {
    SourceInfo::new("192.0.2.2:4739".parse().unwrap(), Transport::Tcp)
}
