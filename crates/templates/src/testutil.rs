//! Shared helpers for registry tests: packet and record builders

use flowcol_protocol::{Bytes, SourceInfo, Template, TemplateKind, Transport, IPFIX_VERSION};

/// One Template Record; fields are `(ie_id, length, enterprise_number)`
pub(crate) fn template_record(id: u16, fields: &[(u16, u16, Option<u32>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for &(ie_id, length, enterprise) in fields {
        let raw_id = if enterprise.is_some() { ie_id | 0x8000 } else { ie_id };
        out.extend_from_slice(&raw_id.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        if let Some(en) = enterprise {
            out.extend_from_slice(&en.to_be_bytes());
        }
    }
    out
}

/// A withdrawal record (field count 0)
pub(crate) fn withdrawal_record(id: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out
}

/// A parsed Template ready for manager insertion
pub(crate) fn parse_template(id: u16, fields: &[(u16, u16, Option<u32>)]) -> Template {
    Template::parse(&template_record(id, fields), TemplateKind::Template)
        .unwrap()
        .0
}

/// Assemble a full IPFIX message from `(set_id, payload)` pairs
pub(crate) fn packet(odid: u32, seq: u32, sets: &[(u16, Vec<u8>)]) -> Bytes {
    let total = 16 + sets.iter().map(|(_, p)| 4 + p.len()).sum::<usize>();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&IPFIX_VERSION.to_be_bytes());
    out.extend_from_slice(&(total as u16).to_be_bytes());
    out.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(&odid.to_be_bytes());
    for (set_id, payload) in sets {
        out.extend_from_slice(&set_id.to_be_bytes());
        out.extend_from_slice(&((4 + payload.len()) as u16).to_be_bytes());
        out.extend_from_slice(payload);
    }
    Bytes::from(out)
}

pub(crate) fn udp_source() -> SourceInfo {
    SourceInfo::new("192.0.2.1:4739".parse().unwrap(), Transport::Udp)
}

pub(crate) fn tcp_source() -> SourceInfo {
    SourceInfo::new("192.0.2.2:4739".parse().unwrap(), Transport::Tcp)
}
