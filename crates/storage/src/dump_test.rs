use std::io::Read;
use std::sync::Arc;

use flowcol_protocol::{
    decode, Bytes, SourceInfo, SourceStatus, Template, TemplateKind, Transport, DEFAULT_MAX_SETS,
    IPFIX_VERSION,
};

use crate::{DumpStorage, NullStorage, StoragePlugin};

fn data_packet(odid: u32, template_id: u16, payload: &[u8]) -> Bytes {
    let total = 16 + 4 + payload.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&IPFIX_VERSION.to_be_bytes());
    out.extend_from_slice(&(total as u16).to_be_bytes());
    out.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&odid.to_be_bytes());
    out.extend_from_slice(&template_id.to_be_bytes());
    out.extend_from_slice(&((4 + payload.len()) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Bytes::from(out)
}

fn ipv4_pair_template(id: u16) -> Arc<Template> {
    // sourceIPv4Address(8,4), destinationIPv4Address(12,4)
    let mut record = Vec::new();
    record.extend_from_slice(&id.to_be_bytes());
    record.extend_from_slice(&2u16.to_be_bytes());
    for (ie, len) in [(8u16, 4u16), (12, 4)] {
        record.extend_from_slice(&ie.to_be_bytes());
        record.extend_from_slice(&len.to_be_bytes());
    }
    Arc::new(Template::parse(&record, TemplateKind::Template).unwrap().0)
}

fn resolved_message(template: &Arc<Template>, payload: &[u8]) -> Arc<flowcol_protocol::Message> {
    let source = SourceInfo::new("192.0.2.1:4739".parse().unwrap(), Transport::Udp);
    let mut msg = decode(
        data_packet(7, template.id(), payload),
        source,
        SourceStatus::Open,
        DEFAULT_MAX_SETS,
    )
    .unwrap();
    for couple in msg.data_couples_mut() {
        template.reference_inc();
        couple.template = Some(Arc::clone(template));
    }
    Arc::new(msg)
}

#[test]
fn dump_writes_header_and_field_values() {
    let template = ipv4_pair_template(256);
    let msg = resolved_message(&template, &[192, 0, 2, 1, 198, 51, 100, 2]);

    let file = tempfile::NamedTempFile::new().unwrap();
    let mut dump = DumpStorage::new(Box::new(file.reopen().unwrap()));
    dump.process(&msg).unwrap();
    dump.close().unwrap();

    let mut text = String::new();
    file.reopen().unwrap().read_to_string(&mut text).unwrap();
    assert!(text.contains("message odid=7"));
    assert!(text.contains("record template=256"));
    assert!(text.contains("8=0xc0000201"));
    assert!(text.contains("12=0xc6336402"));

    assert_eq!(dump.snapshot().messages_stored, 1);
    assert_eq!(dump.snapshot().records_written, 1);
}

#[test]
fn dump_notes_template_less_sets() {
    let source = SourceInfo::new("192.0.2.1:4739".parse().unwrap(), Transport::Udp);
    let msg = Arc::new(
        decode(
            data_packet(7, 999, &[1, 2, 3, 4]),
            source,
            SourceStatus::Open,
            DEFAULT_MAX_SETS,
        )
        .unwrap(),
    );

    let file = tempfile::NamedTempFile::new().unwrap();
    let mut dump = DumpStorage::new(Box::new(file.reopen().unwrap()));
    dump.process(&msg).unwrap();
    dump.close().unwrap();

    let mut text = String::new();
    file.reopen().unwrap().read_to_string(&mut text).unwrap();
    assert!(text.contains("no template"));
    assert_eq!(dump.snapshot().records_written, 0);
}

#[test]
fn null_counts_decodable_records() {
    let template = ipv4_pair_template(256);
    let msg = resolved_message(&template, &[0u8; 24]); // 3 records of 8 bytes

    let mut null = NullStorage::new();
    null.process(&msg).unwrap();
    null.close().unwrap();

    let snap = null.snapshot();
    assert_eq!(snap.messages_received, 1);
    assert_eq!(snap.records_written, 3);
}
