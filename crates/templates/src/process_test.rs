use std::sync::Arc;

use crate::testutil::{packet, tcp_source, template_record, udp_source, withdrawal_record};
use crate::{process_message, TemplateKey, TemplateManager, UDP_TEMPLATE_LIFETIME_SECS};
use flowcol_protocol::{decode, SourceStatus, DEFAULT_MAX_SETS, OPTIONS_TEMPLATE_SET_ID, TEMPLATE_SET_ID};

const NOW: u64 = 1_700_000_000;

fn decode_udp(odid: u32, seq: u32, sets: &[(u16, Vec<u8>)]) -> flowcol_protocol::Message {
    decode(packet(odid, seq, sets), udp_source(), SourceStatus::Open, DEFAULT_MAX_SETS).unwrap()
}

fn decode_tcp(odid: u32, seq: u32, sets: &[(u16, Vec<u8>)]) -> flowcol_protocol::Message {
    decode(packet(odid, seq, sets), tcp_source(), SourceStatus::Open, DEFAULT_MAX_SETS).unwrap()
}

#[test]
fn announcement_registers_template() {
    let m = TemplateManager::new();
    let mut msg = decode_udp(1, 0, &[(TEMPLATE_SET_ID, template_record(256, &[(8, 4, None)]))]);

    let summary = process_message(&m, &mut msg, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.added, 1);

    let key = TemplateKey::new(1, &udp_source());
    let t = m.get(&key, 256).unwrap();
    assert_eq!(t.field_count(), 1);
    // UDP announcements stamp the refresh markers
    assert_eq!(t.last_refresh_secs(), NOW);
}

#[test]
fn same_packet_announcement_resolves_data() {
    let m = TemplateManager::new();
    let mut msg = decode_udp(
        1,
        0,
        &[
            (TEMPLATE_SET_ID, template_record(256, &[(8, 4, None)])),
            (256, vec![192, 0, 2, 7]),
        ],
    );

    let summary = process_message(&m, &mut msg, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.unresolved, 0);
    assert!(!msg.has_unresolved_data());

    let couple = &msg.data_couples()[0];
    let template = couple.template.as_ref().unwrap();
    assert_eq!(template.references(), 1);
    assert_eq!(msg.set_payload(&couple.set), &[192, 0, 2, 7]);
}

#[test]
fn data_before_announcement_stays_unresolved() {
    let m = TemplateManager::new();
    let mut msg = decode_udp(1, 0, &[(256, vec![1, 2, 3, 4])]);

    let summary = process_message(&m, &mut msg, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.unresolved, 1);
    assert!(msg.has_unresolved_data());
    // the data set itself is retained
    assert_eq!(msg.data_couples().len(), 1);
}

#[test]
fn refresh_does_not_churn() {
    let m = TemplateManager::new();
    let record = template_record(256, &[(8, 4, None)]);

    let mut first = decode_udp(1, 0, &[(TEMPLATE_SET_ID, record.clone())]);
    process_message(&m, &mut first, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    let key = TemplateKey::new(1, &udp_source());
    let original = m.get(&key, 256).unwrap();

    let mut refresh = decode_udp(1, 5, &[(TEMPLATE_SET_ID, record)]);
    let summary = process_message(&m, &mut refresh, NOW + 100, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.refreshed, 1);
    assert_eq!(summary.superseded, 0);

    let after = m.get(&key, 256).unwrap();
    assert!(Arc::ptr_eq(&original, &after));
    // refresh markers advance even without a layout change
    assert_eq!(after.last_refresh_secs(), NOW + 100);
    assert_eq!(after.last_message(), 5);
}

#[test]
fn changed_template_supersedes_but_messages_keep_old() {
    let m = TemplateManager::new();
    let mut first = decode_udp(
        1,
        0,
        &[
            (TEMPLATE_SET_ID, template_record(256, &[(8, 4, None)])),
            (256, vec![1, 2, 3, 4]),
        ],
    );
    process_message(&m, &mut first, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    let old = Arc::clone(first.data_couples()[0].template.as_ref().unwrap());

    let mut second = decode_udp(
        1,
        1,
        &[(TEMPLATE_SET_ID, template_record(256, &[(8, 4, None), (12, 4, None)]))],
    );
    let summary = process_message(&m, &mut second, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.superseded, 1);

    // The first message still decodes against the version it resolved.
    assert!(old.is_withdrawn());
    assert_eq!(old.references(), 1);
    assert_eq!(old.field_count(), 1);

    // Dropping the message releases the last reference.
    drop(first);
    assert_eq!(old.references(), 0);
}

#[test]
fn tcp_withdrawal_removes_template() {
    let m = TemplateManager::new();
    let mut announce = decode_tcp(1, 0, &[(TEMPLATE_SET_ID, template_record(256, &[(8, 4, None)]))]);
    process_message(&m, &mut announce, NOW, UDP_TEMPLATE_LIFETIME_SECS);

    let mut withdraw = decode_tcp(1, 1, &[(TEMPLATE_SET_ID, withdrawal_record(256))]);
    let summary = process_message(&m, &mut withdraw, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.withdrawn, 1);

    let key = TemplateKey::new(1, &tcp_source());
    assert!(m.get(&key, 256).is_none());
}

#[test]
fn tcp_withdraw_all_uses_reserved_id() {
    let m = TemplateManager::new();
    let mut announce = decode_tcp(
        1,
        0,
        &[
            (TEMPLATE_SET_ID, template_record(256, &[(8, 4, None)])),
            (TEMPLATE_SET_ID, template_record(257, &[(12, 4, None)])),
        ],
    );
    process_message(&m, &mut announce, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(m.active_count(), 2);

    // Template ID 2 with field count 0 withdraws all ordinary templates.
    let mut withdraw = decode_tcp(1, 1, &[(TEMPLATE_SET_ID, withdrawal_record(TEMPLATE_SET_ID))]);
    process_message(&m, &mut withdraw, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(m.active_count(), 0);
}

#[test]
fn udp_withdrawal_is_ignored() {
    let m = TemplateManager::new();
    let mut announce = decode_udp(1, 0, &[(TEMPLATE_SET_ID, template_record(256, &[(8, 4, None)]))]);
    process_message(&m, &mut announce, NOW, UDP_TEMPLATE_LIFETIME_SECS);

    let mut withdraw = decode_udp(1, 1, &[(TEMPLATE_SET_ID, withdrawal_record(256))]);
    let summary = process_message(&m, &mut withdraw, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.withdrawn, 0);

    let key = TemplateKey::new(1, &udp_source());
    assert!(m.get(&key, 256).is_some());
}

#[test]
fn options_template_set_registers_options_template() {
    let m = TemplateManager::new();
    let mut record = Vec::new();
    record.extend_from_slice(&300u16.to_be_bytes());
    record.extend_from_slice(&2u16.to_be_bytes());
    record.extend_from_slice(&1u16.to_be_bytes()); // scope field count
    record.extend_from_slice(&149u16.to_be_bytes());
    record.extend_from_slice(&4u16.to_be_bytes());
    record.extend_from_slice(&41u16.to_be_bytes());
    record.extend_from_slice(&8u16.to_be_bytes());

    let mut msg = decode_udp(1, 0, &[(OPTIONS_TEMPLATE_SET_ID, record)]);
    let summary = process_message(&m, &mut msg, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.added, 1);

    let key = TemplateKey::new(1, &udp_source());
    let t = m.get(&key, 300).unwrap();
    assert!(t.is_options());
    assert_eq!(t.scope_field_count(), 1);
}

#[test]
fn closed_session_drops_source_templates() {
    let m = TemplateManager::new();
    let mut announce = decode_tcp(1, 0, &[(TEMPLATE_SET_ID, template_record(256, &[(8, 4, None)]))]);
    process_message(&m, &mut announce, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(m.active_count(), 1);

    let mut close = decode(
        packet(1, 1, &[]),
        tcp_source(),
        SourceStatus::Closed,
        DEFAULT_MAX_SETS,
    )
    .unwrap();
    process_message(&m, &mut close, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(m.active_count(), 0);
}

#[test]
fn reserved_template_id_is_skipped() {
    let m = TemplateManager::new();
    // template id 100 is below the data-set range
    let mut msg = decode_udp(1, 0, &[(TEMPLATE_SET_ID, template_record(100, &[(8, 4, None)]))]);
    let summary = process_message(&m, &mut msg, NOW, UDP_TEMPLATE_LIFETIME_SECS);
    assert_eq!(summary.added, 0);
    assert_eq!(m.active_count(), 0);
}
