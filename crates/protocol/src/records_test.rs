use crate::testpkt::template_record;
use crate::{
    field_location, record_length, DataRecords, Template, TemplateKind, TemplateRecords,
    VARIABLE_LENGTH,
};

fn fixed_template() -> Template {
    // sourceIPv4Address(8,4), destinationIPv4Address(12,4)
    let record = template_record(256, &[(8, 4, None), (12, 4, None)]);
    Template::parse(&record, TemplateKind::Template).unwrap().0
}

fn variable_template() -> Template {
    // sourceIPv4Address(8,4), httpRequestHost(var), octetDeltaCount(1,2)
    let record = template_record(
        257,
        &[(8, 4, None), (459, VARIABLE_LENGTH, None), (1, 2, None)],
    );
    Template::parse(&record, TemplateKind::Template).unwrap().0
}

#[test]
fn record_length_fixed() {
    let t = fixed_template();
    let record = [0u8; 8];
    assert_eq!(record_length(&record, &t).unwrap(), 8);
}

#[test]
fn record_length_short_variable_prefix() {
    let t = variable_template();
    // 4 fixed + [prefix=3, "abc"] + 2 fixed
    let mut record = vec![10, 0, 0, 1];
    record.push(3);
    record.extend_from_slice(b"abc");
    record.extend_from_slice(&[0, 42]);
    assert_eq!(record_length(&record, &t).unwrap(), 10);
}

#[test]
fn record_length_long_variable_prefix() {
    let t = variable_template();
    // prefix byte 255 means the real length follows as big-endian u16
    let mut record = vec![10, 0, 0, 1];
    record.push(255);
    record.extend_from_slice(&300u16.to_be_bytes());
    record.extend_from_slice(&[0u8; 300]);
    record.extend_from_slice(&[0, 42]);
    assert_eq!(record_length(&record, &t).unwrap(), 4 + 3 + 300 + 2);
}

#[test]
fn record_length_variable_prefix_boundaries() {
    let t = variable_template();

    // 254 is the largest length the 1-byte prefix can carry
    let mut record = vec![10, 0, 0, 1];
    record.push(254);
    record.extend_from_slice(&[0u8; 254]);
    record.extend_from_slice(&[0, 42]);
    assert_eq!(record_length(&record, &t).unwrap(), 4 + 1 + 254 + 2);

    // 255 must switch to the 3-byte encoding
    let mut record = vec![10, 0, 0, 1];
    record.push(255);
    record.extend_from_slice(&255u16.to_be_bytes());
    record.extend_from_slice(&[0u8; 255]);
    record.extend_from_slice(&[0, 42]);
    assert_eq!(record_length(&record, &t).unwrap(), 4 + 3 + 255 + 2);

    // 65535 is the maximal encodable length
    let mut record = vec![10, 0, 0, 1];
    record.push(255);
    record.extend_from_slice(&u16::MAX.to_be_bytes());
    record.extend_from_slice(&vec![0u8; u16::MAX as usize]);
    record.extend_from_slice(&[0, 42]);
    assert_eq!(record_length(&record, &t).unwrap(), 4 + 3 + 65535 + 2);
}

#[test]
fn record_length_truncated_variable() {
    let t = variable_template();
    // cut off before the length prefix
    let record = vec![10, 0, 0, 1];
    assert!(record_length(&record, &t).is_err());
}

#[test]
fn field_location_fixed() {
    let t = fixed_template();
    let record = [192, 0, 2, 1, 198, 51, 100, 2];

    let (off, len) = field_location(&record, &t, None, 12).unwrap().unwrap();
    assert_eq!((off, len), (4, 4));
    assert_eq!(&record[off..off + len], &[198, 51, 100, 2]);

    assert_eq!(field_location(&record, &t, None, 999).unwrap(), None);
    // enterprise must match too, not just the IE id
    assert_eq!(field_location(&record, &t, Some(29305), 8).unwrap(), None);
}

#[test]
fn field_location_past_variable_field() {
    let t = variable_template();
    let mut record = vec![10, 0, 0, 1];
    record.push(3);
    record.extend_from_slice(b"abc");
    record.extend_from_slice(&[0, 42]);

    // the variable field's value sits past its 1-byte prefix
    let (off, len) = field_location(&record, &t, None, 459).unwrap().unwrap();
    assert_eq!(&record[off..off + len], b"abc");

    // the field after it accounts for the variable encoding
    let (off, len) = field_location(&record, &t, None, 1).unwrap().unwrap();
    assert_eq!((off, len), (8, 2));
}

#[test]
fn data_records_fixed() {
    let t = fixed_template();
    let payload: Vec<u8> = (0u8..24).collect();
    let records: Vec<_> = DataRecords::new(&payload, &t)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0], &payload[0..8]);
    assert_eq!(records[2], &payload[16..24]);
}

#[test]
fn data_records_fixed_remainder_is_error() {
    let t = fixed_template();
    let payload = [0u8; 20]; // 2 records plus 4 stray bytes
    let mut it = DataRecords::new(&payload, &t);
    assert!(it.next().unwrap().is_ok());
    assert!(it.next().unwrap().is_ok());
    assert!(it.next().unwrap().is_err());
    assert!(it.next().is_none());
}

#[test]
fn data_records_variable() {
    let t = variable_template();
    let mut payload = Vec::new();
    // record 1: host "ab"
    payload.extend_from_slice(&[10, 0, 0, 1, 2]);
    payload.extend_from_slice(b"ab");
    payload.extend_from_slice(&[0, 1]);
    // record 2: empty host
    payload.extend_from_slice(&[10, 0, 0, 2, 0]);
    payload.extend_from_slice(&[0, 2]);

    let records: Vec<_> = DataRecords::new(&payload, &t)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].len(), 9);
    assert_eq!(records[1].len(), 7);
}

#[test]
fn data_records_variable_overrun_is_error() {
    let t = variable_template();
    // declares 200 octets of host data that are not there
    let mut payload = vec![10, 0, 0, 1];
    payload.push(200);
    payload.extend_from_slice(&[0u8; 10]);

    let mut it = DataRecords::new(&payload, &t);
    assert!(it.next().unwrap().is_err());
    assert!(it.next().is_none());
}

#[test]
fn template_records_walk() {
    let mut payload = template_record(256, &[(8, 4, None)]);
    payload.extend_from_slice(&template_record(257, &[(12, 4, None), (1, 8, None)]));

    let records: Vec<_> = TemplateRecords::new(&payload, TemplateKind::Template)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].template_id, 256);
    assert_eq!(records[0].field_count, 1);
    assert_eq!(records[1].template_id, 257);
    assert_eq!(records[1].field_count, 2);
    assert!(!records[0].is_withdrawal());
}

#[test]
fn template_records_withdrawal_is_four_bytes() {
    let mut payload = Vec::new();
    payload.extend_from_slice(&256u16.to_be_bytes());
    payload.extend_from_slice(&0u16.to_be_bytes());
    payload.extend_from_slice(&template_record(257, &[(8, 4, None)]));

    let records: Vec<_> = TemplateRecords::new(&payload, TemplateKind::Template)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].is_withdrawal());
    assert_eq!(records[0].bytes.len(), 4);
    assert_eq!(records[1].template_id, 257);
}

#[test]
fn template_records_stop_at_padding() {
    let mut payload = template_record(256, &[(8, 4, None)]);
    payload.extend_from_slice(&[0, 0]); // 2 bytes of padding

    let records: Vec<_> = TemplateRecords::new(&payload, TemplateKind::Template)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn template_records_stop_at_zero_header() {
    let mut payload = template_record(256, &[(8, 4, None)]);
    payload.extend_from_slice(&[0, 0, 0, 0]);

    let records: Vec<_> = TemplateRecords::new(&payload, TemplateKind::Template)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn template_records_truncated_is_error() {
    let mut payload = template_record(256, &[(8, 4, None), (12, 4, None)]);
    payload.truncate(payload.len() - 2);

    let mut it = TemplateRecords::new(&payload, TemplateKind::Template);
    assert!(it.next().unwrap().is_err());
    assert!(it.next().is_none());
}
