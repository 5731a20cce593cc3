//! Domain join - merge Observation Domains into one synthetic domain
//!
//! Exporters partition their streams by Observation Domain ID, and template
//! spaces are independent per domain. Merging several domains into one
//! therefore needs Template remapping: Template 256 of domain 5 and
//! Template 256 of domain 9 describe different records and cannot both be
//! 256 downstream.
//!
//! For every distinct incoming Template the stage either reuses an existing
//! synthesized Template whose layout is byte-identical (content-addressed,
//! avoids Template-ID explosion when many domains export the same schema) or
//! synthesizes a new Template ID from the registry's allocator. Either way a
//! provenance field (IE 405, 4 octets, the original ODID) is appended, so
//! records stay attributable after the merge.
//!
//! Mappings carry a reference count: one per `(original domain, original
//! Template ID)` pair mapped onto the synthesized Template. Withdrawing the
//! last mapping withdraws the synthesized Template downstream and returns
//! its ID to the allocator's free-list.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use flowcol_protocol::{
    decode, DataRecords, Message, SourceInfo, SourceStatus, Template, TemplateKind,
    TemplateRecords, DEFAULT_MAX_SETS, HEADER_LENGTH, IPFIX_VERSION, MIN_DATA_SET_ID,
    OPTIONS_TEMPLATE_SET_ID, SET_HEADER_LENGTH, TEMPLATE_SET_ID,
};
use flowcol_templates::TemplateManager;

use crate::{Transform, TransformError, Verdict};

/// IE appended to every synthesized Template: the original ODID, 4 octets
pub const ORIGINAL_ODID_FIELD: u16 = 405;

/// Hard ceiling from the u16 length field of the message header
const MAX_MESSAGE_LENGTH: usize = u16::MAX as usize;

/// Largest set payload that still fits a message on its own
const MAX_SET_PAYLOAD: usize = MAX_MESSAGE_LENGTH - HEADER_LENGTH - SET_HEADER_LENGTH;

/// One synthesized Template announced under the target domain
struct SynthEntry {
    template: Arc<Template>,
    /// Announcement record bytes (synthesized ID, original fields, IE 405)
    record: Vec<u8>,
    /// Content key shared by every original layout mapped here
    content: Vec<u8>,
    /// Number of `(original domain, original Template ID)` mappings
    references: u32,
}

/// Template records collected for the output, per set kind
///
/// Payloads are chunked at `MAX_SET_PAYLOAD`, so every chunk becomes a set
/// that fits a single message.
#[derive(Default)]
struct OutRecords {
    plain: Vec<Vec<u8>>,
    options: Vec<Vec<u8>>,
}

impl OutRecords {
    fn push(&mut self, kind: TemplateKind, record: &[u8]) {
        let chunks = match kind {
            TemplateKind::Template => &mut self.plain,
            TemplateKind::OptionsTemplate => &mut self.options,
        };
        match chunks.last_mut() {
            Some(last) if last.len() + record.len() <= MAX_SET_PAYLOAD => {
                last.extend_from_slice(record)
            }
            _ => chunks.push(record.to_vec()),
        }
    }

    fn is_empty(&self) -> bool {
        self.plain.is_empty() && self.options.is_empty()
    }
}

/// Transform stage merging all incoming Observation Domains into one
pub struct DomainJoin {
    to_odid: u32,
    manager: Arc<TemplateManager>,

    /// `(original ODID, original Template ID)` -> synthesized Template ID
    mappings: HashMap<(u32, u16), u16>,
    /// Synthesized Template ID -> entry
    synthesized: HashMap<u16, SynthEntry>,
    /// Content key -> synthesized Template ID (byte-identical reuse)
    by_content: HashMap<Vec<u8>, u16>,

    /// Data Records emitted so far; becomes the outgoing sequence number
    sequence: u32,
}

impl DomainJoin {
    /// Merge every incoming domain into `to_odid`, drawing synthesized
    /// Template IDs from `manager`'s allocator for that domain
    pub fn new(to_odid: u32, manager: Arc<TemplateManager>) -> Self {
        Self {
            to_odid,
            manager,
            mappings: HashMap::new(),
            synthesized: HashMap::new(),
            by_content: HashMap::new(),
            sequence: 0,
        }
    }

    /// The synthesized Template ID an original `(domain, Template ID)` pair
    /// currently maps to
    pub fn synthesized_id(&self, orig_odid: u32, orig_tid: u16) -> Option<u16> {
        self.mappings.get(&(orig_odid, orig_tid)).copied()
    }

    /// Number of mappings sharing one synthesized Template
    pub fn mapping_references(&self, synth_tid: u16) -> Option<u32> {
        self.synthesized.get(&synth_tid).map(|e| e.references)
    }

    /// Map one original template, synthesizing or reusing as needed
    ///
    /// Returns the synthesized Template ID; appends an announcement record
    /// to `out` when a new Template was synthesized.
    fn map_template(
        &mut self,
        orig_odid: u32,
        orig_tid: u16,
        kind: TemplateKind,
        scope_count: u16,
        field_count: u16,
        spec_bytes: &[u8],
        out: &mut OutRecords,
    ) -> Result<u16, TransformError> {
        let content = content_key(kind, scope_count, field_count, spec_bytes);

        if let Some(&synth_tid) = self.mappings.get(&(orig_odid, orig_tid)) {
            let entry = &self.synthesized[&synth_tid];
            if entry.content == content {
                return Ok(synth_tid); // refresh, nothing changed
            }
            // Layout changed under the same original ID: retire the old
            // mapping before creating the new one.
            self.unmap(orig_odid, orig_tid, out);
        }

        if let Some(&synth_tid) = self.by_content.get(&content) {
            let entry = self.synthesized.get_mut(&synth_tid).expect("content index in sync");
            entry.references += 1;
            self.mappings.insert((orig_odid, orig_tid), synth_tid);
            debug!(orig_odid, orig_tid, synth_tid, "mapped onto existing synthesized template");
            return Ok(synth_tid);
        }

        let synth_tid = self.manager.allocate_id(self.to_odid)?;
        let record = synth_record(synth_tid, kind, scope_count, field_count, spec_bytes);
        let (template, _) = Template::parse(&record, kind)?;

        out.push(kind, &record);
        self.synthesized.insert(
            synth_tid,
            SynthEntry {
                template: Arc::new(template),
                record: record.clone(),
                content: content.clone(),
                references: 1,
            },
        );
        self.by_content.insert(content, synth_tid);
        self.mappings.insert((orig_odid, orig_tid), synth_tid);
        debug!(orig_odid, orig_tid, synth_tid, "synthesized new template");
        Ok(synth_tid)
    }

    /// Remove one mapping; the last mapping withdraws the synthesized
    /// Template and returns its ID to the allocator
    fn unmap(&mut self, orig_odid: u32, orig_tid: u16, out: &mut OutRecords) {
        let Some(synth_tid) = self.mappings.remove(&(orig_odid, orig_tid)) else {
            warn!(orig_odid, orig_tid, "withdrawal for unmapped template ignored");
            return;
        };
        let entry = self.synthesized.get_mut(&synth_tid).expect("mapping index in sync");
        entry.references -= 1;
        if entry.references > 0 {
            return;
        }

        let entry = self.synthesized.remove(&synth_tid).expect("just seen");
        self.by_content.remove(&entry.content);
        entry.template.withdraw();
        out.push(entry.template.kind(), &withdrawal(synth_tid));
        self.manager.release_id(self.to_odid, synth_tid);
        debug!(orig_odid, orig_tid, synth_tid, "synthesized template withdrawn");
    }

    fn apply_template_sets(
        &mut self,
        message: &Message,
        kind: TemplateKind,
        out: &mut OutRecords,
    ) -> Result<(), TransformError> {
        let odid = message.observation_domain_id();
        let sets = match kind {
            TemplateKind::Template => message.template_sets(),
            TemplateKind::OptionsTemplate => message.options_template_sets(),
        };
        let withdraw_all_id = match kind {
            TemplateKind::Template => TEMPLATE_SET_ID,
            TemplateKind::OptionsTemplate => OPTIONS_TEMPLATE_SET_ID,
        };

        for set in sets {
            for record in TemplateRecords::new(message.set_payload(set), kind) {
                let record = match record {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(odid, %e, "bad template record in join input, set skipped");
                        break;
                    }
                };

                if record.is_withdrawal() {
                    if record.template_id == withdraw_all_id {
                        let originals: Vec<u16> = self
                            .mappings
                            .keys()
                            .filter(|(o, _)| *o == odid)
                            .map(|(_, t)| *t)
                            .filter(|t| {
                                self.synthesized[&self.mappings[&(odid, *t)]].template.kind() == kind
                            })
                            .collect();
                        for tid in originals {
                            self.unmap(odid, tid, out);
                        }
                    } else {
                        self.unmap(odid, record.template_id, out);
                    }
                    continue;
                }

                if record.template_id < MIN_DATA_SET_ID {
                    continue;
                }
                let header_len = match kind {
                    TemplateKind::Template => 4,
                    TemplateKind::OptionsTemplate => 6,
                };
                let scope_count = if kind == TemplateKind::OptionsTemplate {
                    u16::from_be_bytes([record.bytes[4], record.bytes[5]])
                } else {
                    0
                };
                self.map_template(
                    odid,
                    record.template_id,
                    kind,
                    scope_count,
                    record.field_count,
                    &record.bytes[header_len..],
                    out,
                )?;
            }
        }
        Ok(())
    }

    /// Rewrite the Data Sets, appending the original ODID to every record
    ///
    /// Template-less sets cannot be rewritten (record boundaries are
    /// unknowable) and are dropped from the joined stream. Rewritten
    /// payloads are chunked at `MAX_SET_PAYLOAD` so every emitted set fits
    /// a single message; each chunk carries its record count for sequence
    /// accounting.
    fn rewrite_data(
        &mut self,
        message: &Message,
        out: &mut OutRecords,
        data_sets: &mut Vec<(u16, u32, Vec<u8>)>,
    ) -> Result<(), TransformError> {
        let odid = message.observation_domain_id();
        let odid_bytes = odid.to_be_bytes();

        for couple in message.data_couples() {
            let Some(template) = &couple.template else {
                debug!(odid, template_id = couple.template_id(), "template-less data set dropped by join");
                continue;
            };

            // Data can precede the stage having seen the announcement (the
            // stage may start mid-stream); synthesize from the resolved
            // Template in that case.
            let synth_tid = match self.synthesized_id(odid, template.id()) {
                Some(tid) => tid,
                None => {
                    let spec_bytes = serialize_fields(template);
                    self.map_template(
                        odid,
                        template.id(),
                        template.kind(),
                        template.scope_field_count(),
                        template.field_count(),
                        &spec_bytes,
                        out,
                    )?
                }
            };

            let payload = message.set_payload(&couple.set);
            let mut rewritten = Vec::with_capacity(payload.len() + 64);
            let mut count = 0u32;
            for record in DataRecords::new(payload, template) {
                let record = match record {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(odid, template_id = template.id(), %e, "bad data record in join input, set truncated");
                        break;
                    }
                };
                let grown = record.len() + odid_bytes.len();
                if grown > MAX_SET_PAYLOAD {
                    warn!(odid, template_id = template.id(), "record outgrows any representable set, dropped");
                    continue;
                }
                if rewritten.len() + grown > MAX_SET_PAYLOAD {
                    data_sets.push((synth_tid, count, std::mem::take(&mut rewritten)));
                    count = 0;
                }
                rewritten.extend_from_slice(record);
                rewritten.extend_from_slice(&odid_bytes);
                count += 1;
            }
            if !rewritten.is_empty() {
                data_sets.push((synth_tid, count, rewritten));
            }
        }
        Ok(())
    }

    /// Build, decode and resolve one output message from packed sets
    ///
    /// The outgoing sequence number is sampled before the message's own
    /// Data Records are counted into it, per the sequencing rules.
    fn emit_message(
        &mut self,
        export_time: u32,
        source: SourceInfo,
        sets: Vec<(u16, u32, Vec<u8>)>,
    ) -> Result<Arc<Message>, TransformError> {
        let mut total = HEADER_LENGTH;
        let mut records = 0u32;
        for (_, count, payload) in &sets {
            total += SET_HEADER_LENGTH + payload.len();
            records += count;
        }
        debug_assert!(total <= MAX_MESSAGE_LENGTH);

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&IPFIX_VERSION.to_be_bytes());
        buf.extend_from_slice(&(total as u16).to_be_bytes());
        buf.extend_from_slice(&export_time.to_be_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.to_odid.to_be_bytes());
        for (set_id, _, payload) in &sets {
            push_set(&mut buf, *set_id, payload);
        }

        let mut joined = decode(Bytes::from(buf), source, SourceStatus::Open, DEFAULT_MAX_SETS)?;
        for couple in joined.data_couples_mut() {
            let entry = self.synthesized.get(&couple.template_id()).expect("own data set");
            entry.template.reference_inc();
            couple.template = Some(Arc::clone(&entry.template));
        }

        self.sequence = self.sequence.wrapping_add(records);
        Ok(Arc::new(joined))
    }
}

impl Transform for DomainJoin {
    fn name(&self) -> &'static str {
        "domain-join"
    }

    fn process(&mut self, message: Arc<Message>) -> Result<Verdict, TransformError> {
        let mut out = OutRecords::default();
        let mut data_sets = Vec::new();

        self.apply_template_sets(&message, TemplateKind::Template, &mut out)?;
        self.apply_template_sets(&message, TemplateKind::OptionsTemplate, &mut out)?;
        self.rewrite_data(&message, &mut out, &mut data_sets)?;

        if out.is_empty() && data_sets.is_empty() {
            return Ok(Verdict::Drop);
        }

        // Announcements first, then data, packed into as many output
        // messages as the u16 message length requires. Appending 4 octets
        // per record means a near-maximal input legitimately outgrows a
        // single message.
        let mut sets: Vec<(u16, u32, Vec<u8>)> = Vec::new();
        for payload in out.plain {
            sets.push((TEMPLATE_SET_ID, 0, payload));
        }
        for payload in out.options {
            sets.push((OPTIONS_TEMPLATE_SET_ID, 0, payload));
        }
        sets.append(&mut data_sets);

        let export_time = message.header().export_time;
        let source = *message.source();
        let mut messages = Vec::new();
        let mut batch: Vec<(u16, u32, Vec<u8>)> = Vec::new();
        let mut length = HEADER_LENGTH;
        for set in sets {
            let set_length = SET_HEADER_LENGTH + set.2.len();
            if !batch.is_empty() && length + set_length > MAX_MESSAGE_LENGTH {
                messages.push(self.emit_message(export_time, source, std::mem::take(&mut batch))?);
                length = HEADER_LENGTH;
            }
            length += set_length;
            batch.push(set);
        }
        messages.push(self.emit_message(export_time, source, batch)?);
        Ok(Verdict::Forward(messages))
    }

    fn close(&mut self) {
        for (synth_tid, entry) in self.synthesized.drain() {
            entry.template.withdraw();
            self.manager.release_id(self.to_odid, synth_tid);
        }
        self.mappings.clear();
        self.by_content.clear();
    }
}

/// Content-address of a template layout, excluding its Template ID
fn content_key(kind: TemplateKind, scope_count: u16, field_count: u16, spec_bytes: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(5 + spec_bytes.len());
    key.push(match kind {
        TemplateKind::Template => 0,
        TemplateKind::OptionsTemplate => 1,
    });
    key.extend_from_slice(&scope_count.to_be_bytes());
    key.extend_from_slice(&field_count.to_be_bytes());
    key.extend_from_slice(spec_bytes);
    key
}

/// Build the synthesized announcement record: original fields plus IE 405
fn synth_record(
    synth_tid: u16,
    kind: TemplateKind,
    scope_count: u16,
    field_count: u16,
    spec_bytes: &[u8],
) -> Vec<u8> {
    let mut record = Vec::with_capacity(spec_bytes.len() + 10);
    record.extend_from_slice(&synth_tid.to_be_bytes());
    record.extend_from_slice(&(field_count + 1).to_be_bytes());
    if kind == TemplateKind::OptionsTemplate {
        record.extend_from_slice(&scope_count.to_be_bytes());
    }
    record.extend_from_slice(spec_bytes);
    record.extend_from_slice(&ORIGINAL_ODID_FIELD.to_be_bytes());
    record.extend_from_slice(&4u16.to_be_bytes());
    record
}

fn withdrawal(tid: u16) -> Vec<u8> {
    let mut record = Vec::with_capacity(4);
    record.extend_from_slice(&tid.to_be_bytes());
    record.extend_from_slice(&0u16.to_be_bytes());
    record
}

/// Serialize a Template's field specifiers back to wire form
fn serialize_fields(template: &Template) -> Vec<u8> {
    let mut out = Vec::with_capacity(template.fields().len() * 4);
    for field in template.fields() {
        let raw_id = if field.enterprise_number.is_some() {
            field.ie_id | 0x8000
        } else {
            field.ie_id
        };
        out.extend_from_slice(&raw_id.to_be_bytes());
        out.extend_from_slice(&field.length.to_be_bytes());
        if let Some(en) = field.enterprise_number {
            out.extend_from_slice(&en.to_be_bytes());
        }
    }
    out
}

fn push_set(buf: &mut Vec<u8>, set_id: u16, payload: &[u8]) {
    buf.extend_from_slice(&set_id.to_be_bytes());
    buf.extend_from_slice(&((4 + payload.len()) as u16).to_be_bytes());
    buf.extend_from_slice(payload);
}
