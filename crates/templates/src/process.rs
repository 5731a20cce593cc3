//! Applying a decoded Message to the registry
//!
//! `process_message` is the step between decode and the pipeline: it walks
//! the Message's (Options) Template Sets, applies announcements and
//! withdrawals to the `TemplateManager`, then resolves every Data Set couple
//! against the now-current registry. An exporter may announce a Template and
//! use it in the very same packet, which is why resolution must run after
//! the template sets.
//!
//! Withdrawal rules follow RFC 7011: a record with field count 0 withdraws
//! its Template ID; Template ID 2 (or 3 in an Options Template Set) with
//! field count 0 withdraws all (options) templates of the source. Sessions
//! over UDP cannot withdraw at all - such records are protocol errors and
//! are ignored with a warning.

use tracing::{debug, warn};

use flowcol_protocol::{
    Message, SourceStatus, Template, TemplateKind, TemplateRecords, MIN_DATA_SET_ID,
    OPTIONS_TEMPLATE_SET_ID, TEMPLATE_SET_ID,
};

use crate::key::TemplateKey;
use crate::manager::{Insertion, TemplateManager};

/// Default lifetime of a UDP-learned Template before refresh is overdue
pub const UDP_TEMPLATE_LIFETIME_SECS: u64 = 1800;

/// What one Message did to the registry
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Templates announced for the first time
    pub added: usize,
    /// Byte-identical refreshes (no registry change)
    pub refreshed: usize,
    /// Templates replaced by a new layout
    pub superseded: usize,
    /// Templates withdrawn (single or withdraw-all)
    pub withdrawn: usize,
    /// Data Sets left without a Template after resolution
    pub unresolved: usize,
}

/// Apply a Message's template sets to `manager`, then resolve its Data Sets
///
/// `now_unix_secs` drives the UDP refresh bookkeeping; pass the receive
/// time. A `Closed` status drops every template of the source before
/// resolution (the final message of a session carries no usable data).
pub fn process_message(
    manager: &TemplateManager,
    message: &mut Message,
    now_unix_secs: u64,
    udp_lifetime_secs: u64,
) -> ProcessSummary {
    let mut summary = ProcessSummary::default();
    let odid = message.observation_domain_id();
    let key = TemplateKey::new(odid, message.source());
    let is_udp = message.source().is_udp();
    let message_counter = message.header().sequence_number;

    if message.status() == SourceStatus::Closed {
        manager.remove_source(&key);
        return summary;
    }

    apply_template_sets(
        manager,
        message,
        &key,
        TemplateKind::Template,
        is_udp,
        now_unix_secs,
        message_counter,
        &mut summary,
    );
    apply_template_sets(
        manager,
        message,
        &key,
        TemplateKind::OptionsTemplate,
        is_udp,
        now_unix_secs,
        message_counter,
        &mut summary,
    );

    resolve_couples(manager, message, &key, is_udp, now_unix_secs, udp_lifetime_secs, &mut summary);
    summary
}

#[allow(clippy::too_many_arguments)]
fn apply_template_sets(
    manager: &TemplateManager,
    message: &Message,
    key: &TemplateKey,
    kind: TemplateKind,
    is_udp: bool,
    now_unix_secs: u64,
    message_counter: u32,
    summary: &mut ProcessSummary,
) {
    let sets = match kind {
        TemplateKind::Template => message.template_sets(),
        TemplateKind::OptionsTemplate => message.options_template_sets(),
    };
    let withdraw_all_id = match kind {
        TemplateKind::Template => TEMPLATE_SET_ID,
        TemplateKind::OptionsTemplate => OPTIONS_TEMPLATE_SET_ID,
    };

    for set in sets {
        let payload = message.set_payload(set);
        for record in TemplateRecords::new(payload, kind) {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(odid = key.odid, %e, "bad template record, skipping rest of set");
                    break;
                }
            };

            if record.is_withdrawal() {
                if is_udp {
                    warn!(
                        odid = key.odid,
                        template_id = record.template_id,
                        "template withdrawal over udp ignored"
                    );
                    continue;
                }
                if record.template_id == withdraw_all_id {
                    manager.remove_all(key, kind);
                    summary.withdrawn += 1;
                } else if let Err(e) = manager.remove(key, record.template_id) {
                    warn!(odid = key.odid, template_id = record.template_id, %e, "withdrawal of unknown template");
                } else {
                    summary.withdrawn += 1;
                }
                continue;
            }

            if record.template_id < MIN_DATA_SET_ID {
                warn!(
                    odid = key.odid,
                    template_id = record.template_id,
                    "template id below 256, record skipped"
                );
                continue;
            }

            let template = match Template::parse(record.bytes, kind) {
                Ok((t, _)) => t,
                Err(e) => {
                    warn!(odid = key.odid, template_id = record.template_id, %e, "malformed template record");
                    break;
                }
            };

            let insertion = manager.update(key, template);
            if is_udp {
                insertion.template().touch(now_unix_secs, message_counter);
            }
            match insertion {
                Insertion::Added(_) => summary.added += 1,
                Insertion::Refreshed(_) => summary.refreshed += 1,
                Insertion::Superseded(_) => summary.superseded += 1,
            }
        }
    }
}

fn resolve_couples(
    manager: &TemplateManager,
    message: &mut Message,
    key: &TemplateKey,
    is_udp: bool,
    now_unix_secs: u64,
    udp_lifetime_secs: u64,
    summary: &mut ProcessSummary,
) {
    let key = *key;
    for couple in message.data_couples_mut() {
        let template_id = couple.template_id();
        match manager.resolve(&key, template_id) {
            Some(template) => {
                if is_udp && template.expired(udp_lifetime_secs, now_unix_secs) {
                    // Policy: an overdue UDP template keeps decoding; the
                    // exporter is merely late with its refresh.
                    warn!(
                        odid = key.odid,
                        template_id,
                        "udp template past its refresh lifetime"
                    );
                }
                couple.template = Some(template);
            }
            None => {
                debug!(odid = key.odid, template_id, "no template for data set, retained undecoded");
                summary.unresolved += 1;
            }
        }
    }
}
