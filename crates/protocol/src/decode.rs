//! Message decoder - the Set walker
//!
//! `decode` turns a raw packet into a `Message`: it validates the header,
//! walks the Set chain and indexes every Set by kind. Template resolution
//! onto Data Sets happens afterwards, once the Template Sets of the same
//! packet have been applied to the Template Manager (an exporter may
//! announce a Template and use it in the very same message).
//!
//! # Error policy
//!
//! A bad header or a Set overrunning the packet rejects the whole packet -
//! the sender produced a corrupt message and no partial view is forwarded.
//! An unknown Set ID in the reserved range is logged and skipped; it never
//! rejects the packet.

use bytes::Bytes;

use crate::message::{DataCouple, Message, SetRef, SourceStatus};
use crate::source::SourceInfo;
use crate::wire::{MessageHeader, SetHeader};
use crate::{
    DecodeError, Result, HEADER_LENGTH, IPFIX_VERSION, MIN_DATA_SET_ID, OPTIONS_TEMPLATE_SET_ID,
    SET_HEADER_LENGTH, TEMPLATE_SET_ID,
};

/// Decode one IPFIX packet into a `Message`
///
/// `max_sets` bounds the total number of Sets accepted in one message
/// (`DEFAULT_MAX_SETS` is the conventional limit); exceeding it is an error
/// rather than silent truncation.
///
/// Data Sets are indexed with `template = None`; the caller resolves them
/// against the Template Manager after applying this message's Template Sets.
///
/// # Errors
///
/// - `MalformedHeader`: version is not 10, or the declared length is shorter
///   than the header
/// - `MalformedMessage`: fewer bytes supplied than the header declares, or a
///   Set's declared length runs past the packet end
/// - `TooManySets`: more Sets than `max_sets`
pub fn decode(
    buffer: Bytes,
    source: SourceInfo,
    status: SourceStatus,
    max_sets: usize,
) -> Result<Message> {
    let header = MessageHeader::parse(&buffer)?;

    if header.version != IPFIX_VERSION {
        return Err(DecodeError::header(format!(
            "unexpected version {:#06x}",
            header.version
        )));
    }

    let declared = header.length as usize;
    if declared < HEADER_LENGTH {
        return Err(DecodeError::header(format!(
            "declared length {declared} shorter than header"
        )));
    }
    if buffer.len() < declared {
        return Err(DecodeError::message(format!(
            "header declares {declared} bytes, {} supplied",
            buffer.len()
        )));
    }

    let odid = header.observation_domain_id;
    let mut template_sets = Vec::new();
    let mut options_template_sets = Vec::new();
    let mut data_couples = Vec::new();
    let mut set_count = 0usize;

    let mut offset = HEADER_LENGTH;
    while offset + SET_HEADER_LENGTH <= declared {
        let set_header = SetHeader::parse(&buffer, offset)?;
        let set_len = set_header.length as usize;

        // A zero-length set can never advance the walk; stop here rather
        // than loop forever (the rest of the packet is unreachable anyway).
        if set_len == 0 {
            tracing::warn!(odid, offset, "zero-length set, stopping set walk");
            break;
        }

        if set_len < SET_HEADER_LENGTH || offset + set_len > declared {
            return Err(DecodeError::message(format!(
                "set at {offset} declares {set_len} bytes, {} remain",
                declared - offset
            )));
        }

        set_count += 1;
        if set_count > max_sets {
            return Err(DecodeError::TooManySets { max: max_sets });
        }

        let set_ref = SetRef {
            set_id: set_header.set_id,
            payload_offset: offset + SET_HEADER_LENGTH,
            payload_len: set_len - SET_HEADER_LENGTH,
        };

        match set_header.set_id {
            TEMPLATE_SET_ID => template_sets.push(set_ref),
            OPTIONS_TEMPLATE_SET_ID => options_template_sets.push(set_ref),
            id if id >= MIN_DATA_SET_ID => data_couples.push(DataCouple {
                set: set_ref,
                template: None,
            }),
            id => {
                // Reserved range: skip the set, keep the packet.
                tracing::warn!(odid, set_id = id, "unknown set id, skipping set");
            }
        }

        offset += set_len;
    }

    Ok(Message::new(
        buffer,
        header,
        source,
        status,
        template_sets,
        options_template_sets,
        data_couples,
    ))
}
