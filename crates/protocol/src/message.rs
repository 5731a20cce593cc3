//! Message - decoded view of one IPFIX packet
//!
//! A `Message` owns the raw packet bytes and indexes the Sets inside them.
//! Set references are byte ranges into the owned buffer, so a `Message` can
//! travel through the pipeline behind `Arc` with zero copies; views handed
//! out by the accessors never outlive the `Message`.

use std::sync::Arc;

use bytes::Bytes;

use crate::template::Template;
use crate::wire::MessageHeader;
use crate::SET_HEADER_LENGTH;
use crate::source::SourceInfo;

/// Processing state of the exporting session this packet came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// First packet seen from this source
    New,
    /// Source already known
    Open,
    /// Session closed; this (possibly empty) message is the last one
    Closed,
}

/// One Set inside a message: byte range of its payload (header excluded)
#[derive(Debug, Clone, Copy)]
pub struct SetRef {
    /// Set ID from the set header
    pub set_id: u16,
    /// Offset of the payload (first byte after the 4-byte set header)
    pub payload_offset: usize,
    /// Payload length in octets
    pub payload_len: usize,
}

impl SetRef {
    /// Offset of the set header itself
    #[inline]
    pub fn header_offset(&self) -> usize {
        self.payload_offset - SET_HEADER_LENGTH
    }

    /// Total set length including the header
    #[inline]
    pub fn total_len(&self) -> usize {
        self.payload_len + SET_HEADER_LENGTH
    }
}

/// A Data Set paired with the Template it was resolved against
///
/// `template` stays `None` when no active Template was known at decode
/// time. Such a couple is retained - the announcement may arrive in a later
/// packet - but its records cannot be walked.
#[derive(Debug, Clone)]
pub struct DataCouple {
    /// The Data Set (set_id >= 256, equal to the Template ID)
    pub set: SetRef,
    /// Resolved Template, if one was active for this source and domain
    pub template: Option<Arc<Template>>,
}

impl DataCouple {
    /// Template ID this Data Set references
    #[inline]
    pub fn template_id(&self) -> u16 {
        self.set.set_id
    }
}

/// Decoded view of one received IPFIX packet
#[derive(Debug)]
pub struct Message {
    buffer: Bytes,
    header: MessageHeader,
    source: SourceInfo,
    status: SourceStatus,

    template_sets: Vec<SetRef>,
    options_template_sets: Vec<SetRef>,
    data_couples: Vec<DataCouple>,
}

impl Message {
    pub(crate) fn new(
        buffer: Bytes,
        header: MessageHeader,
        source: SourceInfo,
        status: SourceStatus,
        template_sets: Vec<SetRef>,
        options_template_sets: Vec<SetRef>,
        data_couples: Vec<DataCouple>,
    ) -> Self {
        Self {
            buffer,
            header,
            source,
            status,
            template_sets,
            options_template_sets,
            data_couples,
        }
    }

    /// Message header in host byte order
    #[inline]
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Observation Domain ID of this message
    #[inline]
    pub fn observation_domain_id(&self) -> u32 {
        self.header.observation_domain_id
    }

    /// Identity of the exporter that sent this packet
    #[inline]
    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// Session state the input stage attached to this packet
    #[inline]
    pub fn status(&self) -> SourceStatus {
        self.status
    }

    /// The raw packet bytes this message owns
    #[inline]
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Template Sets in wire order
    #[inline]
    pub fn template_sets(&self) -> &[SetRef] {
        &self.template_sets
    }

    /// Options Template Sets in wire order
    #[inline]
    pub fn options_template_sets(&self) -> &[SetRef] {
        &self.options_template_sets
    }

    /// Data Sets with their resolved Templates, in wire order
    #[inline]
    pub fn data_couples(&self) -> &[DataCouple] {
        &self.data_couples
    }

    /// Mutable access for the stage that resolves Templates onto couples
    #[inline]
    pub fn data_couples_mut(&mut self) -> &mut [DataCouple] {
        &mut self.data_couples
    }

    /// Payload bytes of a Set (set header excluded)
    #[inline]
    pub fn set_payload(&self, set: &SetRef) -> &[u8] {
        &self.buffer[set.payload_offset..set.payload_offset + set.payload_len]
    }

    /// Whether any Data Set could not be resolved to a Template
    pub fn has_unresolved_data(&self) -> bool {
        self.data_couples.iter().any(|c| c.template.is_none())
    }

    /// Whether the message carries any Template or Options Template Set
    #[inline]
    pub fn has_template_sets(&self) -> bool {
        !self.template_sets.is_empty() || !self.options_template_sets.is_empty()
    }
}

impl Drop for Message {
    /// Release the in-flight reference every resolved couple holds
    ///
    /// Couples take a reference on their Template at resolution time; the
    /// message dropping is the matching decrement, so a superseded Template
    /// stays valid exactly as long as messages still point at it.
    fn drop(&mut self) {
        for couple in &self.data_couples {
            if let Some(template) = &couple.template {
                template.reference_dec();
            }
        }
    }
}
