//! Bucket key: which exporter stream a Template belongs to

use std::fmt;

use flowcol_protocol::SourceInfo;

/// Identifies one template space: an Observation Domain as seen from one
/// exporting process
///
/// Template IDs are only unique within this pair. Two exporters may both
/// announce Template 256 under ODID 0; the source fingerprint keeps their
/// schemas apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    /// Observation Domain ID from the message header
    pub odid: u32,
    /// CRC32 fingerprint of the exporter's transport identity
    pub fingerprint: u32,
}

impl TemplateKey {
    /// Key for templates announced by `source` under `odid`
    pub fn new(odid: u32, source: &SourceInfo) -> Self {
        Self {
            odid,
            fingerprint: source.fingerprint(),
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "odid {} / source {:#010x}", self.odid, self.fingerprint)
    }
}
