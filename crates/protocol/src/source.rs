//! Exporter identification
//!
//! `SourceInfo` describes the transport identity of an exporting process.
//! Its fingerprint lets the Template Manager tell apart exporters that reuse
//! the same Template ID behind the same Observation Domain ID.

use std::fmt;
use std::net::SocketAddr;

/// Transport a packet arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Datagram transport: templates refresh periodically and never withdraw
    Udp,
    /// Stream transport: templates withdraw explicitly or on session close
    Tcp,
    /// Replay from a capture file (treated like a stream)
    File,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
            Transport::File => write!(f, "file"),
        }
    }
}

/// Identity of one exporting process
///
/// The fingerprint is a CRC32 over the exporter's address and port, computed
/// once at construction. Two exporters sending into the same collector may
/// legitimately use the same Observation Domain ID and Template IDs; the
/// fingerprint keeps their template spaces separate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceInfo {
    addr: SocketAddr,
    transport: Transport,
    fingerprint: u32,
}

impl SourceInfo {
    /// Create a source identity from the exporter's transport address
    pub fn new(addr: SocketAddr, transport: Transport) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        match addr.ip() {
            std::net::IpAddr::V4(ip) => hasher.update(&ip.octets()),
            std::net::IpAddr::V6(ip) => hasher.update(&ip.octets()),
        }
        hasher.update(&addr.port().to_be_bytes());

        Self {
            addr,
            transport,
            fingerprint: hasher.finalize(),
        }
    }

    /// Exporter transport address
    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Transport the exporter uses
    #[inline]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Whether templates from this source follow UDP refresh semantics
    #[inline]
    pub fn is_udp(&self) -> bool {
        self.transport == Transport::Udp
    }

    /// Checksum of the exporter identity, used in template keys
    #[inline]
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport, self.addr)
    }
}
