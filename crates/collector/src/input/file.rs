//! File input
//!
//! Reads a capture of concatenated IPFIX messages: each message carries
//! its own length in the header, so the reader peels messages off one at
//! a time. At end of file every Observation Domain seen gets a `Closed`
//! message so downstream state is released.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::{bail, Context};
use bytes::Bytes;
use tracing::{info, warn};

use flowcol_protocol::{MessageHeader, SourceInfo, Transport, HEADER_LENGTH};

use super::Ingestor;

/// Stand-in peer address for messages replayed from a capture
fn file_source() -> SourceInfo {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    SourceInfo::new(addr, Transport::File)
}

pub struct FileInput {
    reader: File,
}

impl FileInput {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let reader = File::open(path)
            .with_context(|| format!("opening capture file {}", path.display()))?;
        info!(path = %path.display(), "file input opened");
        Ok(Self { reader })
    }

    /// Replay the whole capture, then close every domain seen
    pub fn run(&mut self, ingestor: &mut Ingestor) -> anyhow::Result<()> {
        let source = file_source();
        let mut odids = BTreeSet::new();
        let mut messages = 0u64;

        loop {
            let buffer = match self.read_message()? {
                Some(b) => b,
                None => break,
            };
            if let Ok(header) = MessageHeader::parse(&buffer) {
                odids.insert(header.observation_domain_id);
            }
            if !ingestor.ingest(buffer, source) {
                warn!("pipeline closed before capture was fully replayed");
                return Ok(());
            }
            messages += 1;
        }

        let odids: Vec<u32> = odids.into_iter().collect();
        ingestor.close_source(source, &odids);
        info!(
            messages,
            domains = odids.len(),
            rejected = ingestor.rejected(),
            "file input finished"
        );
        Ok(())
    }

    /// Read one length-delimited message, `None` at a clean end of file
    fn read_message(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut header = [0u8; HEADER_LENGTH];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("reading message header"),
        }

        let parsed = MessageHeader::parse(&header)
            .context("parsing message header from capture")?;
        let total = parsed.length as usize;
        if total < HEADER_LENGTH {
            bail!("message header declares {} bytes, below the minimum", total);
        }

        let mut buffer = Vec::with_capacity(total);
        buffer.extend_from_slice(&header);
        buffer.resize(total, 0);
        self.reader
            .read_exact(&mut buffer[HEADER_LENGTH..])
            .context("reading message body from capture")?;
        Ok(Some(Bytes::from(buffer)))
    }
}
