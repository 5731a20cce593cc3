//! Input stages - thin collaborators feeding the first queue
//!
//! Inputs only capture bytes, call `decode`, apply the message to the
//! Template Manager and push it into the pipeline. Everything else is the
//! pipeline's business.

pub mod file;
pub mod udp;


use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::{debug, warn};

use flowcol_pipeline::RingBuffer;
use flowcol_protocol::{decode, Message, SourceInfo, SourceStatus};
use flowcol_templates::{process_message, TemplateManager};

/// Shared receive path of every input
pub struct Ingestor {
    manager: Arc<TemplateManager>,
    queue: Arc<RingBuffer<Message>>,
    max_sets: usize,
    udp_lifetime_secs: u64,
    seen: HashSet<SocketAddr>,
    rejected: u64,
}

impl Ingestor {
    pub fn new(
        manager: Arc<TemplateManager>,
        queue: Arc<RingBuffer<Message>>,
        max_sets: usize,
        udp_lifetime_secs: u64,
    ) -> Self {
        Self {
            manager,
            queue,
            max_sets,
            udp_lifetime_secs,
            seen: HashSet::new(),
            rejected: 0,
        }
    }

    /// Decode one packet and feed it to the pipeline
    ///
    /// Returns `false` once the pipeline is shutting down (the queue
    /// closed); malformed packets are logged, counted and skipped without
    /// affecting the stream.
    pub fn ingest(&mut self, buffer: Bytes, source: SourceInfo) -> bool {
        let status = if self.seen.insert(source.addr()) {
            SourceStatus::New
        } else {
            SourceStatus::Open
        };
        self.feed(buffer, source, status)
    }

    /// Tell the pipeline a source's session ended
    ///
    /// Sends an empty `Closed` message per Observation Domain so the
    /// Template Manager drops the source's templates.
    pub fn close_source(&mut self, source: SourceInfo, odids: &[u32]) -> bool {
        self.seen.remove(&source.addr());
        for &odid in odids {
            if !self.feed(empty_message(odid), source, SourceStatus::Closed) {
                return false;
            }
        }
        true
    }

    fn feed(&mut self, buffer: Bytes, source: SourceInfo, status: SourceStatus) -> bool {
        let mut message = match decode(buffer, source, status, self.max_sets) {
            Ok(m) => m,
            Err(e) => {
                self.rejected += 1;
                warn!(%source, %e, "packet rejected");
                return true;
            }
        };

        let summary = process_message(
            &self.manager,
            &mut message,
            now_unix_secs(),
            self.udp_lifetime_secs,
        );
        if summary.unresolved > 0 {
            debug!(%source, unresolved = summary.unresolved, "data sets without template retained");
        }

        match self.queue.write(Arc::new(message), true) {
            Ok(()) => true,
            Err(_) => false, // queue closed, pipeline is going down
        }
    }

    /// Packets rejected as malformed so far
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// A header-only IPFIX message for the given domain
fn empty_message(odid: u32) -> Bytes {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&flowcol_protocol::IPFIX_VERSION.to_be_bytes());
    out.extend_from_slice(&16u16.to_be_bytes());
    out.extend_from_slice(&(now_unix_secs() as u32).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&odid.to_be_bytes());
    Bytes::from(out)
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
