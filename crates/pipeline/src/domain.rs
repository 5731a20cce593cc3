//! Domain Context - per-ODID storage fan-out
//!
//! One context per Observation Domain ID seen at the output boundary. It
//! owns a bounded queue with one consumer slot per storage plugin; every
//! plugin runs on its own thread and sees every Message of the domain in
//! arrival order. The router thread is the only writer, which makes the
//! per-domain ordering guarantee trivial to keep.
//!
//! The context also tracks the domain's export sequence number: a mismatch
//! is logged and the counter resyncs to the exporter's value. Data Sets
//! without a resolved Template contribute zero records to the expected
//! counter, so a late template announcement does not trigger a spurious
//! sequence warning storm.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use flowcol_protocol::{DataRecords, Message};
use flowcol_storage::StoragePlugin;

use crate::error::{PipelineError, Result};
use crate::ring::RingBuffer;

/// State and threads of one Observation Domain at the output boundary
pub struct DomainContext {
    odid: u32,
    queue: Arc<RingBuffer<Message>>,
    workers: Vec<JoinHandle<()>>,
    expected_sequence: Option<u32>,
}

impl DomainContext {
    /// Create the context and spawn one thread per storage plugin
    pub fn new(odid: u32, queue_capacity: usize, plugins: Vec<Box<dyn StoragePlugin>>) -> Self {
        assert!(!plugins.is_empty(), "domain context needs at least one storage plugin");
        let queue = Arc::new(RingBuffer::new(queue_capacity, plugins.len()));

        let workers = plugins
            .into_iter()
            .enumerate()
            .map(|(consumer, plugin)| spawn_worker(odid, consumer, plugin, Arc::clone(&queue)))
            .collect();

        info!(odid, "domain context created");
        Self {
            odid,
            queue,
            workers,
            expected_sequence: None,
        }
    }

    pub fn odid(&self) -> u32 {
        self.odid
    }

    /// Enqueue one Message for the domain's storage chain
    ///
    /// Blocks when the queue is full; that is the backpressure path from
    /// slow storage back up to the router. Returns whether the queue was
    /// full and the caller had to wait.
    pub fn submit(&mut self, message: Arc<Message>) -> Result<bool> {
        self.track_sequence(&message);
        match self.queue.write(Arc::clone(&message), false) {
            Ok(()) => Ok(false),
            Err(PipelineError::QueueFull) => {
                self.queue.write(message, true)?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    fn track_sequence(&mut self, message: &Message) {
        let got = message.header().sequence_number;
        if let Some(expected) = self.expected_sequence {
            if got != expected {
                warn!(
                    odid = self.odid,
                    expected,
                    got,
                    "sequence number mismatch, resyncing"
                );
            }
        }
        let records = count_records(message);
        self.expected_sequence = Some(got.wrapping_add(records));
    }

    /// Close the queue and wait for every plugin to drain and finish
    pub fn close(self) {
        self.queue.close();
        for worker in self.workers {
            if worker.join().is_err() {
                error!(odid = self.odid, "storage worker panicked");
            }
        }
        debug!(odid = self.odid, "domain context closed");
    }
}

fn spawn_worker(
    odid: u32,
    consumer: usize,
    mut plugin: Box<dyn StoragePlugin>,
    queue: Arc<RingBuffer<Message>>,
) -> JoinHandle<()> {
    let name = plugin.name();
    thread::Builder::new()
        .name(format!("storage-{odid}-{name}"))
        .spawn(move || {
            while let Some(message) = queue.read(consumer) {
                if let Err(e) = plugin.process(&message) {
                    warn!(odid, plugin = name, %e, "storage plugin failed on message");
                }
                queue.release(consumer, true);
            }
            if let Err(e) = plugin.close() {
                warn!(odid, plugin = name, %e, "storage plugin close failed");
            }
        })
        .expect("spawn storage thread")
}

/// Decodable Data Records in a Message; unresolved sets count zero
fn count_records(message: &Message) -> u32 {
    let mut records = 0u32;
    for couple in message.data_couples() {
        if let Some(template) = &couple.template {
            let payload = message.set_payload(&couple.set);
            records += DataRecords::new(payload, template)
                .filter(|r| r.is_ok())
                .count() as u32;
        }
    }
    records
}
