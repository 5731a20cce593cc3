//! Output Router - Messages to Domain Contexts
//!
//! The last shared stage: reads from its input buffer and hands each
//! Message to the Domain Context for its Observation Domain ID. Contexts
//! are created lazily on first sight of a new ID and kept in insertion
//! order, so iteration and shutdown are deterministic.
//!
//! On closure the router closes every context in creation order and waits
//! for each storage queue to drain before returning.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use flowcol_protocol::Message;
use flowcol_storage::StoragePlugin;

use crate::domain::DomainContext;
use crate::metrics::{RouterMetrics, RouterSnapshot};
use crate::ring::RingBuffer;

/// Builds the storage-plugin chain for a newly seen domain
pub type PluginFactory = Box<dyn Fn(u32) -> Vec<Box<dyn StoragePlugin>> + Send>;

/// The router is the sole consumer of its input buffer
const ROUTER_CONSUMER: usize = 0;

/// Routes Messages to per-domain storage chains
pub struct OutputRouter {
    /// Domain Contexts in creation order
    domains: Vec<DomainContext>,
    /// ODID -> index into `domains`
    index: HashMap<u32, usize>,
    factory: PluginFactory,
    queue_capacity: usize,
    metrics: Arc<RouterMetrics>,
}

impl OutputRouter {
    /// A router creating each domain's plugin chain via `factory`
    pub fn new(queue_capacity: usize, factory: PluginFactory) -> Self {
        Self {
            domains: Vec::new(),
            index: HashMap::new(),
            factory,
            queue_capacity,
            metrics: Arc::new(RouterMetrics::new()),
        }
    }

    /// Metrics handle; stays valid after the router moves into its thread
    pub fn metrics(&self) -> Arc<RouterMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current counter values
    pub fn snapshot(&self) -> RouterSnapshot {
        self.metrics.snapshot()
    }

    /// Number of Domain Contexts created so far
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Hand one Message to its Domain Context, creating it on first sight
    pub fn route(&mut self, message: Arc<Message>) {
        self.metrics.received();
        let odid = message.observation_domain_id();

        let idx = match self.index.get(&odid) {
            Some(&idx) => idx,
            None => {
                let plugins = (self.factory)(odid);
                let context = DomainContext::new(odid, self.queue_capacity, plugins);
                let idx = self.domains.len();
                self.domains.push(context);
                self.index.insert(odid, idx);
                self.metrics.domain_created();
                idx
            }
        };

        match self.domains[idx].submit(message) {
            Ok(blocked) => {
                if blocked {
                    self.metrics.backpressure();
                }
                self.metrics.routed();
            }
            Err(e) => error!(odid, %e, "domain queue rejected message"),
        }
    }

    /// Consume the input buffer until closure, then shut every domain down
    pub fn run(mut self, input: Arc<RingBuffer<Message>>) {
        debug!("output router running");
        while let Some(message) = input.read(ROUTER_CONSUMER) {
            self.route(message);
            input.release(ROUTER_CONSUMER, true);
        }
        self.shutdown();
    }

    /// Spawn the router thread
    pub fn spawn(self, input: Arc<RingBuffer<Message>>) -> JoinHandle<()> {
        thread::Builder::new()
            .name("output-router".into())
            .spawn(move || self.run(input))
            .expect("spawn router thread")
    }

    /// Close every Domain Context in creation order, draining each queue
    pub fn shutdown(self) {
        let count = self.domains.len();
        for domain in self.domains {
            domain.close();
        }
        info!(domains = count, "output router stopped");
    }
}
