//! Null plugin - counts and discards
//!
//! Measures pure pipeline throughput without any I/O in the way; also handy
//! for validating routing in tests.

use std::sync::Arc;

use flowcol_protocol::{DataRecords, Message};

use crate::{StorageError, StorageMetrics, StoragePlugin, StorageSnapshot};

/// Storage plugin that discards every Message after counting its records
#[derive(Default)]
pub struct NullStorage {
    metrics: Arc<StorageMetrics>,
}

impl NullStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics handle, valid after the plugin moved into its thread
    pub fn metrics(&self) -> Arc<StorageMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current counter values
    pub fn snapshot(&self) -> StorageSnapshot {
        self.metrics.snapshot()
    }
}

impl StoragePlugin for NullStorage {
    fn name(&self) -> &'static str {
        "null"
    }

    fn process(&mut self, message: &Arc<Message>) -> Result<(), StorageError> {
        self.metrics.message_received();
        let mut records = 0u64;
        for couple in message.data_couples() {
            if let Some(template) = &couple.template {
                let payload = message.set_payload(&couple.set);
                records += DataRecords::new(payload, template)
                    .filter(|r| r.is_ok())
                    .count() as u64;
            }
        }
        self.metrics.message_stored(records);
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
