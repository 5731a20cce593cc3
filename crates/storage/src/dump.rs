//! Dump plugin - human-readable record output
//!
//! Writes one line per Message header and one line per Data Record, field
//! values in hex. Meant for debugging a live stream, not for volume;
//! anything serious goes behind a real storage backend.

use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use flowcol_protocol::{DataRecords, Message};
use tracing::warn;

use crate::{StorageError, StorageMetrics, StoragePlugin, StorageSnapshot};

/// Storage plugin printing every decodable record to a writer
pub struct DumpStorage {
    out: BufWriter<Box<dyn Write + Send>>,
    metrics: Arc<StorageMetrics>,
}

impl DumpStorage {
    /// Dump to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Dump to an arbitrary writer (tests use a file or a buffer)
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            out: BufWriter::new(writer),
            metrics: Arc::new(StorageMetrics::new()),
        }
    }

    /// Metrics handle, valid after the plugin moved into its thread
    pub fn metrics(&self) -> Arc<StorageMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current counter values
    pub fn snapshot(&self) -> StorageSnapshot {
        self.metrics.snapshot()
    }

    fn dump_message(&mut self, message: &Message) -> io::Result<u64> {
        let header = message.header();
        writeln!(
            self.out,
            "message odid={} seq={} export_time={} source={}",
            header.observation_domain_id,
            header.sequence_number,
            header.export_time,
            message.source(),
        )?;

        let mut written = 0u64;
        for couple in message.data_couples() {
            let Some(template) = &couple.template else {
                writeln!(
                    self.out,
                    "  set template={} <no template, {} bytes undecoded>",
                    couple.template_id(),
                    couple.set.payload_len,
                )?;
                continue;
            };

            let payload = message.set_payload(&couple.set);
            for record in DataRecords::new(payload, template) {
                let record = match record {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(template_id = template.id(), %e, "bad record in dump, set truncated");
                        break;
                    }
                };
                write!(self.out, "  record template={}", template.id())?;
                let mut offset = 0;
                for field in template.fields() {
                    let len = field_len(record, field, &mut offset);
                    write!(self.out, " {}={}", field.ie_id, hex(&record[offset - len..offset]))?;
                }
                writeln!(self.out)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

/// Advance `offset` over one field, returning the value length
fn field_len(record: &[u8], field: &flowcol_protocol::FieldSpecifier, offset: &mut usize) -> usize {
    if !field.is_variable() {
        *offset += field.length as usize;
        return field.length as usize;
    }
    let prefix = record[*offset] as usize;
    *offset += 1;
    let len = if prefix == 255 {
        let real = u16::from_be_bytes([record[*offset], record[*offset + 1]]) as usize;
        *offset += 2;
        real
    } else {
        prefix
    };
    *offset += len;
    len
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("0x");
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

impl StoragePlugin for DumpStorage {
    fn name(&self) -> &'static str {
        "dump"
    }

    fn process(&mut self, message: &Arc<Message>) -> Result<(), StorageError> {
        self.metrics.message_received();
        match self.dump_message(message) {
            Ok(records) => {
                self.metrics.message_stored(records);
                Ok(())
            }
            Err(e) => {
                self.metrics.write_error();
                Err(e.into())
            }
        }
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.out.flush()?;
        Ok(())
    }
}
