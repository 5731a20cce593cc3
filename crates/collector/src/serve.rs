//! Pipeline assembly
//!
//! Builds the stage chain described by the configuration and runs the
//! input on the calling thread:
//!
//! ```text
//!   input ──> [ring] ──> (domain join?) ──> [ring] ──> output router
//!                                                        ├── domain A ──> storage
//!                                                        └── domain B ──> storage
//! ```
//!
//! Shutdown flows forward: when the input ends it closes the first ring,
//! each stage drains its input and closes its output, and the router
//! closes every Domain Context after the last message.

use std::sync::Arc;

use tracing::info;

use flowcol_pipeline::{spawn_stage, OutputRouter, RingBuffer};
use flowcol_protocol::Message;
use flowcol_storage::{DumpStorage, NullStorage, StoragePlugin};
use flowcol_templates::TemplateManager;
use flowcol_transform::DomainJoin;

use crate::config::Config;
use crate::input::{file::FileInput, udp::UdpInput, Ingestor};

pub fn run(config: Config) -> anyhow::Result<()> {
    let manager = Arc::new(TemplateManager::new());
    let queue_size = config.global.queue_size;

    let in_queue: Arc<RingBuffer<Message>> = Arc::new(RingBuffer::new(queue_size, 1));

    // Optional domain-join stage between input and router
    let (router_input, stage_handle) = match &config.join {
        Some(join) => {
            let mid = Arc::new(RingBuffer::new(queue_size, 1));
            let transform = DomainJoin::new(join.to_odid, Arc::clone(&manager));
            let handle = spawn_stage(Box::new(transform), Arc::clone(&in_queue), Arc::clone(&mid));
            info!(to_odid = join.to_odid, "domain join enabled");
            (mid, Some(handle))
        }
        None => (Arc::clone(&in_queue), None),
    };

    let plugin_names = config.storage.plugins.clone();
    let factory = Box::new(move |odid: u32| build_plugins(&plugin_names, odid));
    let router = OutputRouter::new(queue_size, factory);
    let router_handle = router.spawn(router_input);

    let mut ingestor = Ingestor::new(
        manager,
        Arc::clone(&in_queue),
        config.global.max_sets,
        config.global.udp_template_lifetime_secs,
    );

    if let Some(file) = &config.input.file {
        FileInput::open(&file.path)?.run(&mut ingestor)?;
    } else {
        UdpInput::bind(&config.input.udp)?.run(&mut ingestor)?;
    }

    in_queue.close();
    if let Some(handle) = stage_handle {
        let _ = handle.join();
    }
    let _ = router_handle.join();
    info!("collector stopped");
    Ok(())
}

fn build_plugins(names: &[String], odid: u32) -> Vec<Box<dyn StoragePlugin>> {
    names
        .iter()
        .map(|name| -> Box<dyn StoragePlugin> {
            match name.as_str() {
                "null" => Box::new(NullStorage::new()),
                // validate() already rejected anything else
                _ => Box::new(DumpStorage::stdout()),
            }
        })
        .inspect(|plugin| info!(odid, plugin = plugin.name(), "storage plugin attached"))
        .collect()
}
