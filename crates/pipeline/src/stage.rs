//! Transform stage runner
//!
//! One thread per transform: read from the input buffer, let the transform
//! decide, and either forward the resulting Messages to the output buffer
//! (blocking, so backpressure propagates) or drop. The input slot is
//! released exactly once on every path, including transform errors.
//!
//! Closure flows downstream: when the input drains to `None`, the stage
//! closes the transform, closes its output buffer and exits.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use flowcol_protocol::Message;
use flowcol_transform::{Transform, Verdict};

use crate::error::PipelineError;
use crate::ring::RingBuffer;

/// Stage threads are the sole consumer of their input buffer
const STAGE_CONSUMER: usize = 0;

/// Spawn the thread driving one transform between two buffers
pub fn spawn_stage(
    mut transform: Box<dyn Transform>,
    input: Arc<RingBuffer<Message>>,
    output: Arc<RingBuffer<Message>>,
) -> JoinHandle<()> {
    let name = transform.name();
    thread::Builder::new()
        .name(format!("stage-{name}"))
        .spawn(move || {
            debug!(stage = name, "transform stage running");
            while let Some(message) = input.read(STAGE_CONSUMER) {
                match transform.process(message) {
                    Ok(Verdict::Forward(outs)) => {
                        let mut forwarded = false;
                        for out in outs {
                            match output.write(out, true) {
                                Ok(()) => forwarded = true,
                                Err(PipelineError::QueueClosed) => {
                                    // Downstream is gone; nothing left to forward to.
                                    warn!(stage = name, "output queue closed, draining input");
                                    break;
                                }
                                Err(e) => {
                                    error!(stage = name, %e, "forward failed");
                                    break;
                                }
                            }
                        }
                        input.release(STAGE_CONSUMER, forwarded);
                    }
                    Ok(Verdict::Drop) => input.release(STAGE_CONSUMER, false),
                    Err(e) => {
                        warn!(stage = name, %e, "transform error, message dropped");
                        input.release(STAGE_CONSUMER, false);
                    }
                }
            }
            transform.close();
            output.close();
            debug!(stage = name, "transform stage stopped");
        })
        .expect("spawn stage thread")
}
