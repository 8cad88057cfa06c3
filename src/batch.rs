//! Pending write batches and the loop-thread teardown pipeline.
//!
//! A [`WriteBatch`] accumulates blocks and teardown flags until a drain picks
//! it up. On the loop thread it runs a three-stage pipeline: write the
//! gathered blocks, then shutdown-send if requested, then disconnect if
//! requested, and finally feeds the captured status back into the output's
//! completion accounting.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::{Block, BufView};
use crate::error::Error;
use crate::metrics;
use crate::output::Shared;

/// A batch scheduled for one pass through the pipeline.
pub(crate) struct WriteBatch {
    /// Blocks to write, in producer submission order.
    pub(crate) blocks: Vec<Block>,
    /// Request a half-close after the write completes.
    pub(crate) shutdown_send: bool,
    /// Request a full close after the shutdown stage.
    pub(crate) disconnect: bool,
    /// Status captured by the write completion callback.
    pub(crate) write_status: i32,
    /// Status captured by the shutdown completion callback.
    #[allow(dead_code)]
    pub(crate) shutdown_status: i32,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch {
            blocks: Vec::new(),
            shutdown_send: false,
            disconnect: false,
            write_status: 0,
            shutdown_status: 0,
        }
    }

    /// Total payload bytes across all blocks.
    pub fn bytes(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }
}

/// Shared slot holding the batch while its pipeline is in flight.
///
/// Completion callbacks are `FnOnce` boxes, so the batch cannot ride through
/// them by value: a synchronous submission failure would strand the blocks
/// inside a dropped closure. The slot lets whichever context hits the
/// failure take the batch back and reclaim its blocks.
#[derive(Clone)]
pub(crate) struct InFlight {
    slot: Arc<Mutex<Option<WriteBatch>>>,
}

impl InFlight {
    pub fn new(batch: WriteBatch) -> Self {
        InFlight {
            slot: Arc::new(Mutex::new(Some(batch))),
        }
    }

    fn take(&self) -> Option<WriteBatch> {
        self.slot.lock().take()
    }

    /// Stage 1: submit the gathered write, or skip ahead when there is
    /// nothing to write or the socket is already closed.
    pub fn write_if_needed(&self, out: &Arc<Shared>) -> Result<(), Error> {
        let submit = {
            let slot = self.slot.lock();
            let batch = slot.as_ref().expect("in-flight batch missing");
            if batch.blocks.is_empty() || out.socket().is_closed() {
                None
            } else {
                let views: Vec<BufView> = batch.blocks.iter().map(Block::view).collect();
                Some((views, batch.bytes()))
            }
        };

        let (views, nbytes) = match submit {
            Some(parts) => parts,
            None => return self.shutdown_if_needed(out),
        };

        metrics::WRITES_SUBMITTED.increment();
        metrics::BYTES_SUBMITTED.add(nbytes as u64);

        let this = self.clone();
        let next = Arc::clone(out);
        let result = out.socket().submit_write(
            &views,
            Box::new(move |status| {
                if let Some(batch) = this.slot.lock().as_mut() {
                    batch.write_status = status;
                }
                next.tracer().connection_write_callback(next.conn_id(), status);
                this.shutdown_if_needed(&next)
            }),
        );

        if let Err(e) = result {
            self.reclaim(out);
            return Err(e);
        }
        Ok(())
    }

    /// Stage 2: half-close the send side if the batch requested it.
    pub fn shutdown_if_needed(&self, out: &Arc<Shared>) -> Result<(), Error> {
        let needed = {
            let slot = self.slot.lock();
            let batch = slot.as_ref().expect("in-flight batch missing");
            batch.shutdown_send && !out.socket().is_closed()
        };
        if !needed {
            return self.disconnect_if_needed(out);
        }

        metrics::FINS_SENT.increment();

        let this = self.clone();
        let next = Arc::clone(out);
        let result = out.socket().submit_shutdown(Box::new(move |status| {
            if let Some(batch) = this.slot.lock().as_mut() {
                batch.shutdown_status = status;
            }
            next.tracer().connection_wrote_fin(next.conn_id(), status);
            this.disconnect_if_needed(&next)
        }));

        if let Err(e) = result {
            self.reclaim(out);
            return Err(e);
        }
        Ok(())
    }

    /// Stage 3: dispose the handle if the batch requested a disconnect,
    /// then hand the batch to completion accounting.
    pub fn disconnect_if_needed(&self, out: &Arc<Shared>) -> Result<(), Error> {
        let needed = {
            let slot = self.slot.lock();
            let batch = slot.as_ref().expect("in-flight batch missing");
            batch.disconnect && !out.socket().is_closed()
        };
        if needed {
            out.socket().dispose();
            out.tracer().connection_stop(out.conn_id());
        }
        self.complete(out)
    }

    fn complete(&self, out: &Arc<Shared>) -> Result<(), Error> {
        let batch = self.take().expect("in-flight batch already completed");
        out.on_write_completed(batch)
    }

    /// Structural submission failure: give the drain slot back and return
    /// every block to the pool. The error propagates to the loop.
    fn reclaim(&self, out: &Arc<Shared>) {
        if let Some(batch) = self.take() {
            out.reclaim_failed_batch(batch);
        }
    }
}
