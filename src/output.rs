//! The per-connection outbound write path.
//!
//! [`SocketOutput`] accepts writes from any thread, copies them into pooled
//! blocks, coalesces them into a pending batch, and schedules drains onto the
//! event-loop thread — at most [`MAX_PENDING_WRITES`] in flight. Producer
//! futures complete immediately while the total of unreleased pre-completed
//! bytes stays under [`MAX_BYTES_PRE_COMPLETED`]; beyond that, promises queue
//! and complete in admission order as write callbacks release blocks.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::batch::{InFlight, WriteBatch};
use crate::block::BlockPool;
use crate::error::Error;
use crate::future::{WriteFuture, WritePromise};
use crate::handler::{Completions, Dispatcher, SocketHandle, Supervisor, Tracer};
use crate::metrics;

/// Maximum drains simultaneously posted to the event loop.
pub const MAX_PENDING_WRITES: u32 = 3;

/// Budget of bytes whose producer future has been completed while their
/// blocks are still held by an in-flight write.
pub const MAX_BYTES_PRE_COMPLETED: usize = 65536;

/// How `end` tears the connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKind {
    /// Half-close the send side after pending data drains.
    ShutdownSend,
    /// Fully close the stream handle after pending data drains.
    Disconnect,
}

/// A producer whose promise is withheld by the pre-completion budget.
struct PendingWrite {
    len: usize,
    promise: WritePromise,
}

struct State {
    /// Drains posted but not yet completed. Never exceeds [`MAX_PENDING_WRITES`].
    writes_pending: u32,
    /// Bytes pre-completed to producers whose blocks are still held.
    /// Transiently negative inside a completion pass, non-negative at every
    /// lock release.
    bytes_pre_completed: i64,
    /// First write error, as a negative errno. Latched; later completions
    /// propagate it.
    last_error: Option<i32>,
    /// The accumulating batch, if any.
    next_batch: Option<WriteBatch>,
    /// Admitted producers awaiting completion, in admission order.
    tasks_pending: VecDeque<PendingWrite>,
}

/// Shared core of one connection's output. Public operations live on
/// [`SocketOutput`]; the loop-thread pipeline reaches this through `Arc`.
pub(crate) struct Shared {
    conn_id: u64,
    socket: Arc<dyn SocketHandle>,
    dispatcher: Arc<dyn Dispatcher>,
    pool: Arc<BlockPool>,
    completions: Arc<dyn Completions>,
    supervisor: Arc<dyn Supervisor>,
    tracer: Arc<dyn Tracer>,
    state: Mutex<State>,
}

impl Shared {
    #[inline]
    pub(crate) fn socket(&self) -> &dyn SocketHandle {
        &*self.socket
    }

    #[inline]
    pub(crate) fn tracer(&self) -> &dyn Tracer {
        &*self.tracer
    }

    #[inline]
    pub(crate) fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Post a drain for this connection. Called with the state lock held;
    /// the dispatcher only enqueues, so no lock is re-entered here.
    fn schedule_drain(self: &Arc<Self>) -> Result<(), Error> {
        metrics::DRAINS_POSTED.increment();
        let shared = Arc::clone(self);
        self.dispatcher.post(Box::new(move || shared.drain()))
    }

    /// Loop-thread entry: move the accumulated batch into the pipeline.
    fn drain(self: &Arc<Self>) -> Result<(), Error> {
        let batch = {
            let mut st = self.state.lock();
            match st.next_batch.take() {
                Some(batch) => batch,
                None => {
                    // Speculative drain: the batch was picked up by an
                    // earlier callback's repost. Harmless.
                    metrics::DRAINS_EMPTY.increment();
                    debug_assert!(st.writes_pending > 0, "drain without a posted slot");
                    st.writes_pending -= 1;
                    return Ok(());
                }
            }
        };
        InFlight::new(batch).write_if_needed(self)
    }

    /// Completion accounting, on the loop thread after the pipeline ran.
    pub(crate) fn on_write_completed(self: &Arc<Self>, batch: WriteBatch) -> Result<(), Error> {
        let WriteBatch {
            blocks,
            write_status,
            ..
        } = batch;

        let mut abort = false;
        let mut schedule_err = None;
        let mut ready: Vec<(WritePromise, Option<i32>)> = Vec::new();

        {
            let mut st = self.state.lock();

            if write_status < 0 {
                metrics::WRITE_ERRORS.increment();
                if st.last_error.is_none() {
                    st.last_error = Some(write_status);
                }
                abort = true;
            }

            if st.next_batch.is_some() {
                // Another batch accumulated while this one was in flight:
                // re-use the drain slot, writes_pending unchanged.
                if let Err(e) = self.schedule_drain() {
                    st.writes_pending -= 1;
                    schedule_err = Some(e);
                }
            } else {
                debug_assert!(st.writes_pending > 0, "completion without a posted slot");
                st.writes_pending -= 1;
            }

            for mut block in blocks {
                st.bytes_pre_completed -= block.len() as i64;
                block.unpin();
                self.pool.release(block);
            }

            let err = st.last_error;
            let mut bytes_left = MAX_BYTES_PRE_COMPLETED as i64 - st.bytes_pre_completed;
            while let Some(head) = st.tasks_pending.front() {
                // Budget is checked against the head only, so one oversized
                // write can still drain; admission order is preserved.
                if head.len as i64 > bytes_left {
                    break;
                }
                let task = st.tasks_pending.pop_front().expect("peeked head vanished");
                st.bytes_pre_completed += task.len as i64;
                bytes_left -= task.len as i64;
                ready.push((task.promise, err));
            }

            debug_assert!(
                st.bytes_pre_completed >= 0,
                "pre-completed bytes negative after completion pass: {}",
                st.bytes_pre_completed
            );
        }

        // Abort may re-enter this object from the read side; never under the lock.
        if abort {
            self.supervisor.abort();
        }

        for (promise, err) in ready {
            self.completions.dispatch(Box::new(move || {
                promise.complete(match err {
                    None => Ok(()),
                    Some(status) => Err(Error::from_status(status)),
                });
            }));
        }

        match schedule_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// A pipeline stage failed to submit: free the drain slot and return
    /// every block. The structural error propagates to the loop separately.
    pub(crate) fn reclaim_failed_batch(&self, batch: WriteBatch) {
        {
            let mut st = self.state.lock();
            debug_assert!(st.writes_pending > 0, "reclaim without a posted slot");
            st.writes_pending -= 1;
        }
        self.pool.reclaim(batch.blocks);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // An undrained batch would otherwise leak its blocks from the pool's
        // accounting. Queued promises cancel themselves on drop.
        let st = self.state.get_mut();
        if let Some(batch) = st.next_batch.take() {
            self.pool.reclaim(batch.blocks);
        }
    }
}

/// The outbound write path of a single connection.
///
/// Cheap to clone; all clones share one state machine.
#[derive(Clone)]
pub struct SocketOutput {
    shared: Arc<Shared>,
}

impl SocketOutput {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn_id: u64,
        socket: Arc<dyn SocketHandle>,
        dispatcher: Arc<dyn Dispatcher>,
        pool: Arc<BlockPool>,
        completions: Arc<dyn Completions>,
        supervisor: Arc<dyn Supervisor>,
        tracer: Arc<dyn Tracer>,
    ) -> Self {
        SocketOutput {
            shared: Arc::new(Shared {
                conn_id,
                socket,
                dispatcher,
                pool,
                completions,
                supervisor,
                tracer,
                state: Mutex::new(State {
                    writes_pending: 0,
                    bytes_pre_completed: 0,
                    last_error: None,
                    next_batch: None,
                    tasks_pending: VecDeque::new(),
                }),
            }),
        }
    }

    /// Buffer `buf` for transmission. Callable from any thread.
    ///
    /// `immediate` schedules a drain; a non-immediate write relies on the
    /// caller issuing an immediate write shortly after (framing code pairs
    /// them), and its future completes at once. `shutdown_send` and
    /// `disconnect` are OR'd into the pending batch and take effect after
    /// its data drains.
    ///
    /// The returned future resolves once the bytes fall under the
    /// pre-completion budget, or with the connection's latched write error.
    /// Dropping the future abandons the notification, not the write.
    ///
    /// Fails synchronously only when the drain cannot be posted to the
    /// event loop; the appended blocks are rolled back in that case.
    pub fn write_async(
        &self,
        buf: &[u8],
        immediate: bool,
        shutdown_send: bool,
        disconnect: bool,
    ) -> Result<WriteFuture, Error> {
        let shared = &self.shared;
        shared.tracer.connection_write(shared.conn_id, buf.len());
        metrics::BYTES_ACCEPTED.add(buf.len() as u64);

        // Copy before taking the lock; the critical section below is only
        // queue pushes and integer arithmetic.
        let blocks = shared.pool.copy_into_blocks(buf);
        let n = buf.len();

        let mut st = shared.state.lock();

        let batch = st.next_batch.get_or_insert_with(WriteBatch::new);
        let appended_at = batch.blocks.len();
        batch.blocks.extend(blocks);
        batch.shutdown_send |= shutdown_send;
        batch.disconnect |= disconnect;

        let mut queued = false;
        let future = if !immediate {
            // Always followed by an immediate write; drained together.
            st.bytes_pre_completed += n as i64;
            WriteFuture::ready()
        } else if st.last_error.is_none()
            && st.tasks_pending.is_empty()
            && st.bytes_pre_completed + n as i64 <= MAX_BYTES_PRE_COMPLETED as i64
        {
            st.bytes_pre_completed += n as i64;
            WriteFuture::ready()
        } else {
            metrics::WRITES_DEFERRED.increment();
            let (promise, future) = WriteFuture::pair();
            st.tasks_pending.push_back(PendingWrite { len: n, promise });
            queued = true;
            future
        };

        if immediate && st.writes_pending < MAX_PENDING_WRITES {
            match shared.schedule_drain() {
                Ok(()) => st.writes_pending += 1,
                Err(e) => {
                    // Roll back this call: its blocks and its completion-
                    // policy effect. Flags stay on the batch.
                    let batch = st.next_batch.as_mut().expect("batch vanished under lock");
                    let rolled = batch.blocks.split_off(appended_at);
                    if queued {
                        st.tasks_pending.pop_back();
                    } else {
                        st.bytes_pre_completed -= n as i64;
                    }
                    drop(st);
                    shared.pool.reclaim(rolled);
                    return Err(e);
                }
            }
        }

        drop(st);
        Ok(future)
    }

    /// Blocking form of [`write_async`](Self::write_async).
    pub fn write(&self, buf: &[u8], immediate: bool) -> Result<(), Error> {
        let future = self.write_async(buf, immediate, false, false)?;
        future.wait()
    }

    /// Flush pending data, then half-close or fully close the connection.
    pub fn end(&self, kind: EndKind) -> Result<(), Error> {
        let (shutdown_send, disconnect) = match kind {
            EndKind::ShutdownSend => (true, false),
            EndKind::Disconnect => (false, true),
        };
        self.write_async(&[], true, shutdown_send, disconnect)
            .map(drop)
    }
}
