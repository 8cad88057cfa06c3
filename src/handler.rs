//! Collaborator contracts of the write path.
//!
//! flowline owns the buffering and scheduling policy of a connection's
//! outbound side; everything it touches beyond that — the event loop, the
//! async stream handle, the connection supervisor, tracing, and the
//! completion workers — is reached through the traits in this module.

use crate::block::BufView;
use crate::error::Error;

/// A task posted to the event-loop thread. An `Err` from the task is a
/// structural failure that stops the loop.
pub type LoopTask = Box<dyn FnOnce() -> Result<(), Error> + Send + 'static>;

/// Completion callback for an async write request. Runs on the loop thread
/// with the request status (`>= 0` bytes transferred, `< 0` is `-errno`).
pub type WriteDone = Box<dyn FnOnce(i32) -> Result<(), Error> + Send + 'static>;

/// Completion callback for an async shutdown-send request. Runs on the loop
/// thread with the request status.
pub type ShutdownDone = Box<dyn FnOnce(i32) -> Result<(), Error> + Send + 'static>;

/// A producer-promise completion handed to the worker pool.
pub type CompletionTask = Box<dyn FnOnce() + Send + 'static>;

/// Posts work to the event-loop thread.
pub trait Dispatcher: Send + Sync {
    /// Schedule `task` to run on the loop thread.
    ///
    /// Must enqueue, never run the task inline: posts are issued while the
    /// output lock is held, and the task re-acquires that lock.
    /// Fails synchronously when the loop is shutting down.
    fn post(&self, task: LoopTask) -> Result<(), Error>;
}

/// The async stream handle of one connection.
///
/// Submission methods are only invoked from the loop thread. A submitted
/// request's buffers stay pinned until its completion callback has run.
pub trait SocketHandle: Send + Sync {
    /// Submit one gathered write of `bufs`. `done` fires on the loop thread
    /// once the request completes. An `Err` return means the request was
    /// never submitted and `done` was dropped unused.
    fn submit_write(&self, bufs: &[BufView], done: WriteDone) -> Result<(), Error>;

    /// Submit a shutdown of the send side (half-close).
    fn submit_shutdown(&self, done: ShutdownDone) -> Result<(), Error>;

    /// Whether the handle has been closed or disposed.
    fn is_closed(&self) -> bool;

    /// Synchronously close the handle. Idempotent.
    fn dispose(&self);
}

/// Connection supervisor. `abort` is idempotent and triggers supervised
/// teardown of the whole connection (both directions).
pub trait Supervisor: Send + Sync {
    fn abort(&self);
}

/// Structured per-connection tracing of the write path.
///
/// All methods default to no-ops so implementors opt into the events they
/// care about.
pub trait Tracer: Send + Sync {
    /// A producer write of `nbytes` was accepted.
    fn connection_write(&self, id: u64, nbytes: usize) {
        let _ = (id, nbytes);
    }

    /// A write request completed with `status`.
    fn connection_write_callback(&self, id: u64, status: i32) {
        let _ = (id, status);
    }

    /// A shutdown-send completed with `status`.
    fn connection_wrote_fin(&self, id: u64, status: i32) {
        let _ = (id, status);
    }

    /// The stream handle was disposed.
    fn connection_stop(&self, id: u64) {
        let _ = id;
    }
}

/// Tracer that discards every event.
pub struct NullTracer;

impl Tracer for NullTracer {}

/// Runs producer promise completions off the loop thread.
///
/// Required so producer code woken by a completion (which may immediately
/// call `write_async` again) never re-enters the output lock on the loop
/// thread.
pub trait Completions: Send + Sync {
    fn dispatch(&self, task: CompletionTask);
}
