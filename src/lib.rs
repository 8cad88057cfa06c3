//! flowline — the outbound write path of an event-loop connection.
//!
//! flowline sits between request-handling code (which produces response
//! bytes from arbitrary threads) and an async stream handle whose I/O must
//! be initiated from one designated event-loop thread. It copies producer
//! buffers into pooled fixed-size blocks, coalesces them into batches,
//! drains batches on the loop thread with at most three in-flight drains,
//! and completes producer futures under a 64 KiB pre-completion budget so
//! fast producers learn to slow down.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowline::{
//!     BlockPool, BufView, CompletionPool, Config, EndKind, Error, LoopThread,
//!     NullTracer, ShutdownDone, SocketHandle, SocketOutput, Supervisor, WriteDone,
//! };
//!
//! struct EchoSink;
//!
//! impl SocketHandle for EchoSink {
//!     fn submit_write(&self, bufs: &[BufView], done: WriteDone) -> Result<(), Error> {
//!         let n: usize = bufs.iter().map(BufView::len).sum();
//!         done(n as i32)
//!     }
//!     fn submit_shutdown(&self, done: ShutdownDone) -> Result<(), Error> {
//!         done(0)
//!     }
//!     fn is_closed(&self) -> bool {
//!         false
//!     }
//!     fn dispose(&self) {}
//! }
//!
//! struct NoopSupervisor;
//!
//! impl Supervisor for NoopSupervisor {
//!     fn abort(&self) {}
//! }
//!
//! fn main() -> Result<(), Error> {
//!     let config = Config::default();
//!     let loop_thread = LoopThread::spawn()?;
//!     let output = SocketOutput::new(
//!         1,
//!         Arc::new(EchoSink),
//!         Arc::new(loop_thread.handle()),
//!         Arc::new(BlockPool::new(&config)),
//!         Arc::new(CompletionPool::new(&config)?),
//!         Arc::new(NoopSupervisor),
//!         Arc::new(NullTracer),
//!     );
//!     output.write(b"hello", true)?;
//!     output.end(EndKind::Disconnect)?;
//!     loop_thread.join()
//! }
//! ```
//!
//! # Model
//!
//! Two threads matter: producer threads calling [`SocketOutput::write_async`]
//! and the loop thread servicing the stream handle. One per-connection mutex
//! guards the state machine; producer promises are resolved by a worker pool
//! so producer code never runs inline on the loop thread. Bytes go out in
//! call order, and promises complete in admission order.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod batch;
pub(crate) mod metrics;

// ── Public modules ──────────────────────────────────────────────────────
pub mod block;
pub mod completions;
pub mod config;
pub mod error;
pub mod filter;
pub mod future;
pub mod handler;
pub mod loop_thread;
pub mod output;

// ── Re-exports: write path ──────────────────────────────────────────────

/// The per-connection outbound write path.
pub use output::SocketOutput;
/// How `end` tears the connection down (half-close or full close).
pub use output::EndKind;
/// Budget of pre-completed bytes whose blocks are still in flight.
pub use output::MAX_BYTES_PRE_COMPLETED;
/// Maximum drains simultaneously posted to the event loop.
pub use output::MAX_PENDING_WRITES;
/// Future returned by [`SocketOutput::write_async`].
pub use future::WriteFuture;

// ── Re-exports: blocks ──────────────────────────────────────────────────

/// A fixed-capacity pooled byte buffer with start/end cursors and a pin count.
pub use block::Block;
/// Pool of fixed-size blocks, safe for lease/return from any thread.
pub use block::BlockPool;
/// Raw (pointer, length) view of a block's populated bytes.
pub use block::BufView;
/// Capacity of a single pooled block in bytes.
pub use block::BLOCK_CAPACITY;

// ── Re-exports: collaborator contracts ──────────────────────────────────

/// Runs producer promise completions off the loop thread.
pub use handler::Completions;
/// A producer-promise completion handed to the worker pool.
pub use handler::CompletionTask;
/// Posts work to the event-loop thread.
pub use handler::Dispatcher;
/// A task posted to the event-loop thread.
pub use handler::LoopTask;
/// Tracer that discards every event.
pub use handler::NullTracer;
/// Completion callback for an async shutdown-send request.
pub use handler::ShutdownDone;
/// The async stream handle of one connection.
pub use handler::SocketHandle;
/// Connection supervisor with idempotent `abort`.
pub use handler::Supervisor;
/// Structured per-connection tracing of the write path.
pub use handler::Tracer;
/// Completion callback for an async write request.
pub use handler::WriteDone;

// ── Re-exports: infrastructure ──────────────────────────────────────────

/// Pool and worker configuration.
pub use config::Config;
/// Worker pool draining promise completions.
pub use completions::CompletionPool;
/// Errors returned by the flowline write path.
pub use error::Error;
/// Pass-through decorator over a stream handle.
pub use filter::PassThroughSocket;
/// Posting handle for a [`LoopThread`].
pub use loop_thread::LoopHandle;
/// A dedicated event-loop thread driven by posted tasks.
pub use loop_thread::LoopThread;
