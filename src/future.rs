//! Producer-side write futures.
//!
//! [`WriteFuture`] is handed back by `write_async`. It is pollable from any
//! async context and additionally offers a blocking [`wait`](WriteFuture::wait)
//! for the synchronous write path. The matching [`WritePromise`] is resolved
//! by a completion worker; the decision to complete is made under the output
//! lock, the resolution itself happens off the loop thread.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::{Condvar, Mutex};

use crate::error::Error;

struct PromiseState {
    result: Option<Result<(), Error>>,
    waker: Option<Waker>,
    completed: bool,
}

struct Inner {
    state: Mutex<PromiseState>,
    done: Condvar,
}

impl Inner {
    fn new() -> Arc<Self> {
        Arc::new(Inner {
            state: Mutex::new(PromiseState {
                result: None,
                waker: None,
                completed: false,
            }),
            done: Condvar::new(),
        })
    }

    fn fulfill(&self, result: Result<(), Error>) {
        let waker = {
            let mut state = self.state.lock();
            debug_assert!(!state.completed, "promise fulfilled twice");
            state.result = Some(result);
            state.completed = true;
            state.waker.take()
        };
        self.done.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Future returned by `write_async`. Resolves when the write's bytes have
/// been accepted under the pre-completion budget, or with the connection's
/// latched write error.
pub struct WriteFuture {
    inner: Arc<Inner>,
}

impl WriteFuture {
    /// An already-successful future (fast path).
    pub(crate) fn ready() -> Self {
        let inner = Inner::new();
        inner.fulfill(Ok(()));
        WriteFuture { inner }
    }

    /// Create an unresolved promise/future pair.
    pub(crate) fn pair() -> (WritePromise, WriteFuture) {
        let inner = Inner::new();
        (
            WritePromise {
                inner: Some(inner.clone()),
            },
            WriteFuture { inner },
        )
    }

    /// Whether the future has been resolved.
    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().completed
    }

    /// Block the calling thread until the write completes.
    pub fn wait(self) -> Result<(), Error> {
        let mut state = self.inner.state.lock();
        while !state.completed {
            self.inner.done.wait(&mut state);
        }
        state.result.take().unwrap_or(Ok(()))
    }
}

impl Future for WriteFuture {
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        let mut state = self.inner.state.lock();
        if let Some(result) = state.result.take() {
            return Poll::Ready(result);
        }
        if state.completed {
            // Result already consumed by an earlier poll or wait.
            return Poll::Ready(Ok(()));
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Completion handle for a queued producer write.
///
/// Dropping an unresolved promise fails the future with `ECANCELED` so a
/// blocked producer can never hang across teardown.
pub(crate) struct WritePromise {
    inner: Option<Arc<Inner>>,
}

impl WritePromise {
    pub fn complete(mut self, result: Result<(), Error>) {
        if let Some(inner) = self.inner.take() {
            inner.fulfill(result);
        }
    }
}

impl Drop for WritePromise {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.fulfill(Err(Error::Io(io::Error::from_raw_os_error(
                libc::ECANCELED,
            ))));
        }
    }
}
