//! Pass-through filter over a stream handle.
//!
//! Filtered connections wrap the raw handle in a decorator layer. The base
//! layer delegates everything unchanged; filtering layers override what they
//! intercept.

use crate::block::BufView;
use crate::error::Error;
use crate::handler::{ShutdownDone, SocketHandle, WriteDone};

/// A [`SocketHandle`] decorator that forwards every operation unchanged.
pub struct PassThroughSocket<S> {
    inner: S,
}

impl<S> PassThroughSocket<S> {
    pub fn new(inner: S) -> Self {
        PassThroughSocket { inner }
    }

    /// Borrow the wrapped handle.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwrap the inner handle.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: SocketHandle> SocketHandle for PassThroughSocket<S> {
    fn submit_write(&self, bufs: &[BufView], done: WriteDone) -> Result<(), Error> {
        self.inner.submit_write(bufs, done)
    }

    fn submit_shutdown(&self, done: ShutdownDone) -> Result<(), Error> {
        self.inner.submit_shutdown(done)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn dispose(&self) {
        self.inner.dispose()
    }
}
