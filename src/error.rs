use std::io;

use thiserror::Error;

/// Errors returned by the flowline write path.
#[derive(Debug, Error)]
pub enum Error {
    /// Async write failed. Carries the errno-derived error from the stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The event loop rejected a posted task (shutting down or gone).
    #[error("event loop unavailable")]
    LoopUnavailable,
    /// The event loop thread panicked while running a task.
    #[error("event loop thread panicked")]
    LoopPanicked,
    /// Synchronous failure while initiating a write or shutdown request.
    #[error("submission: {0}")]
    Submit(String),
    /// Invalid configuration value.
    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Materialize the error for a completion status (`< 0` means `-errno`).
    pub(crate) fn from_status(status: i32) -> Error {
        debug_assert!(status < 0, "from_status called with non-error status {status}");
        Error::Io(io::Error::from_raw_os_error(-status))
    }
}
