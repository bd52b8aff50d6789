//! Driver error taxonomy.
//!
//! Every fallible session operation returns one of these kinds. Callers that
//! need the classic integer-coded surface (language bindings, C callers) map
//! through [`Error::exit_code`]; success is `Ok(())` and code 0.

use std::io;

/// Convenience alias for driver results.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the session API boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad caller input, or the device rejected a command with an `'I'` ACK.
    /// Carries the complaint or the device's raw response.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Operation requires a prepared session.
    #[error("session is not prepared")]
    BoardNotCreated,

    /// The settings handshake failed, or too many latency probes were lost.
    #[error("board is not ready")]
    BoardNotReady,

    /// Short write on the control socket, or the stop drain never cleared.
    #[error("failed to write to board")]
    BoardWriteError,

    /// Start was called while streaming, or the ACK read kept seeing
    /// data-sized frames.
    #[error("stream is already running")]
    StreamAlreadyRunning,

    /// Capture buffer capacity outside the accepted range.
    #[error("invalid capture buffer capacity: {0}")]
    InvalidBufferSize(usize),

    /// No data transaction arrived within the start-stream deadline.
    #[error("no data received within the sync deadline")]
    SyncTimeout,

    /// Stop was called on a session that is not streaming.
    #[error("streaming thread is not running")]
    StreamThreadNotRunning,

    /// Underlying socket or thread-spawn failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Stable integer code for this error kind; 0 is reserved for success.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArguments(_) => 1,
            Error::BoardNotCreated => 2,
            Error::BoardNotReady => 3,
            Error::BoardWriteError => 4,
            Error::StreamAlreadyRunning => 5,
            Error::InvalidBufferSize(_) => 6,
            Error::SyncTimeout => 7,
            Error::StreamThreadNotRunning => 8,
            Error::Io(_) => 9,
        }
    }
}
