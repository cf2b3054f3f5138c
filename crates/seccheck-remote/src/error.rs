//! Send-side transport errors.
//!
//! These never leave the crate's checker methods: they are logged and the
//! event is counted as dropped.

use seccheck_wire::FrameError;
use thiserror::Error;

/// Why an event did not reach the consumer.
#[derive(Debug, Error)]
pub enum SendError {
    /// The event could not be framed.
    #[error("framing failed: {0}")]
    Frame(#[from] FrameError),

    /// The socket write failed.
    #[error("write failed: {0}")]
    Io(std::io::Error),

    /// The socket accepted only part of the frame.
    #[error("partial write: {written} of {expected} bytes")]
    Partial {
        /// Bytes accepted.
        written: usize,
        /// Frame length.
        expected: usize,
    },
}
