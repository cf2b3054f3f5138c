//! Frame and envelope decoding errors.

use thiserror::Error;

/// Reasons a received frame is dropped.
///
/// None of these are fatal to the connection that carried the frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The buffer is too short to hold the fixed header fields.
    #[error("frame too short: {len} bytes")]
    Short {
        /// Bytes available.
        len: usize,
    },

    /// The declared message size exceeds the maximum event size.
    #[error("invalid message size {size}, maximum is {max}")]
    Oversized {
        /// Declared message size.
        size: usize,
        /// Largest size accepted.
        max: usize,
    },

    /// The declared header leaves no room for a payload.
    #[error("header size ({header_size}) is larger than message {message_size}")]
    HeaderTooLarge {
        /// Declared header size, excluding the size field.
        header_size: u16,
        /// Declared message size.
        message_size: u32,
    },

    /// Fewer payload bytes were read than the header declares.
    #[error("message was truncated, size: {got}, expected: {expected}")]
    Truncated {
        /// Payload bytes actually read.
        got: usize,
        /// Payload bytes declared by the header.
        expected: usize,
    },

    /// The envelope itself could not be decoded.
    #[error("invalid envelope: {0}")]
    Envelope(#[from] prost::DecodeError),

    /// The envelope type URL does not carry a type name.
    #[error("invalid type URL {url:?}")]
    InvalidTypeUrl {
        /// Type URL as received.
        url: String,
    },

    /// The envelope payload does not decode as the message its type names.
    #[error("invalid {name} payload: {source}")]
    Payload {
        /// Full message name from the type URL.
        name: String,
        /// Underlying decode error.
        source: prost::DecodeError,
    },
}
