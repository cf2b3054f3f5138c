//! # seccheck-wire
//!
//! Everything that crosses the process boundary between a remote sender
//! and the consumer:
//! - **Messages**: protobuf payloads for each streamed checkpoint kind.
//! - **Envelope**: the type-URL tagged `Any` wrapper and the closed
//!   [`Event`](envelope::Event) union used on the decode side.
//! - **Frame**: the length-prefixed header framing one envelope per write.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod envelope;
pub mod error;
pub mod frame;
pub mod messages;

pub use envelope::{Event, pack};
pub use error::FrameError;
pub use frame::{EncodedFrame, Frame, Header};
