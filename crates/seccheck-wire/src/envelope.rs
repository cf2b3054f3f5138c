//! Type-tagged envelope.
//!
//! Every payload is wrapped in a protobuf `Any` whose type URL is
//! [`TYPE_URL_PREFIX`] followed by the message's full name. On the decode
//! side the known names map onto the closed [`Event`] union; anything else
//! becomes [`Event::Unknown`].

use prost::{Message, Name};
use prost_types::Any;
use seccheck_common::constants::TYPE_URL_PREFIX;

use crate::error::FrameError;
use crate::messages::{Exit, Open, Read, Start, Syscall};

/// Wraps `msg` in an `Any` envelope.
pub fn pack<M: Name>(msg: &M) -> Any {
    Any {
        type_url: format!("{TYPE_URL_PREFIX}{}", M::full_name()),
        value: msg.encode_to_vec(),
    }
}

/// Returns the message full name carried by `any`, with the URL prefix removed.
///
/// # Errors
///
/// Returns [`FrameError::InvalidTypeUrl`] if the URL does not start with the
/// prefix or names nothing after it.
pub fn type_name(any: &Any) -> Result<&str, FrameError> {
    match any.type_url.strip_prefix(TYPE_URL_PREFIX) {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(FrameError::InvalidTypeUrl {
            url: any.type_url.clone(),
        }),
    }
}

/// A decoded checkpoint event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `gvisor.syscall.Open`.
    Open(Open),
    /// `gvisor.syscall.Read`.
    Read(Read),
    /// `gvisor.syscall.Syscall`.
    Syscall(Syscall),
    /// `gvisor.container.Start`.
    ContainerStart(Start),
    /// A type this build does not know how to decode.
    Unknown {
        /// Full message name from the type URL.
        name: String,
        /// Raw encoded message.
        value: Vec<u8>,
    },
}

impl Event {
    /// Decodes the envelope payload according to its type name.
    ///
    /// # Errors
    ///
    /// Returns an error if the type URL is malformed or the payload does not
    /// decode as the named message.
    pub fn decode(any: &Any) -> Result<Self, FrameError> {
        let name = type_name(any)?;
        let value = any.value.as_slice();
        let event = if name == Open::full_name() {
            Self::Open(decode_as(name, value)?)
        } else if name == Read::full_name() {
            Self::Read(decode_as(name, value)?)
        } else if name == Syscall::full_name() {
            Self::Syscall(decode_as(name, value)?)
        } else if name == Start::full_name() {
            Self::ContainerStart(decode_as(name, value)?)
        } else {
            Self::Unknown {
                name: name.to_owned(),
                value: any.value.clone(),
            }
        };
        Ok(event)
    }

    /// Full message name of this event.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Open(_) => Open::full_name(),
            Self::Read(_) => Read::full_name(),
            Self::Syscall(_) => Syscall::full_name(),
            Self::ContainerStart(_) => Start::full_name(),
            Self::Unknown { name, .. } => name.clone(),
        }
    }

    /// Syscall outcome, present only for events emitted at syscall exit.
    #[must_use]
    pub const fn exit(&self) -> Option<&Exit> {
        match self {
            Self::Open(m) => m.exit.as_ref(),
            Self::Read(m) => m.exit.as_ref(),
            Self::Syscall(m) => m.exit.as_ref(),
            Self::ContainerStart(_) | Self::Unknown { .. } => None,
        }
    }
}

fn decode_as<M: Message + Default>(name: &str, value: &[u8]) -> Result<M, FrameError> {
    M::decode(value).map_err(|source| FrameError::Payload {
        name: name.to_owned(),
        source,
    })
}
