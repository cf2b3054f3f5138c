//! Length-prefixed wire frame.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! offset 0   u32  message_size   (whole frame, these 4 bytes included)
//! offset 4   u16  header_size    (header bytes after offset 4; 6 today)
//! offset 6   u32  dropped_count
//! offset 4 + header_size         envelope bytes
//! ```
//!
//! Decoders honour the in-band `header_size`, so later header versions can
//! append fields without breaking older consumers.

use std::io::IoSlice;

use prost::Message;
use prost_types::Any;

use crate::error::FrameError;

/// Size of the `message_size` field.
const SIZE_FIELD_LEN: usize = 4;

/// `header_size` written by this version.
pub const CURRENT_HEADER_SIZE: u16 = 6;

/// Total header length written by this version.
pub const HEADER_LEN: usize = SIZE_FIELD_LEN + CURRENT_HEADER_SIZE as usize;

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Size of the whole frame, header included.
    pub message_size: u32,
    /// Header bytes following the size field.
    pub header_size: u16,
    /// Events the sender lost since its previous frame.
    pub dropped_count: u32,
}

impl Header {
    /// Builds the current-version header for a payload of `payload_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Oversized`] if the frame would exceed `max`.
    pub fn for_payload(
        payload_len: usize,
        dropped_count: u32,
        max: usize,
    ) -> Result<Self, FrameError> {
        let size = payload_len + HEADER_LEN;
        let message_size = u32::try_from(size)
            .ok()
            .filter(|_| size <= max)
            .ok_or(FrameError::Oversized { size, max })?;
        Ok(Self {
            message_size,
            header_size: CURRENT_HEADER_SIZE,
            dropped_count,
        })
    }

    /// Serializes the header in the current layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.message_size.to_le_bytes());
        out[4..6].copy_from_slice(&self.header_size.to_le_bytes());
        out[6..10].copy_from_slice(&self.dropped_count.to_le_bytes());
        out
    }

    /// Number of payload bytes the header declares.
    fn payload_size(&self) -> Option<usize> {
        (self.message_size as usize)
            .checked_sub(SIZE_FIELD_LEN + usize::from(self.header_size))
            .filter(|&n| n > 0)
    }
}

/// A frame ready to be written with a single vectored write.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    header: [u8; HEADER_LEN],
    payload: Vec<u8>,
}

impl EncodedFrame {
    /// Frames an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Oversized`] if the encoded envelope does not fit
    /// in a frame of `max` bytes.
    pub fn new(any: &Any, dropped_count: u32, max: usize) -> Result<Self, FrameError> {
        let payload = any.encode_to_vec();
        let header = Header::for_payload(payload.len(), dropped_count, max)?;
        Ok(Self {
            header: header.to_bytes(),
            payload,
        })
    }

    /// Header and payload as the two buffers of a vectored write.
    #[must_use]
    pub fn io_slices(&self) -> [IoSlice<'_>; 2] {
        [IoSlice::new(&self.header), IoSlice::new(&self.payload)]
    }

    /// Total frame length.
    #[must_use]
    pub fn len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Always false: a frame carries at least its header.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Contiguous copy of the frame.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// A parsed frame borrowing its payload from the read buffer.
#[derive(Debug)]
pub struct Frame<'a> {
    /// Decoded header.
    pub header: Header,
    /// Envelope bytes, exactly as long as the header declares.
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parses one frame out of a single read.
    ///
    /// Partial frames are rejected rather than reassembled: a
    /// message-boundary-preserving transport delivers each write whole.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] describing why the frame was dropped.
    pub fn parse(buf: &'a [u8], max: usize) -> Result<Self, FrameError> {
        let Some(size_bytes) = buf.first_chunk::<4>() else {
            return Err(FrameError::Short { len: buf.len() });
        };
        let message_size = u32::from_le_bytes(*size_bytes);
        if message_size as usize > max {
            return Err(FrameError::Oversized {
                size: message_size as usize,
                max,
            });
        }

        let Some(&[lo, hi]) = buf.get(4..6).and_then(|b| b.first_chunk::<2>()) else {
            return Err(FrameError::Short { len: buf.len() });
        };
        let header_size = u16::from_le_bytes([lo, hi]);
        let dropped_count = if header_size >= CURRENT_HEADER_SIZE {
            buf.get(6..10)
                .and_then(|b| b.first_chunk::<4>())
                .map(|b| u32::from_le_bytes(*b))
                .ok_or(FrameError::Short { len: buf.len() })?
        } else {
            0
        };
        let header = Header {
            message_size,
            header_size,
            dropped_count,
        };

        let payload_size = header.payload_size().ok_or(FrameError::HeaderTooLarge {
            header_size,
            message_size,
        })?;
        let payload = buf
            .get(SIZE_FIELD_LEN + usize::from(header_size)..)
            .unwrap_or_default();
        if payload.len() < payload_size {
            return Err(FrameError::Truncated {
                got: payload.len(),
                expected: payload_size,
            });
        }
        Ok(Self {
            header,
            payload: &payload[..payload_size],
        })
    }

    /// Decodes the envelope carried by this frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Envelope`] if the payload is not a valid `Any`.
    pub fn envelope(&self) -> Result<Any, FrameError> {
        Ok(Any::decode(self.payload)?)
    }
}
