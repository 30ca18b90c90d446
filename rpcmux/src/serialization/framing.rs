//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Multipart message framing.
//!
//! A message is a set of frames sent as one unit over a byte stream:
//!
//! ```text
//! +-------------------+---------------------------+---------------------------+-----
//! | Count (2 bytes)   | Length 0 (4) | Frame 0    | Length 1 (4) | Frame 1    | ...
//! +-------------------+---------------------------+---------------------------+-----
//! ```
//!
//! All integers are big-endian. [`FrameLimits`] bounds both the number of
//! frames and the size of each frame; a reader that sees a message exceeding
//! either bound fails without reading the oversized body, and the connection
//! is expected to be closed.
//!
//! ```rust
//! use bytes::Bytes;
//! use rpcmux::serialization::framing::{FrameLimits, read_message, write_message};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limits = FrameLimits::default();
//! let mut wire = Vec::new();
//! write_message(&mut wire, &[Bytes::from_static(b"id"), Bytes::from_static(b"body")], limits).await?;
//!
//! let mut reader = &wire[..];
//! let frames = read_message(&mut reader, limits).await?.expect("one message");
//! assert_eq!(frames.len(), 2);
//! assert_eq!(&frames[1][..], b"body");
//! # Ok(())
//! # }
//! ```

use crate::serialization::{DeserializationError, SerializationError};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default maximum size of a single frame (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum number of frames per message.
pub const DEFAULT_MAX_FRAMES: usize = 8;

/// Size of the frame count prefix.
pub const FRAME_COUNT_SIZE: usize = 2;

/// Size of each frame's length prefix.
pub const FRAME_LENGTH_SIZE: usize = 4;

/// Bounds enforced on every message read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Maximum number of frames in one message.
    pub max_frames: usize,
    /// Maximum size of one frame in bytes.
    pub max_frame_size: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl FrameLimits {
    fn check_count(&self, count: usize) -> Result<(), String> {
        if count > self.max_frames || count > u16::MAX as usize {
            return Err(format!(
                "message has {count} frames, maximum is {}",
                self.max_frames
            ));
        }
        Ok(())
    }

    fn check_size(&self, size: usize) -> Result<(), String> {
        if size > self.max_frame_size || size > u32::MAX as usize {
            return Err(format!(
                "frame size {size} exceeds maximum allowed size {}",
                self.max_frame_size
            ));
        }
        Ok(())
    }
}

/// Encodes a frame set into one contiguous buffer.
///
/// # Errors
///
/// Returns a [`SerializationError`] if the message exceeds `limits`.
pub fn encode_message(frames: &[Bytes], limits: FrameLimits) -> Result<Bytes, SerializationError> {
    limits
        .check_count(frames.len())
        .map_err(SerializationError::new)?;

    let mut total = FRAME_COUNT_SIZE;
    for frame in frames {
        limits
            .check_size(frame.len())
            .map_err(SerializationError::new)?;
        total += FRAME_LENGTH_SIZE + frame.len();
    }

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u16(frames.len() as u16);
    for frame in frames {
        buf.put_u32(frame.len() as u32);
        buf.put_slice(frame);
    }
    Ok(buf.freeze())
}

/// Writes one message and flushes the writer.
///
/// # Errors
///
/// Returns a [`SerializationError`] if the message exceeds `limits` or the
/// writer fails.
pub async fn write_message<W>(
    writer: &mut W,
    frames: &[Bytes],
    limits: FrameLimits,
) -> Result<(), SerializationError>
where
    W: AsyncWrite + Unpin,
{
    let encoded = encode_message(frames, limits)?;
    writer
        .write_all(&encoded)
        .await
        .map_err(|e| SerializationError::with_source("failed to write message", e))?;
    writer
        .flush()
        .await
        .map_err(|e| SerializationError::with_source("failed to flush message", e))?;
    Ok(())
}

/// Reads one message.
///
/// Returns `Ok(None)` when the stream ends cleanly on a message boundary.
///
/// # Errors
///
/// Returns a [`DeserializationError`] if the stream ends mid-message, the
/// reader fails, or the message exceeds `limits`.
pub async fn read_message<R>(
    reader: &mut R,
    limits: FrameLimits,
) -> Result<Option<Vec<Bytes>>, DeserializationError>
where
    R: AsyncRead + Unpin,
{
    let mut count_bytes = [0u8; FRAME_COUNT_SIZE];
    let n = reader
        .read(&mut count_bytes[..1])
        .await
        .map_err(|e| DeserializationError::with_source("failed to read frame count", e))?;
    if n == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut count_bytes[1..])
        .await
        .map_err(|e| DeserializationError::with_source("failed to read frame count", e))?;

    let count = u16::from_be_bytes(count_bytes) as usize;
    limits.check_count(count).map_err(DeserializationError::new)?;

    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let mut len_bytes = [0u8; FRAME_LENGTH_SIZE];
        reader
            .read_exact(&mut len_bytes)
            .await
            .map_err(|e| DeserializationError::with_source("failed to read frame length", e))?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        limits.check_size(len).map_err(DeserializationError::new)?;

        let mut frame = vec![0u8; len];
        reader
            .read_exact(&mut frame)
            .await
            .map_err(|e| DeserializationError::with_source("failed to read frame body", e))?;
        frames.push(Bytes::from(frame));
    }

    Ok(Some(frames))
}
