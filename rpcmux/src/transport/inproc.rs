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

//! In-process transport backed by a tokio duplex pipe.

use crate::transport::{ConnectionId, Transport, TransportKind, TransportMetadata};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Buffer size of each direction of an in-process pipe.
pub const DEFAULT_INPROC_BUFFER: usize = 64 * 1024;

/// One end of an in-process connection.
pub struct InprocTransport {
    stream: DuplexStream,
    metadata: TransportMetadata,
}

impl InprocTransport {
    /// Creates a connected pair. Bytes written to one end are read from the other.
    pub fn pair(buffer_size: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(buffer_size);
        (Self::wrap(a), Self::wrap(b))
    }

    fn wrap(stream: DuplexStream) -> Self {
        Self {
            stream,
            metadata: TransportMetadata::new(ConnectionId::next(), TransportKind::Inproc),
        }
    }
}

impl Transport for InprocTransport {
    fn metadata(&self) -> &TransportMetadata {
        &self.metadata
    }
}

impl AsyncRead for InprocTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for InprocTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (mut a, mut b) = InprocTransport::pair(1024);
        assert_ne!(a.metadata().id, b.metadata().id);

        a.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_drop_is_eof() {
        let (a, mut b) = InprocTransport::pair(64);
        drop(a);
        let mut buf = Vec::new();
        assert_eq!(b.read_to_end(&mut buf).await.unwrap(), 0);
    }
}
