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

//! TCP transport implementation.
//!
//! Binding and connecting happen with blocking `std::net` calls on the
//! caller's thread so that errors and the bound address are reported
//! synchronously. The resulting socket is switched to non-blocking mode and
//! then registered with the reactor's runtime, which owns it from then on.

use crate::transport::{ConnectionId, Transport, TransportError, TransportKind, TransportMetadata};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

/// TCP-based transport.
pub struct TcpTransport {
    stream: TcpStream,
    metadata: TransportMetadata,
}

impl TcpTransport {
    /// Binds a non-blocking listener on `address`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the address cannot be
    /// resolved or bound.
    pub fn bind_std(address: &str) -> Result<std::net::TcpListener, TransportError> {
        let bind_failed = |source| TransportError::BindFailed {
            address: address.to_string(),
            source,
        };
        let listener = std::net::TcpListener::bind(address).map_err(bind_failed)?;
        listener.set_nonblocking(true).map_err(bind_failed)?;
        debug!(%address, local_addr = ?listener.local_addr().ok(), "bound TCP listener");
        Ok(listener)
    }

    /// Connects to `address`, trying every resolved socket address in turn.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] carrying the last error
    /// seen, or [`TransportError::Timeout`] if every attempt timed out.
    pub fn connect_std(
        address: &str,
        timeout: Duration,
    ) -> Result<std::net::TcpStream, TransportError> {
        let connection_failed = |source| TransportError::ConnectionFailed {
            address: address.to_string(),
            source,
        };

        let mut last_error = None;
        for addr in address.to_socket_addrs().map_err(connection_failed)? {
            match std::net::TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(true).map_err(connection_failed)?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if e.kind() == io::ErrorKind::TimedOut => {
                Err(TransportError::Timeout { duration: timeout })
            }
            Some(e) => Err(connection_failed(e)),
            None => Err(connection_failed(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "address resolved to nothing",
            ))),
        }
    }

    /// Wraps a connected tokio stream under a fresh connection id.
    pub fn new(stream: TcpStream, nodelay: bool) -> Result<Self, TransportError> {
        Self::with_id(stream, ConnectionId::next(), nodelay)
    }

    /// Wraps a connected tokio stream under a pre-allocated connection id.
    pub fn with_id(
        stream: TcpStream,
        id: ConnectionId,
        nodelay: bool,
    ) -> Result<Self, TransportError> {
        stream.set_nodelay(nodelay)?;
        let mut metadata = TransportMetadata::new(id, TransportKind::Tcp);
        if let Ok(addr) = stream.local_addr() {
            metadata = metadata.with_local_addr(addr);
        }
        if let Ok(addr) = stream.peer_addr() {
            metadata = metadata.with_peer_addr(addr);
        }
        Ok(Self { stream, metadata })
    }

    /// Registers a non-blocking std stream with the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_std(
        stream: std::net::TcpStream,
        id: ConnectionId,
        nodelay: bool,
    ) -> Result<Self, TransportError> {
        Self::with_id(TcpStream::from_std(stream)?, id, nodelay)
    }

    /// Returns the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Returns the peer address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Transport for TcpTransport {
    fn metadata(&self) -> &TransportMetadata {
        &self.metadata
    }
}

impl AsyncRead for TcpTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpTransport {
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
    async fn test_tcp_bind_connect_echo() {
        let std_listener = TcpTransport::bind_std("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = TcpTransport::new(stream, true).unwrap();
            let mut buf = [0u8; 5];
            transport.read_exact(&mut buf).await.unwrap();
            transport.write_all(&buf).await.unwrap();
        });

        let std_stream =
            TcpTransport::connect_std(&addr.to_string(), Duration::from_secs(1)).unwrap();
        let id = ConnectionId::next();
        let mut client = TcpTransport::from_std(std_stream, id, true).unwrap();
        assert_eq!(client.metadata().id, id);
        assert_eq!(client.metadata().kind, TransportKind::Tcp);
        assert_eq!(client.metadata().peer_addr, Some(addr));

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_tcp_connection_refused() {
        // Bind and drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let result = TcpTransport::connect_std(&format!("127.0.0.1:{port}"), Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed { .. })
        ));
    }

    #[test]
    fn test_tcp_bind_conflict() {
        let first = TcpTransport::bind_std("127.0.0.1:0").unwrap();
        let addr = first.local_addr().unwrap().to_string();
        let second = TcpTransport::bind_std(&addr);
        assert!(matches!(second, Err(TransportError::BindFailed { .. })));
    }

    #[tokio::test]
    async fn test_tcp_unique_ids() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let a = TcpTransport::new(TcpStream::connect(addr).await.unwrap(), false).unwrap();
        let b = TcpTransport::new(TcpStream::connect(addr).await.unwrap(), false).unwrap();
        assert_ne!(a.metadata().id, b.metadata().id);
    }
}
