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

//! Core transport trait.

use crate::transport::TransportMetadata;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bi-directional byte stream owned by the reactor.
///
/// The reactor splits every transport into a read half, driven by a reader
/// task, and a write half that only the reactor loop touches. Anything that
/// is `AsyncRead + AsyncWrite` can be a transport; the built-in ones are
/// [`TcpTransport`](crate::transport::TcpTransport) and
/// [`InprocTransport`](crate::transport::InprocTransport).
pub trait Transport: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static {
    /// Returns metadata about this connection.
    fn metadata(&self) -> &TransportMetadata;
}

/// Type-erased transport as stored by the reactor.
pub type BoxedTransport = Box<dyn Transport>;

impl Transport for BoxedTransport {
    fn metadata(&self) -> &TransportMetadata {
        self.as_ref().metadata()
    }
}
