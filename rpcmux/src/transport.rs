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


//! Transport layer.
//!
//! Everything below the envelope: endpoint parsing, the byte streams the
//! reactor owns, and [`TransportError`].
//!
//! - [`Endpoint`]: `tcp://host:port` or `inproc://name`
//! - [`Transport`]: an `AsyncRead + AsyncWrite` stream with [`TransportMetadata`]
//! - [`TcpTransport`]: TCP sockets
//! - [`InprocTransport`]: in-process duplex pipes
//!
//! Application code rarely touches this module directly; the
//! [`ConnectionManager`](crate::ConnectionManager) parses endpoints and creates
//! transports on its behalf.

mod endpoint;
mod error;
mod inproc;
mod tcp;
mod traits;
mod types;

pub use endpoint::Endpoint;
pub use error::TransportError;
pub use inproc::{DEFAULT_INPROC_BUFFER, InprocTransport};
pub use tcp::TcpTransport;
pub use traits::{BoxedTransport, Transport};
pub use types::{ConnectionId, ListenerId, TransportKind, TransportMetadata};
