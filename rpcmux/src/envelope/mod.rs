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


//! Envelopes: the routed unit of the wire protocol.
//!
//! Every message on a connection decodes into exactly one [`Envelope`],
//! either a [`Request`] or a [`Reply`]. Both carry the peer-assigned identity
//! bytes in their first frame; the server never interprets them, it only
//! echoes them back on the reply. Together with the [`ConnectionId`] the
//! message arrived on they form the [`RoutingIdentity`] that tells the
//! reactor where a reply must go.
//!
//! See [`codec`] for the frame layout.

pub mod codec;

use bytes::Bytes;
use std::fmt;

use crate::Status;
use crate::transport::ConnectionId;

pub use codec::CodecError;

/// Correlates a reply with its request within one connection.
///
/// Zero is never issued and is rejected by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a request id from a raw value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selects a method within a service, by name or by descriptor index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodSelector {
    /// Method name as registered in the service descriptor.
    Name(String),
    /// Zero-based position in the service descriptor.
    Index(u32),
}

impl From<&str> for MethodSelector {
    fn from(name: &str) -> Self {
        MethodSelector::Name(name.to_string())
    }
}

impl From<String> for MethodSelector {
    fn from(name: String) -> Self {
        MethodSelector::Name(name)
    }
}

impl From<u32> for MethodSelector {
    fn from(index: u32) -> Self {
        MethodSelector::Index(index)
    }
}

impl fmt::Display for MethodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSelector::Name(name) => f.write_str(name),
            MethodSelector::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// Where a reply has to be delivered.
///
/// Captured by the reactor when a request is received and carried by the
/// [`ServerChannel`](crate::ServerChannel) until the reply is produced. It
/// stays meaningful only while the connection is alive; a reply routed to a
/// closed connection is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingIdentity {
    connection: ConnectionId,
    peer: Bytes,
}

impl RoutingIdentity {
    /// Creates a routing identity.
    pub fn new(connection: ConnectionId, peer: Bytes) -> Self {
        Self { connection, peer }
    }

    /// Connection the request arrived on.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Peer-assigned identity bytes, echoed verbatim on the reply.
    pub fn peer(&self) -> &Bytes {
        &self.peer
    }
}

impl fmt::Display for RoutingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} bytes", self.connection, self.peer.len())
    }
}

/// A call on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Correlation id chosen by the caller
    pub request_id: RequestId,
    /// Name of the target service
    pub service: String,
    /// Target method
    pub method: MethodSelector,
    /// Serialized request value
    pub payload: Bytes,
}

/// The answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Id of the request being answered
    pub request_id: RequestId,
    /// Outcome
    pub status: Status,
    /// Serialized response on `Ok`, UTF-8 detail text otherwise
    pub payload: Bytes,
}

impl Reply {
    /// A successful reply.
    pub fn ok(request_id: RequestId, payload: Bytes) -> Self {
        Self {
            request_id,
            status: Status::Ok,
            payload,
        }
    }

    /// A failed reply with a detail message.
    pub fn error(request_id: RequestId, status: Status, detail: impl Into<String>) -> Self {
        Self {
            request_id,
            status,
            payload: Bytes::from(detail.into()),
        }
    }

    /// The payload read as detail text. Invalid UTF-8 is replaced.
    pub fn detail(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// An incoming call
    Request(Request),
    /// An answer to an earlier call
    Reply(Reply),
}

impl Envelope {
    /// Request id of either variant.
    pub fn request_id(&self) -> RequestId {
        match self {
            Envelope::Request(request) => request.request_id,
            Envelope::Reply(reply) => reply.request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_detail() {
        let reply = Reply::error(RequestId::new(4), Status::MethodNotFound, "no method Missing");
        assert_eq!(reply.status, Status::MethodNotFound);
        assert_eq!(reply.detail(), "no method Missing");
        assert_eq!(Envelope::Reply(reply).request_id(), RequestId::new(4));
    }

    #[test]
    fn test_selector_conversions() {
        assert_eq!(MethodSelector::from("Say"), MethodSelector::Name("Say".into()));
        assert_eq!(MethodSelector::from(2u32), MethodSelector::Index(2));
        assert_eq!(MethodSelector::Index(2).to_string(), "#2");
    }
}
