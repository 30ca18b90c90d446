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


//! Error types.
//!
//! Errors follow the layers of the runtime:
//!
//! 1. **Transport**: sockets, endpoints, reactor lifecycle ([`TransportError`])
//! 2. **Codec**: malformed envelopes ([`CodecError`])
//! 3. **Serialization**: payload encoding ([`SerializationError`],
//!    [`DeserializationError`])
//! 4. **Server**: registration ([`ServerError`]) and reply obligations
//!    ([`ChannelMisuseError`])
//! 5. **Call**: the outcome of one remote call as seen by the caller
//!    ([`CallError`])
//!
//! [`RpcError`] composes all of them for APIs that can fail at more than one
//! layer.
//!
//! Handling differs per layer. Protocol failures on the server become error
//! replies; application failures become `ApplicationError` replies; misuse is
//! reported synchronously to the offending caller; transport failures discard
//! replies and cancel the calls waiting on the affected connection. Nothing is
//! retried automatically.
//!
//! ```rust
//! use rpcmux::{CallError, RpcError, Status};
//! use rpcmux::transport::TransportError;
//!
//! let err: RpcError = TransportError::Closed.into();
//! assert!(err.is_transport_error());
//!
//! let err: RpcError = CallError::new(Status::MethodNotFound, "no method Missing").into();
//! assert_eq!(err.status(), Some(Status::MethodNotFound));
//! ```

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

use crate::Status;
use crate::envelope::{CodecError, RequestId};
use crate::serialization::{DeserializationError, SerializationError};
use crate::transport::{ConnectionId, TransportError};

/// The failure of a single call, as observed by the caller.
///
/// Carries the reply status and its detail text. Locally produced outcomes
/// (deadline and cancellation) use the same type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {detail}")]
pub struct CallError {
    /// Non-`Ok` status of the call
    pub status: Status,
    /// Human-readable detail, possibly empty
    pub detail: String,
}

impl CallError {
    /// Creates a call error.
    pub fn new(status: Status, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// `true` if the call's deadline passed.
    pub fn is_deadline_exceeded(&self) -> bool {
        self.status == Status::DeadlineExceeded
    }

    /// `true` if the call was cancelled or its connection was lost.
    pub fn is_cancelled(&self) -> bool {
        self.status == Status::Cancelled
    }
}

/// Errors raised while registering services or building descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// The name is already taken.
    #[error("name '{name}' is already registered")]
    DuplicateName {
        /// The duplicate name
        name: String,
    },

    /// Registration was attempted after `start()`.
    #[error("server is already started")]
    AlreadyStarted,

    /// The name is not usable.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// A reply obligation was fulfilled incorrectly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelMisuseError {
    /// The channel had already been completed; nothing was sent.
    #[error("reply to request {request_id} already completed, {attempted} ignored")]
    AlreadyCompleted {
        /// Request the channel answers
        request_id: RequestId,
        /// `"send"` or `"send_error"`
        attempted: &'static str,
    },

    /// `send_error` was called with `Status::Ok`; nothing was sent.
    #[error("send_error called with Ok status for request {request_id}")]
    OkAsError {
        /// Request the channel answers
        request_id: RequestId,
    },
}

/// Top-level error type for rpcmux operations.
#[derive(Debug)]
pub enum RpcError {
    /// Connection or reactor failure.
    Transport(TransportError),

    /// Malformed envelope.
    Codec(CodecError),

    /// A value could not be encoded.
    Serialization(SerializationError),

    /// A value could not be decoded.
    Deserialization(DeserializationError),

    /// Service registration failure.
    Server(ServerError),

    /// Reply obligation misuse.
    Misuse(ChannelMisuseError),

    /// The remote call completed with a non-`Ok` status, timed out or was
    /// cancelled.
    Call(CallError),

    /// The next request id on the connection is still held by a live call.
    RequestIdInUse {
        /// Connection the call was made on
        connection: ConnectionId,
        /// The occupied id
        request_id: RequestId,
    },
}

impl RpcError {
    /// Returns `true` for transport errors.
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` for malformed envelopes.
    #[must_use]
    pub const fn is_codec_error(&self) -> bool {
        matches!(self, Self::Codec(_))
    }

    /// Returns `true` for payload encoding or decoding errors.
    #[must_use]
    pub const fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Deserialization(_))
    }

    /// Returns `true` for registration errors.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// Returns `true` for reply obligation misuse.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(self, Self::Misuse(_))
    }

    /// Returns `true` for a failed remote call.
    #[must_use]
    pub const fn is_call_error(&self) -> bool {
        matches!(self, Self::Call(_))
    }

    /// Status of a failed call, if this is one.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Call(e) => Some(e.status),
            _ => None,
        }
    }

    /// Returns `true` if repeating the operation may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::Call(e) => matches!(e.status, Status::DeadlineExceeded | Status::Cancelled),
            Self::RequestIdInUse { .. } => true,
            Self::Codec(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Server(_)
            | Self::Misuse(_) => false,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Serialization(e) => write!(f, "{e}"),
            Self::Deserialization(e) => write!(f, "{e}"),
            Self::Server(e) => write!(f, "server error: {e}"),
            Self::Misuse(e) => write!(f, "channel misuse: {e}"),
            Self::Call(e) => write!(f, "call failed: {e}"),
            Self::RequestIdInUse {
                connection,
                request_id,
            } => write!(
                f,
                "request id {request_id} on {connection} is still in use"
            ),
        }
    }
}

impl StdError for RpcError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Serialization(e) => Some(e),
            Self::Deserialization(e) => Some(e),
            Self::Server(e) => Some(e),
            Self::Misuse(e) => Some(e),
            Self::Call(e) => Some(e),
            Self::RequestIdInUse { .. } => None,
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

impl From<CodecError> for RpcError {
    fn from(error: CodecError) -> Self {
        Self::Codec(error)
    }
}

impl From<SerializationError> for RpcError {
    fn from(error: SerializationError) -> Self {
        Self::Serialization(error)
    }
}

impl From<DeserializationError> for RpcError {
    fn from(error: DeserializationError) -> Self {
        Self::Deserialization(error)
    }
}

impl From<ServerError> for RpcError {
    fn from(error: ServerError) -> Self {
        Self::Server(error)
    }
}

impl From<ChannelMisuseError> for RpcError {
    fn from(error: ChannelMisuseError) -> Self {
        Self::Misuse(error)
    }
}

impl From<CallError> for RpcError {
    fn from(error: CallError) -> Self {
        Self::Call(error)
    }
}
