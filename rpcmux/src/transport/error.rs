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

//! Transport layer error types.
//!
//! Transport errors are the lowest layer of the error hierarchy. They cover
//! endpoint parsing, binding, connecting, socket I/O and the lifecycle of the
//! connection manager itself. A transport error never reaches a remote peer:
//! replies that cannot be written are discarded and calls waiting on a broken
//! connection complete locally with `Cancelled`.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::transport::ConnectionId;

/// Errors that can occur in the transport layer.
///
/// # Examples
///
/// ```rust
/// use rpcmux::transport::TransportError;
/// use std::io;
///
/// let error = TransportError::ConnectionFailed {
///     address: "127.0.0.1:8080".to_string(),
///     source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
/// };
///
/// assert!(error.is_recoverable());
/// assert!(!error.should_close_connection());
/// ```
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint string could not be parsed.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The endpoint as given by the caller
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// The connection manager configuration is unusable.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
    },

    /// Failed to bind a listener.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        /// The address that failed to bind
        address: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An in-process endpoint with the same name is already bound.
    #[error("endpoint {endpoint} is already in use")]
    AddressInUse {
        /// The endpoint that is taken
        endpoint: String,
    },

    /// Failed to establish an outbound connection.
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        /// The address that failed to connect
        address: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An established connection went away.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Description of why the connection was lost
        reason: String,
        /// The underlying I/O error, if available
        #[source]
        source: Option<io::Error>,
    },

    /// The connection is not (or no longer) owned by the reactor.
    #[error("unknown connection {connection}")]
    UnknownConnection {
        /// The connection that was addressed
        connection: ConnectionId,
    },

    /// Reading a message from a connection failed.
    #[error("read failed: {source}")]
    ReadFailed {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Writing a message to a connection failed.
    #[error("write failed: {source}")]
    WriteFailed {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout {
        /// The duration that was exceeded
        duration: Duration,
    },

    /// `start()` was called on a connection manager that is already running.
    #[error("connection manager is already started")]
    AlreadyStarted,

    /// The connection manager has shut down.
    #[error("connection manager is closed")]
    Closed,

    /// An unexpected I/O error occurred.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// Returns `true` if retrying the same operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::ConnectionFailed { .. }
            | TransportError::ConnectionLost { .. }
            | TransportError::Timeout { .. } => true,

            TransportError::ReadFailed { source }
            | TransportError::WriteFailed { source }
            | TransportError::Io { source } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),

            TransportError::InvalidEndpoint { .. }
            | TransportError::InvalidConfiguration { .. }
            | TransportError::BindFailed { .. }
            | TransportError::AddressInUse { .. }
            | TransportError::UnknownConnection { .. }
            | TransportError::AlreadyStarted
            | TransportError::Closed => false,
        }
    }

    /// Returns `true` if the connection this error was raised on must be closed.
    ///
    /// Errors raised before a connection exists (bind, connect, endpoint
    /// parsing, lifecycle) never close anything.
    pub fn should_close_connection(&self) -> bool {
        match self {
            TransportError::ConnectionLost { .. } | TransportError::Timeout { .. } => true,

            TransportError::ReadFailed { source }
            | TransportError::WriteFailed { source }
            | TransportError::Io { source } => !matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),

            TransportError::InvalidEndpoint { .. }
            | TransportError::InvalidConfiguration { .. }
            | TransportError::BindFailed { .. }
            | TransportError::AddressInUse { .. }
            | TransportError::ConnectionFailed { .. }
            | TransportError::UnknownConnection { .. }
            | TransportError::AlreadyStarted
            | TransportError::Closed => false,
        }
    }

    pub(crate) fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        TransportError::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io { source: error }
    }
}
