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


//! Client side of rpcmux.
//!
//! [`RpcClient::call`] assigns the connection's next request id, records the
//! call in the pending table and hands the encoded request to the reactor.
//! The returned [`PendingCall`] resolves exactly once: with the reply, with
//! `DeadlineExceeded` when its deadline passes, or with `Cancelled` when it is
//! cancelled, its connection is lost or the manager shuts down.
//!
//! ```rust,no_run
//! use rpcmux::{ConnectionManager, ConnectionManagerConfig, RpcClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManager::new(ConnectionManagerConfig::default());
//! manager.start()?;
//! let connection = manager.connect("tcp://127.0.0.1:5555")?;
//!
//! let client = RpcClient::new(&manager);
//! let reply = client
//!     .call(&connection, "Echo", "Say", "hi", Some(Duration::from_secs(1)))?
//!     .await?;
//! assert_eq!(&reply[..], b"hi");
//! # Ok(())
//! # }
//! ```

pub(crate) mod pending;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::trace;

use crate::envelope::{CodecError, MethodSelector, Request, RequestId, codec};
use crate::error::{CallError, RpcError};
use crate::reactor::{Connection, ConnectionManager};
use crate::serialization::Serializer;
use crate::serialization::framing::encode_message;
use crate::transport::ConnectionId;
use crate::Status;
use pending::{CallKey, CallOutcome, PendingCalls, Registration};

const CANCELLED_BY_CALLER: &str = "cancelled by caller";

/// Issues calls over connections of one connection manager.
#[derive(Debug, Clone)]
pub struct RpcClient {
    manager: ConnectionManager,
}

impl RpcClient {
    /// Creates a client.
    pub fn new(manager: &ConnectionManager) -> Self {
        Self {
            manager: manager.clone(),
        }
    }

    /// Sends one request and returns a future for its outcome.
    ///
    /// `deadline` is measured from now. `None` falls back to the manager's
    /// `default_deadline`, which may itself be `None` (wait indefinitely).
    /// A deadline too far out to be represented, such as `Duration::MAX`, also
    /// waits indefinitely.
    ///
    /// # Errors
    ///
    /// - [`RpcError::RequestIdInUse`] if the connection's next request id is
    ///   still held by a pending call
    /// - [`RpcError::Transport`] with `UnknownConnection` if the connection
    ///   was closed or lost
    /// - [`RpcError::Codec`] for an empty service name
    /// - [`RpcError::Serialization`] if the request exceeds the frame limits
    /// - [`RpcError::Transport`] after shutdown
    pub fn call(
        &self,
        connection: &Connection,
        service: &str,
        method: impl Into<MethodSelector>,
        payload: impl Into<Bytes>,
        deadline: Option<Duration>,
    ) -> Result<PendingCall, RpcError> {
        if service.is_empty() {
            return Err(CodecError::EmptyServiceName.into());
        }
        let method = method.into();
        let deadline = deadline_after(deadline.or(self.manager.config().default_deadline));

        let pending = self.manager.pending();
        let Registration { key, receiver } = pending.register(connection.id(), service, deadline)?;

        let request = Request {
            request_id: key.request_id,
            service: service.to_string(),
            method,
            payload: payload.into(),
        };
        let frames = codec::encode_request(connection.identity(), &request);
        let submitted = encode_message(&frames, self.manager.config().frame_limits())
            .map_err(RpcError::from)
            .and_then(|message| {
                self.manager
                    .submit_call(key, message)
                    .map_err(RpcError::from)
            });
        if let Err(e) = submitted {
            pending.abandon(key);
            return Err(e);
        }

        trace!(
            connection = %key.connection,
            request_id = %key.request_id,
            service,
            method = %request.method,
            "call submitted"
        );
        Ok(PendingCall {
            key,
            receiver,
            pending: pending.clone(),
            finished: false,
        })
    }

    /// Calls a typed method: encodes `request`, awaits the reply and decodes it.
    ///
    /// # Errors
    ///
    /// Everything [`call`](Self::call) returns, plus:
    ///
    /// - [`RpcError::Serialization`] if `request` cannot be encoded
    /// - [`RpcError::Call`] for a non-`Ok` reply or a local deadline or
    ///   cancellation, and with `BadRequest` if the reply cannot be decoded
    pub async fn invoke<Req, Resp, Z>(
        &self,
        connection: &Connection,
        service: &str,
        method: impl Into<MethodSelector>,
        request: &Req,
        serializer: &Z,
        deadline: Option<Duration>,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
        Z: Serializer,
    {
        let payload = serializer.serialize(request)?;
        let reply = self
            .call(connection, service, method, payload, deadline)?
            .await?;
        serializer.deserialize(&reply).map_err(|e| {
            CallError::new(Status::BadRequest, format!("failed to decode reply: {e}")).into()
        })
    }

    /// Number of calls awaiting a reply across all connections.
    pub fn pending_count(&self) -> usize {
        self.manager.pending().len()
    }

    /// The connection manager this client uses.
    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

/// Absolute deadline `timeout` from now, or `None` if it does not fit in an `Instant`.
fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|timeout| Instant::now().checked_add(timeout))
}

/// An in-flight call.
///
/// Resolves to the reply payload or to the [`CallError`] describing why the
/// call failed. Dropping it before completion forgets the call; a reply that
/// still arrives is discarded.
#[must_use = "a call is abandoned when its PendingCall is dropped"]
pub struct PendingCall {
    key: CallKey,
    receiver: oneshot::Receiver<CallOutcome>,
    pending: Arc<PendingCalls>,
    finished: bool,
}

impl PendingCall {
    /// Request id assigned to the call.
    pub fn request_id(&self) -> RequestId {
        self.key.request_id
    }

    /// Connection the call was sent on.
    pub fn connection_id(&self) -> ConnectionId {
        self.key.connection
    }

    /// Completes the call with `Cancelled`. The server is not told.
    ///
    /// Returns `false` if the call had already completed.
    pub fn cancel(&self) -> bool {
        self.pending.cancel(self.key, CANCELLED_BY_CALLER)
    }

    /// A handle that can cancel this call from elsewhere while it is awaited.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            key: self.key,
            pending: self.pending.clone(),
        }
    }

    /// `true` once the outcome is decided, whether or not it was awaited.
    pub fn is_completed(&self) -> bool {
        self.finished || !self.pending.contains(self.key)
    }
}

impl Future for PendingCall {
    type Output = Result<Bytes, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.receiver).poll(cx));
        self.finished = true;
        Poll::Ready(outcome.unwrap_or_else(|_| {
            Err(CallError::new(Status::Cancelled, "connection manager shut down"))
        }))
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.finished {
            self.pending.abandon(self.key);
        }
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("connection", &self.key.connection)
            .field("request_id", &self.key.request_id)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Cancels one call. Obtained from [`PendingCall::cancel_handle`].
#[derive(Clone)]
pub struct CancelHandle {
    key: CallKey,
    pending: Arc<PendingCalls>,
}

impl CancelHandle {
    /// Completes the call with `Cancelled` unless it already completed.
    pub fn cancel(&self) -> bool {
        self.pending.cancel(self.key, CANCELLED_BY_CALLER)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("connection", &self.key.connection)
            .field("request_id", &self.key.request_id)
            .finish()
    }
}
