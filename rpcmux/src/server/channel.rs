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


//! One-shot reply channels.
//!
//! Every dispatched request gets exactly one [`ServerChannel`]. Completing it
//! (with [`send`](ServerChannel::send) or
//! [`send_error`](ServerChannel::send_error)) pushes the reply onto the reply
//! queue; the reactor writes it to the connection the request came from. The
//! channel may be cloned and moved to any thread, and completion may happen
//! long after the handler returned.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

use crate::config::MisusePolicy;
use crate::envelope::{Reply, RequestId, RoutingIdentity};
use crate::error::ChannelMisuseError;
use crate::observability::ReactorMetrics;
use crate::reactor::ReplySender;
use crate::Status;

const DROPPED_DETAIL: &str = "request dropped without a reply";

struct ChannelInner {
    identity: RoutingIdentity,
    request_id: RequestId,
    replies: ReplySender,
    completed: AtomicBool,
    policy: MisusePolicy,
    metrics: Arc<ReactorMetrics>,
}

impl ChannelInner {
    fn deliver(&self, reply: Reply) {
        if let Err(e) = self.replies.enqueue(self.identity.clone(), reply) {
            debug!(
                request_id = %self.request_id,
                error = %e,
                "reply discarded, reactor has stopped"
            );
        }
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if *self.completed.get_mut() {
            return;
        }
        error!(
            connection = %self.identity.connection_id(),
            request_id = %self.request_id,
            "request dropped without a reply"
        );
        self.deliver(Reply::error(
            self.request_id,
            Status::ApplicationError,
            DROPPED_DETAIL,
        ));
    }
}

/// The obligation to answer one request.
///
/// # Examples
///
/// ```rust
/// use rpcmux::{MethodSelector, RpcService, ServerChannel, Status};
/// use bytes::Bytes;
///
/// struct Echo;
///
/// impl RpcService for Echo {
///     fn dispatch(&self, method: &MethodSelector, payload: Bytes, channel: ServerChannel) {
///         match method {
///             MethodSelector::Name(name) if name == "Say" => {
///                 let _ = channel.send(payload);
///             }
///             other => {
///                 let _ = channel.send_error(Status::MethodNotFound, format!("no method {other}"));
///             }
///         }
///     }
/// }
/// ```
#[derive(Clone)]
pub struct ServerChannel {
    inner: Arc<ChannelInner>,
}

impl ServerChannel {
    pub(crate) fn new(
        identity: RoutingIdentity,
        request_id: RequestId,
        replies: ReplySender,
        policy: MisusePolicy,
        metrics: Arc<ReactorMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                identity,
                request_id,
                replies,
                completed: AtomicBool::new(false),
                policy,
                metrics,
            }),
        }
    }

    /// The request this channel answers.
    pub fn request_id(&self) -> RequestId {
        self.inner.request_id
    }

    /// Where the reply will be delivered.
    pub fn identity(&self) -> &RoutingIdentity {
        &self.inner.identity
    }

    /// `true` once a reply has been queued.
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Completes the request successfully with an encoded response.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelMisuseError::AlreadyCompleted`] if the channel was
    /// already completed; no second reply is sent. Panics instead under
    /// [`MisusePolicy::Abort`].
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<(), ChannelMisuseError> {
        self.complete("send", || Reply::ok(self.inner.request_id, payload.into()))
    }

    /// Completes the request with an error status and detail text.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelMisuseError::OkAsError`] for `Status::Ok` (the channel
    /// stays open) and [`ChannelMisuseError::AlreadyCompleted`] if the channel
    /// was already completed. Panics instead under [`MisusePolicy::Abort`].
    pub fn send_error(&self, status: Status, detail: impl Into<String>) -> Result<(), ChannelMisuseError> {
        if status.is_ok() {
            return Err(self.misuse(ChannelMisuseError::OkAsError {
                request_id: self.inner.request_id,
            }));
        }
        self.complete("send_error", || {
            Reply::error(self.inner.request_id, status, detail)
        })
    }

    fn complete(
        &self,
        attempted: &'static str,
        reply: impl FnOnce() -> Reply,
    ) -> Result<(), ChannelMisuseError> {
        if self.inner.completed.swap(true, Ordering::AcqRel) {
            return Err(self.misuse(ChannelMisuseError::AlreadyCompleted {
                request_id: self.inner.request_id,
                attempted,
            }));
        }
        self.inner.deliver(reply());
        Ok(())
    }

    fn misuse(&self, error: ChannelMisuseError) -> ChannelMisuseError {
        self.inner.metrics.record_channel_misuse();
        error!(
            connection = %self.inner.identity.connection_id(),
            request_id = %self.inner.request_id,
            error = %error,
            "server channel misuse"
        );
        if self.inner.policy == MisusePolicy::Abort {
            panic!("server channel misuse: {error}");
        }
        error
    }
}

impl fmt::Debug for ServerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerChannel")
            .field("identity", &self.inner.identity)
            .field("request_id", &self.inner.request_id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::queue::{ReplyQueue, reply_queue};
    use crate::transport::ConnectionId;

    fn channel(policy: MisusePolicy) -> (ServerChannel, ReplyQueue, Arc<ReactorMetrics>) {
        let (sender, queue) = reply_queue();
        let metrics = Arc::new(ReactorMetrics::new());
        let identity = RoutingIdentity::new(ConnectionId::new(9), Bytes::from_static(b"peer"));
        let channel = ServerChannel::new(identity, RequestId::new(42), sender, policy, metrics.clone());
        (channel, queue, metrics)
    }

    #[test]
    fn test_send_once() {
        let (channel, mut queue, _) = channel(MisusePolicy::Report);
        channel.send(Bytes::from_static(b"hi")).unwrap();
        assert!(channel.is_completed());

        let queued = queue.try_recv().unwrap();
        assert_eq!(queued.identity.connection_id(), ConnectionId::new(9));
        assert_eq!(queued.reply.request_id, RequestId::new(42));
        assert_eq!(queued.reply.status, Status::Ok);
        assert_eq!(queued.reply.payload, Bytes::from_static(b"hi"));
    }

    #[test]
    fn test_second_completion_is_misuse() {
        let (channel, mut queue, metrics) = channel(MisusePolicy::Report);
        channel.send_error(Status::ApplicationError, "boom").unwrap();

        let err = channel.send(Bytes::new()).unwrap_err();
        assert_eq!(
            err,
            ChannelMisuseError::AlreadyCompleted {
                request_id: RequestId::new(42),
                attempted: "send",
            }
        );
        assert_eq!(metrics.channel_misuses(), 1);

        drop(channel);
        let queued = queue.try_recv().unwrap();
        assert_eq!(queued.reply.detail(), "boom");
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_ok_as_error_keeps_channel_open() {
        let (channel, mut queue, _) = channel(MisusePolicy::Report);
        let err = channel.send_error(Status::Ok, "fine").unwrap_err();
        assert!(matches!(err, ChannelMisuseError::OkAsError { .. }));
        assert!(!channel.is_completed());

        channel.send(Bytes::from_static(b"late but valid")).unwrap();
        assert_eq!(queue.try_recv().unwrap().reply.status, Status::Ok);
    }

    #[test]
    fn test_clones_complete_once() {
        let (channel, mut queue, _) = channel(MisusePolicy::Report);
        let other = channel.clone();
        let handle = std::thread::spawn(move || other.send(Bytes::from_static(b"a")));
        let first = handle.join().unwrap();
        let second = channel.send(Bytes::from_static(b"b"));
        assert!(first.is_ok());
        assert!(second.is_err());

        drop(channel);
        assert_eq!(queue.try_recv().unwrap().reply.payload, Bytes::from_static(b"a"));
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_drop_without_reply() {
        let (channel, mut queue, _) = channel(MisusePolicy::Report);
        let clone = channel.clone();
        drop(channel);
        assert!(queue.try_recv().is_none());

        drop(clone);
        let queued = queue.try_recv().unwrap();
        assert_eq!(queued.reply.status, Status::ApplicationError);
        assert_eq!(queued.reply.detail(), DROPPED_DETAIL);
    }

    #[test]
    fn test_reactor_gone_is_not_an_error() {
        let (channel, queue, _) = channel(MisusePolicy::Report);
        drop(queue);
        assert!(channel.send(Bytes::new()).is_ok());
    }

    #[test]
    #[should_panic(expected = "server channel misuse")]
    fn test_abort_policy_panics() {
        let (channel, _queue, _) = channel(MisusePolicy::Abort);
        let _ = channel.send(Bytes::new());
        let _ = channel.send(Bytes::new());
    }
}
