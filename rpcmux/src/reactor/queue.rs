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


//! The reply queue.
//!
//! Replies can be produced on any thread, but only the reactor may write to a
//! socket. Producers push finished replies onto this queue together with the
//! routing identity captured when the request arrived; pushing wakes the
//! reactor, which drains the queue and performs the writes.

use tokio::sync::mpsc;
use tracing::trace;

use crate::envelope::{Reply, RoutingIdentity};
use crate::transport::TransportError;

/// A reply waiting to be written.
#[derive(Debug)]
pub(crate) struct QueuedReply {
    pub identity: RoutingIdentity,
    pub reply: Reply,
}

/// Producer half of the reply queue. Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct ReplySender {
    tx: mpsc::UnboundedSender<QueuedReply>,
}

impl ReplySender {
    /// Queues a reply for delivery to `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the reactor has stopped.
    pub fn enqueue(&self, identity: RoutingIdentity, reply: Reply) -> Result<(), TransportError> {
        trace!(
            connection = %identity.connection_id(),
            request_id = %reply.request_id,
            status = %reply.status,
            "queueing reply"
        );
        self.tx
            .send(QueuedReply { identity, reply })
            .map_err(|_| TransportError::Closed)
    }

    /// `true` once the reactor side of the queue is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the reply queue, owned by the reactor.
#[derive(Debug)]
pub(crate) struct ReplyQueue {
    rx: mpsc::UnboundedReceiver<QueuedReply>,
}

impl ReplyQueue {
    pub async fn recv(&mut self) -> Option<QueuedReply> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<QueuedReply> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Creates a connected sender and queue.
pub(crate) fn reply_queue() -> (ReplySender, ReplyQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReplySender { tx }, ReplyQueue { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Status;
    use crate::envelope::RequestId;
    use crate::transport::ConnectionId;
    use bytes::Bytes;

    fn identity(conn: u64) -> RoutingIdentity {
        RoutingIdentity::new(ConnectionId::new(conn), Bytes::from_static(b"peer"))
    }

    #[tokio::test]
    async fn test_replies_from_other_threads() {
        let (sender, mut queue) = reply_queue();

        let handles: Vec<_> = (1..=4u64)
            .map(|i| {
                let sender = sender.clone();
                std::thread::spawn(move || {
                    sender
                        .enqueue(identity(i), Reply::ok(RequestId::new(i), Bytes::new()))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            let queued = queue.recv().await.unwrap();
            assert_eq!(
                queued.identity.connection_id().as_u64(),
                queued.reply.request_id.as_u64()
            );
            seen.push(queued.reply.request_id.as_u64());
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_enqueue_after_close() {
        let (sender, mut queue) = reply_queue();
        queue.close();
        assert!(sender.is_closed());
        let err = sender
            .enqueue(
                identity(1),
                Reply::error(RequestId::new(1), Status::Cancelled, ""),
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
