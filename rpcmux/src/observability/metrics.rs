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


//! Reactor and call counters.
//!
//! Counters are plain relaxed atomics so every thread can bump them without
//! coordination. With the `observability` feature enabled each increment is
//! mirrored to the `metrics` crate under the `rpcmux.` prefix.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by a connection manager, its servers and its clients.
///
/// ```rust
/// use rpcmux::{ConnectionManager, ConnectionManagerConfig};
///
/// let manager = ConnectionManager::new(ConnectionManagerConfig::default());
/// let snapshot = manager.metrics().snapshot();
/// assert_eq!(snapshot.connections_opened, 0);
/// assert_eq!(manager.metrics().active_connections(), 0);
/// ```
#[derive(Debug, Default)]
pub struct ReactorMetrics {
    /// Connections handed to the reactor
    connections_opened: AtomicU64,
    /// Connections closed for any reason
    connections_closed: AtomicU64,
    /// Request envelopes decoded
    requests_received: AtomicU64,
    /// Requests that reached a registered service
    requests_dispatched: AtomicU64,
    /// Reply envelopes written
    replies_sent: AtomicU64,
    /// Replies discarded because their connection was gone or failed
    replies_dropped: AtomicU64,
    /// Messages that did not decode into an envelope
    malformed_messages: AtomicU64,
    /// Reported server channel misuses
    channel_misuses: AtomicU64,
    /// Client calls registered
    calls_started: AtomicU64,
    /// Client calls completed by a reply
    calls_completed: AtomicU64,
    /// Client calls that hit their deadline
    calls_timed_out: AtomicU64,
    /// Client calls cancelled locally or by connection loss
    calls_cancelled: AtomicU64,
    /// Replies for unknown or already completed calls
    late_replies: AtomicU64,
}

/// Point-in-time copy of [`ReactorMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Connections handed to the reactor
    pub connections_opened: u64,
    /// Connections closed for any reason
    pub connections_closed: u64,
    /// Request envelopes decoded
    pub requests_received: u64,
    /// Requests that reached a registered service
    pub requests_dispatched: u64,
    /// Reply envelopes written
    pub replies_sent: u64,
    /// Replies discarded because their connection was gone or failed
    pub replies_dropped: u64,
    /// Messages that did not decode into an envelope
    pub malformed_messages: u64,
    /// Reported server channel misuses
    pub channel_misuses: u64,
    /// Client calls registered
    pub calls_started: u64,
    /// Client calls completed by a reply
    pub calls_completed: u64,
    /// Client calls that hit their deadline
    pub calls_timed_out: u64,
    /// Client calls cancelled locally or by connection loss
    pub calls_cancelled: u64,
    /// Replies for unknown or already completed calls
    pub late_replies: u64,
}

impl ReactorMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        {
            metrics::counter!("rpcmux.connections.opened").increment(1);
            metrics::gauge!("rpcmux.connections.active").increment(1.0);
        }
    }
    pub(crate) fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        {
            metrics::counter!("rpcmux.connections.closed").increment(1);
            metrics::gauge!("rpcmux.connections.active").decrement(1.0);
        }
    }
    pub(crate) fn record_request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.requests.received").increment(1);
    }
    pub(crate) fn record_request_dispatched(&self) {
        self.requests_dispatched.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.requests.dispatched").increment(1);
    }
    pub(crate) fn record_reply_sent(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.replies.sent").increment(1);
    }
    pub(crate) fn record_reply_dropped(&self) {
        self.replies_dropped.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.replies.dropped").increment(1);
    }
    pub(crate) fn record_malformed_message(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.messages.malformed").increment(1);
    }
    pub(crate) fn record_channel_misuse(&self) {
        self.channel_misuses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.channel.misuse").increment(1);
    }
    pub(crate) fn record_call_started(&self) {
        self.calls_started.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.calls.started").increment(1);
    }
    pub(crate) fn record_call_completed(&self) {
        self.calls_completed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.calls.completed").increment(1);
    }
    pub(crate) fn record_call_timed_out(&self) {
        self.calls_timed_out.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.calls.timed_out").increment(1);
    }
    pub(crate) fn record_call_cancelled(&self) {
        self.calls_cancelled.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.calls.cancelled").increment(1);
    }
    pub(crate) fn record_late_reply(&self) {
        self.late_replies.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        metrics::counter!("rpcmux.replies.late").increment(1);
    }

    /// Connections handed to the reactor.
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }
    /// Connections closed for any reason.
    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }
    /// Request envelopes decoded.
    pub fn requests_received(&self) -> u64 {
        self.requests_received.load(Ordering::Relaxed)
    }
    /// Requests that reached a registered service.
    pub fn requests_dispatched(&self) -> u64 {
        self.requests_dispatched.load(Ordering::Relaxed)
    }
    /// Reply envelopes written.
    pub fn replies_sent(&self) -> u64 {
        self.replies_sent.load(Ordering::Relaxed)
    }
    /// Replies discarded because their connection was gone or failed.
    pub fn replies_dropped(&self) -> u64 {
        self.replies_dropped.load(Ordering::Relaxed)
    }
    /// Messages that did not decode into an envelope.
    pub fn malformed_messages(&self) -> u64 {
        self.malformed_messages.load(Ordering::Relaxed)
    }
    /// Reported server channel misuses.
    pub fn channel_misuses(&self) -> u64 {
        self.channel_misuses.load(Ordering::Relaxed)
    }
    /// Client calls registered.
    pub fn calls_started(&self) -> u64 {
        self.calls_started.load(Ordering::Relaxed)
    }
    /// Client calls completed by a reply.
    pub fn calls_completed(&self) -> u64 {
        self.calls_completed.load(Ordering::Relaxed)
    }
    /// Client calls that hit their deadline.
    pub fn calls_timed_out(&self) -> u64 {
        self.calls_timed_out.load(Ordering::Relaxed)
    }
    /// Client calls cancelled locally or by connection loss.
    pub fn calls_cancelled(&self) -> u64 {
        self.calls_cancelled.load(Ordering::Relaxed)
    }
    /// Replies for unknown or already completed calls.
    pub fn late_replies(&self) -> u64 {
        self.late_replies.load(Ordering::Relaxed)
    }

    /// Connections currently open.
    pub fn active_connections(&self) -> u64 {
        self.connections_opened()
            .saturating_sub(self.connections_closed())
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened(),
            connections_closed: self.connections_closed(),
            requests_received: self.requests_received(),
            requests_dispatched: self.requests_dispatched(),
            replies_sent: self.replies_sent(),
            replies_dropped: self.replies_dropped(),
            malformed_messages: self.malformed_messages(),
            channel_misuses: self.channel_misuses(),
            calls_started: self.calls_started(),
            calls_completed: self.calls_completed(),
            calls_timed_out: self.calls_timed_out(),
            calls_cancelled: self.calls_cancelled(),
            late_replies: self.late_replies(),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.connections_opened.store(0, Ordering::Relaxed);
        self.connections_closed.store(0, Ordering::Relaxed);
        self.requests_received.store(0, Ordering::Relaxed);
        self.requests_dispatched.store(0, Ordering::Relaxed);
        self.replies_sent.store(0, Ordering::Relaxed);
        self.replies_dropped.store(0, Ordering::Relaxed);
        self.malformed_messages.store(0, Ordering::Relaxed);
        self.channel_misuses.store(0, Ordering::Relaxed);
        self.calls_started.store(0, Ordering::Relaxed);
        self.calls_completed.store(0, Ordering::Relaxed);
        self.calls_timed_out.store(0, Ordering::Relaxed);
        self.calls_cancelled.store(0, Ordering::Relaxed);
        self.late_replies.store(0, Ordering::Relaxed);
    }
}
