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


//! Tracking of client calls awaiting a reply.
//!
//! The table is shared between calling threads, which register calls and
//! cancel them, and the reactor thread, which completes them from replies,
//! deadlines and connection loss. Every terminal transition removes the entry
//! under the lock before the outcome is delivered, so a call completes at
//! most once no matter which side gets there first.
//!
//! The table also owns the deadline index. A call leaves the index in the
//! same critical section that removes its entry, so the index never holds
//! more than the calls still waiting.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::envelope::{Reply, RequestId};
use crate::observability::ReactorMetrics;
use crate::transport::{ConnectionId, TransportError};
use crate::{CallError, RpcError, Status};

/// Outcome delivered to a [`PendingCall`](crate::PendingCall).
pub(crate) type CallOutcome = Result<Bytes, CallError>;

/// Identifies one registered call.
///
/// `seq` is unique per table and keeps a stale deadline or cancel handle from
/// touching a later call that happens to reuse the same request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct CallKey {
    pub connection: ConnectionId,
    pub request_id: RequestId,
    pub seq: u64,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    service: String,
    deadline: Option<Instant>,
    sender: oneshot::Sender<CallOutcome>,
}

#[derive(Debug)]
struct ConnectionCalls {
    next_id: u64,
    calls: HashMap<RequestId, Entry>,
}

impl ConnectionCalls {
    fn new() -> Self {
        Self {
            next_id: 1,
            calls: HashMap::new(),
        }
    }

    /// Takes the next id, skipping zero on wrap.
    fn take_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id = match self.next_id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        RequestId::new(id)
    }
}

#[derive(Debug, Default)]
struct TableState {
    /// One record per connection the reactor still owns.
    connections: HashMap<ConnectionId, ConnectionCalls>,
    deadlines: BTreeSet<(Instant, CallKey)>,
    next_seq: u64,
    closed: bool,
}

impl TableState {
    fn unindex(&mut self, connection: ConnectionId, request_id: RequestId, entry: &Entry) {
        if let Some(at) = entry.deadline {
            self.deadlines.remove(&(
                at,
                CallKey {
                    connection,
                    request_id,
                    seq: entry.seq,
                },
            ));
        }
    }
}

/// A freshly registered call.
#[derive(Debug)]
pub(crate) struct Registration {
    pub key: CallKey,
    pub receiver: oneshot::Receiver<CallOutcome>,
}

/// Pending call table of one connection manager.
#[derive(Debug)]
pub(crate) struct PendingCalls {
    state: Mutex<TableState>,
    metrics: Arc<ReactorMetrics>,
}

impl PendingCalls {
    pub fn new(metrics: Arc<ReactorMetrics>) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            metrics,
        }
    }

    /// Starts tracking a connection. Calls can only be registered on
    /// connections that are open and not yet failed.
    pub fn open_connection(&self, connection: ConnectionId) {
        let mut state = self.state.lock();
        if !state.closed {
            state
                .connections
                .entry(connection)
                .or_insert_with(ConnectionCalls::new);
        }
    }

    /// Assigns the connection's next request id and registers a call under it.
    pub fn register(
        &self,
        connection: ConnectionId,
        service: &str,
        deadline: Option<Instant>,
    ) -> Result<Registration, RpcError> {
        let (sender, receiver) = oneshot::channel();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(TransportError::Closed.into());
        }
        let Some(calls) = state.connections.get_mut(&connection) else {
            return Err(TransportError::UnknownConnection { connection }.into());
        };

        let request_id = calls.take_id();
        if calls.calls.contains_key(&request_id) {
            return Err(RpcError::RequestIdInUse {
                connection,
                request_id,
            });
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        calls.calls.insert(
            request_id,
            Entry {
                seq,
                service: service.to_string(),
                deadline,
                sender,
            },
        );
        if let Some(at) = deadline {
            state.deadlines.insert((
                at,
                CallKey {
                    connection,
                    request_id,
                    seq,
                },
            ));
        }
        drop(guard);

        self.metrics.record_call_started();
        trace!(%connection, %request_id, service, "registered call");
        Ok(Registration {
            key: CallKey {
                connection,
                request_id,
                seq,
            },
            receiver,
        })
    }

    fn take(&self, connection: ConnectionId, request_id: RequestId, seq: Option<u64>) -> Option<Entry> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let calls = state.connections.get_mut(&connection)?;
        let current = calls
            .calls
            .get(&request_id)
            .is_some_and(|entry| seq.is_none_or(|seq| seq == entry.seq));
        if !current {
            return None;
        }
        let entry = calls.calls.remove(&request_id)?;
        state.unindex(connection, request_id, &entry);
        Some(entry)
    }

    /// Completes the call a reply answers. Returns `false` for a late reply.
    pub fn complete(&self, connection: ConnectionId, reply: Reply) -> bool {
        let Some(entry) = self.take(connection, reply.request_id, None) else {
            self.metrics.record_late_reply();
            debug!(%connection, request_id = %reply.request_id, status = %reply.status, "discarding late reply");
            return false;
        };

        self.metrics.record_call_completed();
        let outcome = if reply.status.is_ok() {
            Ok(reply.payload)
        } else {
            Err(CallError::new(reply.status, reply.detail()))
        };
        trace!(%connection, request_id = %reply.request_id, service = %entry.service, "call completed");
        // The caller may have stopped waiting; that is not an error.
        let _ = entry.sender.send(outcome);
        true
    }

    /// Fails a call whose deadline passed. No-op if it already completed.
    pub fn expire(&self, key: CallKey) -> bool {
        let Some(entry) = self.take(key.connection, key.request_id, Some(key.seq)) else {
            return false;
        };
        self.metrics.record_call_timed_out();
        debug!(connection = %key.connection, request_id = %key.request_id, service = %entry.service, "call deadline exceeded");
        let _ = entry
            .sender
            .send(Err(CallError::new(Status::DeadlineExceeded, "deadline exceeded")));
        true
    }

    /// Earliest deadline among the calls still waiting.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.lock().deadlines.first().map(|(at, _)| *at)
    }

    /// Fails every call whose deadline is at or before `now`.
    pub fn expire_due(&self, now: Instant) -> usize {
        let due: Vec<CallKey> = {
            let mut state = self.state.lock();
            let mut due = Vec::new();
            while let Some(&(at, key)) = state.deadlines.first() {
                if at > now {
                    break;
                }
                state.deadlines.pop_first();
                due.push(key);
            }
            due
        };
        due.into_iter().filter(|key| self.expire(*key)).count()
    }

    /// Cancels one call locally. No-op if it already completed.
    pub fn cancel(&self, key: CallKey, detail: &str) -> bool {
        let Some(entry) = self.take(key.connection, key.request_id, Some(key.seq)) else {
            return false;
        };
        self.metrics.record_call_cancelled();
        let _ = entry
            .sender
            .send(Err(CallError::new(Status::Cancelled, detail)));
        true
    }

    /// Forgets a call whose caller stopped waiting.
    pub fn abandon(&self, key: CallKey) {
        if self
            .take(key.connection, key.request_id, Some(key.seq))
            .is_some()
        {
            trace!(connection = %key.connection, request_id = %key.request_id, "call abandoned");
        }
    }

    /// Cancels every call on a connection and stops tracking it. Later
    /// registrations on the connection are refused.
    pub fn fail_connection(&self, connection: ConnectionId, detail: &str) -> usize {
        let removed = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let removed = state.connections.remove(&connection);
            if let Some(calls) = &removed {
                for (request_id, entry) in &calls.calls {
                    state.unindex(connection, *request_id, entry);
                }
            }
            removed
        };
        let Some(calls) = removed else {
            return 0;
        };
        let count = calls.calls.len();
        for (_, entry) in calls.calls {
            self.metrics.record_call_cancelled();
            let _ = entry
                .sender
                .send(Err(CallError::new(Status::Cancelled, detail)));
        }
        if count > 0 {
            debug!(%connection, count, detail, "cancelled pending calls");
        }
        count
    }

    /// Cancels every call and refuses new registrations.
    pub fn close(&self, detail: &str) -> usize {
        let connections = {
            let mut state = self.state.lock();
            state.closed = true;
            state.deadlines.clear();
            std::mem::take(&mut state.connections)
        };
        let mut count = 0;
        for (_, calls) in connections {
            for (_, entry) in calls.calls {
                count += 1;
                self.metrics.record_call_cancelled();
                let _ = entry
                    .sender
                    .send(Err(CallError::new(Status::Cancelled, detail)));
            }
        }
        count
    }

    pub fn contains(&self, key: CallKey) -> bool {
        self.state
            .lock()
            .connections
            .get(&key.connection)
            .and_then(|calls| calls.calls.get(&key.request_id))
            .is_some_and(|entry| entry.seq == key.seq)
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .connections
            .values()
            .map(|calls| calls.calls.len())
            .sum()
    }

    #[cfg(test)]
    fn set_next_id(&self, connection: ConnectionId, next_id: u64) {
        self.state
            .lock()
            .connections
            .entry(connection)
            .or_insert_with(ConnectionCalls::new)
            .next_id = next_id;
    }

    #[cfg(test)]
    fn tracked_connections(&self) -> usize {
        self.state.lock().connections.len()
    }

    #[cfg(test)]
    fn indexed_deadlines(&self) -> usize {
        self.state.lock().deadlines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn table() -> PendingCalls {
        let table = PendingCalls::new(Arc::new(ReactorMetrics::new()));
        for id in 1..=2 {
            table.open_connection(ConnectionId::new(id));
        }
        table
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let table = table();
        let conn = ConnectionId::new(1);
        let a = table.register(conn, "Echo", None).unwrap();
        let b = table.register(conn, "Echo", None).unwrap();
        assert_eq!(a.key.request_id, RequestId::new(1));
        assert_eq!(b.key.request_id, RequestId::new(2));

        // Counters are per connection.
        let c = table.register(ConnectionId::new(2), "Echo", None).unwrap();
        assert_eq!(c.key.request_id, RequestId::new(1));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_wrap_skips_zero() {
        let table = table();
        let conn = ConnectionId::new(1);
        table.set_next_id(conn, u64::MAX);
        let last = table.register(conn, "Echo", None).unwrap();
        let wrapped = table.register(conn, "Echo", None).unwrap();
        assert_eq!(last.key.request_id, RequestId::new(u64::MAX));
        assert_eq!(wrapped.key.request_id, RequestId::new(1));
    }

    #[test]
    fn test_live_id_is_not_reused() {
        let table = table();
        let conn = ConnectionId::new(1);
        let _first = table.register(conn, "Echo", None).unwrap();
        table.set_next_id(conn, 1);
        let err = table.register(conn, "Echo", None).unwrap_err();
        assert!(matches!(
            err,
            RpcError::RequestIdInUse { request_id, .. } if request_id == RequestId::new(1)
        ));
        // The counter moved on, so the next call succeeds with id 2.
        assert_eq!(
            table.register(conn, "Echo", None).unwrap().key.request_id,
            RequestId::new(2)
        );
    }

    #[tokio::test]
    async fn test_complete_once_then_late() {
        let table = table();
        let conn = ConnectionId::new(1);
        let reg = table.register(conn, "Echo", None).unwrap();

        let reply = Reply::ok(reg.key.request_id, Bytes::from_static(b"hi"));
        assert!(table.complete(conn, reply.clone()));
        assert!(!table.complete(conn, reply));
        assert_eq!(reg.receiver.await.unwrap(), Ok(Bytes::from_static(b"hi")));
        assert_eq!(table.metrics.late_replies(), 1);
    }

    #[tokio::test]
    async fn test_error_reply_maps_to_call_error() {
        let table = table();
        let conn = ConnectionId::new(1);
        let reg = table.register(conn, "Echo", None).unwrap();
        table.complete(
            conn,
            Reply::error(reg.key.request_id, Status::MethodNotFound, "Missing"),
        );
        assert_eq!(
            reg.receiver.await.unwrap(),
            Err(CallError::new(Status::MethodNotFound, "Missing"))
        );
    }

    #[tokio::test]
    async fn test_expire_respects_seq() {
        let table = table();
        let conn = ConnectionId::new(1);
        let reg = table.register(conn, "Echo", None).unwrap();
        let stale = CallKey {
            seq: reg.key.seq + 100,
            ..reg.key
        };
        assert!(!table.expire(stale));
        assert!(table.contains(reg.key));

        assert!(table.expire(reg.key));
        assert!(!table.contains(reg.key));
        let outcome = reg.receiver.await.unwrap();
        assert_eq!(outcome.unwrap_err().status, Status::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_fail_connection() {
        let table = table();
        let conn = ConnectionId::new(1);
        let a = table.register(conn, "Echo", None).unwrap();
        let b = table.register(conn, "Echo", None).unwrap();
        let other = table.register(ConnectionId::new(2), "Echo", None).unwrap();

        assert_eq!(table.fail_connection(conn, "connection lost"), 2);
        for reg in [a, b] {
            let err = reg.receiver.await.unwrap().unwrap_err();
            assert_eq!(err, CallError::new(Status::Cancelled, "connection lost"));
        }
        assert!(table.contains(other.key));
    }

    #[test]
    fn test_close_refuses_new_calls() {
        let table = table();
        let conn = ConnectionId::new(1);
        let _reg = table.register(conn, "Echo", None).unwrap();
        assert_eq!(table.close("connection manager shut down"), 1);
        assert!(matches!(
            table.register(conn, "Echo", None),
            Err(RpcError::Transport(TransportError::Closed))
        ));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_deadlines_expire_in_order() {
        let table = table();
        let conn = ConnectionId::new(1);
        let now = Instant::now();
        let early = table
            .register(conn, "Echo", Some(now + Duration::from_millis(5)))
            .unwrap();
        let late = table
            .register(conn, "Echo", Some(now + Duration::from_secs(60)))
            .unwrap();
        assert_eq!(table.next_deadline(), Some(now + Duration::from_millis(5)));

        assert_eq!(table.expire_due(now + Duration::from_millis(10)), 1);
        assert_eq!(
            early.receiver.await.unwrap().unwrap_err().status,
            Status::DeadlineExceeded
        );
        assert!(table.contains(late.key));
        assert_eq!(table.next_deadline(), Some(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_finished_calls_leave_deadline_index() {
        let table = table();
        let conn = ConnectionId::new(1);
        let deadline = Some(Instant::now() + Duration::from_secs(3600));

        let completed = table.register(conn, "Echo", deadline).unwrap();
        let cancelled = table.register(conn, "Echo", deadline).unwrap();
        let abandoned = table.register(conn, "Echo", deadline).unwrap();
        let lost = table
            .register(ConnectionId::new(2), "Echo", deadline)
            .unwrap();
        assert_eq!(table.indexed_deadlines(), 4);

        table.complete(conn, Reply::ok(completed.key.request_id, Bytes::new()));
        table.cancel(cancelled.key, "cancelled");
        table.abandon(abandoned.key);
        table.fail_connection(lost.key.connection, "connection lost");

        assert_eq!(table.indexed_deadlines(), 0);
        assert_eq!(table.next_deadline(), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_failed_connection_refuses_calls() {
        let table = table();
        let conn = ConnectionId::new(1);
        table.fail_connection(conn, "connection lost");

        let err = table.register(conn, "Echo", None).unwrap_err();
        assert!(matches!(
            err,
            RpcError::Transport(TransportError::UnknownConnection { connection }) if connection == conn
        ));
        assert!(matches!(
            table.register(ConnectionId::new(9), "Echo", None),
            Err(RpcError::Transport(TransportError::UnknownConnection { .. }))
        ));
        assert_eq!(table.tracked_connections(), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_abandon_frees_id() {
        let table = table();
        let conn = ConnectionId::new(1);
        let reg = table.register(conn, "Echo", None).unwrap();
        table.abandon(reg.key);
        assert_eq!(table.len(), 0);
        assert!(!table.cancel(reg.key, "cancelled"));
    }
}
