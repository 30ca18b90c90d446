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


//! The reactor loop.
//!
//! Runs on the reactor thread inside a current-thread runtime. Each
//! connection gets a reader task and a writer task, and each TCP listener an
//! accept task. Readers and acceptors only forward what they see as
//! [`Event`]s; writers only drain their connection's outbound queue.
//! Everything else (decoding, dispatch, deadlines, routing of writes) happens
//! in [`Reactor::run`], which never waits on a socket: a peer that stops
//! reading only stalls its own writer task.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, error, info, trace, warn};

use super::queue::{QueuedReply, ReplyQueue};
use super::{Command, PendingListener, RequestHandler};
use crate::Status;
use crate::client::pending::{CallKey, PendingCalls};
use crate::config::ConnectionManagerConfig;
use crate::envelope::{Envelope, Reply, RoutingIdentity, codec};
use crate::error::RpcError;
use crate::observability::{ReactorMetrics, log_error};
use crate::serialization::framing::{FrameLimits, encode_message, read_message};
use crate::transport::{
    BoxedTransport, ConnectionId, Endpoint, ListenerId, TcpTransport, Transport, TransportError,
    TransportMetadata,
};

const SHUTDOWN_DETAIL: &str = "connection manager shut down";
const CONNECTION_LOST: &str = "connection lost";
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Queue ends the reactor takes over when it starts.
pub(crate) struct Startup {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub replies: ReplyQueue,
}

/// What reader, writer and accept tasks report back to the loop.
enum Event {
    Accepted {
        listener: ListenerId,
        transport: BoxedTransport,
    },
    Message {
        connection: ConnectionId,
        frames: Vec<Bytes>,
    },
    Closed {
        connection: ConnectionId,
        reason: String,
    },
}

/// An encoded message waiting for its connection's writer task.
enum Outbound {
    Request(Bytes),
    Reply(Bytes),
}

enum Role {
    /// Accepted by a listener; requests go to its handler.
    Server(Arc<dyn RequestHandler>),
    /// Opened by `connect`; replies go to the pending call table.
    Client,
}

struct ConnectionState {
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    role: Role,
    metadata: TransportMetadata,
}

struct ListenerState {
    endpoint: Endpoint,
    handler: Arc<dyn RequestHandler>,
    accept: Option<JoinHandle<()>>,
}

pub(crate) struct Reactor {
    config: ConnectionManagerConfig,
    limits: FrameLimits,
    commands: mpsc::UnboundedReceiver<Command>,
    replies: ReplyQueue,
    events_tx: mpsc::Sender<Event>,
    events: mpsc::Receiver<Event>,
    connections: HashMap<ConnectionId, ConnectionState>,
    listeners: HashMap<ListenerId, ListenerState>,
    pending: Arc<PendingCalls>,
    metrics: Arc<ReactorMetrics>,
}

impl Reactor {
    pub fn new(
        config: ConnectionManagerConfig,
        startup: Startup,
        pending: Arc<PendingCalls>,
        metrics: Arc<ReactorMetrics>,
    ) -> Self {
        let (events_tx, events) = mpsc::channel(config.read_queue_capacity);
        Self {
            limits: config.frame_limits(),
            config,
            commands: startup.commands,
            replies: startup.replies,
            events_tx,
            events,
            connections: HashMap::new(),
            listeners: HashMap::new(),
            pending,
            metrics,
        }
    }

    pub async fn run(mut self) {
        debug!("reactor loop running");
        loop {
            let next_deadline = self.pending.next_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(event) = self.events.recv() => self.on_event(event),
                Some(queued) = self.replies.recv() => self.write_reply(queued),
                () = sleep_until(next_deadline) => self.expire_deadlines(),
            }
        }
        self.shutdown();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Listen {
                id,
                endpoint,
                listener,
                handler,
            } => self.add_listener(id, endpoint, listener, handler),
            Command::AttachTcp { id, stream } => {
                match TcpTransport::from_std(stream, id, self.config.tcp_nodelay) {
                    Ok(transport) => self.add_connection(Box::new(transport), Role::Client),
                    Err(e) => {
                        warn!(connection = %id, "failed to register connection");
                        log_connection_error(id, e);
                        self.pending.fail_connection(id, CONNECTION_LOST);
                    }
                }
            }
            Command::ConnectInproc {
                listener,
                client,
                server,
            } => {
                let handler = self.listeners.get(&listener).map(|l| l.handler.clone());
                match handler {
                    Some(handler) => {
                        self.add_connection(Box::new(server), Role::Server(handler));
                        self.add_connection(Box::new(client), Role::Client);
                    }
                    None => {
                        let id = client.metadata().id;
                        warn!(connection = %id, %listener, "in-process listener is gone");
                        self.pending.fail_connection(id, CONNECTION_LOST);
                    }
                }
            }
            Command::Call { key, message } => self.send_call(key, message),
            Command::Close { connection } => self.close_connection(connection, "closed locally"),
            Command::Shutdown => {}
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Accepted {
                listener,
                transport,
            } => {
                let handler = self.listeners.get(&listener).map(|l| l.handler.clone());
                if let Some(handler) = handler {
                    self.add_connection(transport, Role::Server(handler));
                }
            }
            Event::Message { connection, frames } => self.on_message(connection, frames),
            Event::Closed { connection, reason } => self.close_connection(connection, &reason),
        }
    }

    fn add_listener(
        &mut self,
        id: ListenerId,
        endpoint: Endpoint,
        listener: PendingListener,
        handler: Arc<dyn RequestHandler>,
    ) {
        let accept = match listener {
            PendingListener::Tcp(listener) => match tokio::net::TcpListener::from_std(listener) {
                Ok(listener) => Some(tokio::spawn(accept_loop(
                    id,
                    listener,
                    self.config.tcp_nodelay,
                    self.events_tx.clone(),
                ))),
                Err(e) => {
                    error!(%endpoint, error = %e, "failed to register listener");
                    return;
                }
            },
            PendingListener::Inproc => None,
        };
        debug!(%endpoint, listener = %id, "listening");
        self.listeners.insert(
            id,
            ListenerState {
                endpoint,
                handler,
                accept,
            },
        );
    }

    fn add_connection(&mut self, transport: BoxedTransport, role: Role) {
        let metadata = transport.metadata().clone();
        let id = metadata.id;
        let (reader, writer) = tokio::io::split(transport);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(id, reader, self.limits, self.events_tx.clone()));
        let writer = tokio::spawn(write_loop(
            id,
            writer,
            outbound_rx,
            self.metrics.clone(),
            self.events_tx.clone(),
        ));

        self.metrics.record_connection_opened();
        debug!(
            connection = %id,
            kind = %metadata.kind,
            peer = ?metadata.peer_addr,
            "connection opened"
        );
        self.connections.insert(
            id,
            ConnectionState {
                outbound,
                reader,
                writer,
                role,
                metadata,
            },
        );
    }

    fn on_message(&mut self, connection: ConnectionId, frames: Vec<Bytes>) {
        let Some(state) = self.connections.get(&connection) else {
            return;
        };

        match (codec::decode(frames), &state.role) {
            (Err(e), _) => {
                self.metrics.record_malformed_message();
                debug!(%connection, "dropping malformed message");
                log_connection_error(connection, e);
            }
            (Ok((peer, Envelope::Request(request))), Role::Server(handler)) => {
                self.metrics.record_request_received();
                trace!(
                    %connection,
                    request_id = %request.request_id,
                    service = %request.service,
                    method = %request.method,
                    "request received"
                );
                handler.handle_request(RoutingIdentity::new(connection, peer), request);
            }
            (Ok((_, Envelope::Reply(reply))), Role::Client) => {
                self.pending.complete(connection, reply);
            }
            (Ok((_, envelope)), _) => {
                self.metrics.record_malformed_message();
                warn!(
                    %connection,
                    request_id = %envelope.request_id(),
                    "dropping envelope sent in the wrong direction"
                );
            }
        }
    }

    fn send_call(&mut self, key: CallKey, message: Bytes) {
        // Cancelled, abandoned or expired before it reached the wire.
        if !self.pending.contains(key) {
            return;
        }
        if self.queue_write(key.connection, Outbound::Request(message)) {
            trace!(connection = %key.connection, request_id = %key.request_id, "request queued");
        } else {
            self.pending.cancel(key, CONNECTION_LOST);
        }
    }

    fn write_reply(&mut self, queued: QueuedReply) {
        let QueuedReply { identity, reply } = queued;
        let connection = identity.connection_id();
        if !self.connections.contains_key(&connection) {
            self.metrics.record_reply_dropped();
            debug!(%connection, request_id = %reply.request_id, "discarding reply for closed connection");
            return;
        }

        let message = match encode_message(&codec::encode_reply(identity.peer(), &reply), self.limits) {
            Ok(message) => message,
            Err(e) => {
                warn!(%connection, request_id = %reply.request_id, error = %e, "reply exceeds frame limits");
                let fallback = Reply::error(
                    reply.request_id,
                    Status::ApplicationError,
                    "reply exceeds frame limits",
                );
                match encode_message(&codec::encode_reply(identity.peer(), &fallback), self.limits) {
                    Ok(message) => message,
                    Err(_) => {
                        self.metrics.record_reply_dropped();
                        return;
                    }
                }
            }
        };

        if !self.queue_write(connection, Outbound::Reply(message)) {
            self.metrics.record_reply_dropped();
            debug!(%connection, request_id = %reply.request_id, "writer is gone, discarding reply");
        }
    }

    /// Hands a message to the connection's writer task. `false` if the
    /// connection is closed or its writer already failed.
    fn queue_write(&self, connection: ConnectionId, message: Outbound) -> bool {
        self.connections
            .get(&connection)
            .is_some_and(|state| state.outbound.send(message).is_ok())
    }

    fn expire_deadlines(&mut self) {
        let expired = self.pending.expire_due(Instant::now());
        if expired > 0 {
            trace!(expired, "expired calls");
        }
    }

    fn close_connection(&mut self, connection: ConnectionId, reason: &str) {
        let Some(state) = self.connections.remove(&connection) else {
            return;
        };
        // Dropping both halves closes the socket; queued writes are discarded.
        state.reader.abort();
        state.writer.abort();
        self.metrics.record_connection_closed();

        let failed = match state.role {
            Role::Client => self.pending.fail_connection(connection, CONNECTION_LOST),
            Role::Server(_) => 0,
        };
        debug!(
            %connection,
            reason,
            failed_calls = failed,
            age = ?state.metadata.age(),
            "connection closed"
        );
    }

    fn shutdown(mut self) {
        self.commands.close();
        self.replies.close();

        for (id, listener) in self.listeners.drain() {
            if let Some(accept) = listener.accept {
                accept.abort();
            }
            trace!(listener = %id, endpoint = %listener.endpoint, "listener closed");
        }
        let connections: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for connection in connections {
            self.close_connection(connection, SHUTDOWN_DETAIL);
        }

        let cancelled = self.pending.close(SHUTDOWN_DETAIL);
        // Calls racing the shutdown were cancelled by `close` above; the
        // remaining commands only hold sockets to drop.
        while self.commands.try_recv().is_ok() {}
        while self.replies.try_recv().is_some() {
            self.metrics.record_reply_dropped();
        }
        info!(cancelled_calls = cancelled, "reactor stopped");
    }
}

fn log_connection_error(connection: ConnectionId, error: impl Into<RpcError>) {
    let _span = debug_span!("connection", %connection).entered();
    log_error(&error.into());
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

async fn read_loop(
    connection: ConnectionId,
    mut reader: ReadHalf<BoxedTransport>,
    limits: FrameLimits,
    events: mpsc::Sender<Event>,
) {
    let reason = loop {
        match read_message(&mut reader, limits).await {
            Ok(Some(frames)) => {
                // Waits while the reactor is behind, which stops this reader.
                if events.send(Event::Message { connection, frames }).await.is_err() {
                    return;
                }
            }
            Ok(None) => break "peer closed the connection".to_string(),
            Err(e) => break e.to_string(),
        }
    };
    let _ = events.send(Event::Closed { connection, reason }).await;
}

async fn write_loop(
    connection: ConnectionId,
    mut writer: WriteHalf<BoxedTransport>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    metrics: Arc<ReactorMetrics>,
    events: mpsc::Sender<Event>,
) {
    while let Some(message) = outbound.recv().await {
        let (bytes, is_reply) = match message {
            Outbound::Request(bytes) => (bytes, false),
            Outbound::Reply(bytes) => (bytes, true),
        };
        // Flush once the queue runs dry so bursts share a flush.
        let written = match writer.write_all(&bytes).await {
            Ok(()) if outbound.is_empty() => writer.flush().await,
            other => other,
        };
        match written {
            Ok(()) => {
                if is_reply {
                    metrics.record_reply_sent();
                }
            }
            Err(source) => {
                if is_reply {
                    metrics.record_reply_dropped();
                }
                let error = TransportError::WriteFailed { source };
                let reason = error.to_string();
                log_connection_error(connection, error);
                let _ = events.send(Event::Closed { connection, reason }).await;
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn accept_loop(
    listener_id: ListenerId,
    listener: tokio::net::TcpListener,
    nodelay: bool,
    events: mpsc::Sender<Event>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => match TcpTransport::new(stream, nodelay) {
                Ok(transport) => {
                    trace!(listener = %listener_id, %peer, "accepted connection");
                    let event = Event::Accepted {
                        listener: listener_id,
                        transport: Box::new(transport),
                    };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!(listener = %listener_id, %peer, error = %e, "failed to set up accepted connection"),
            },
            Err(e) => {
                warn!(listener = %listener_id, error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
