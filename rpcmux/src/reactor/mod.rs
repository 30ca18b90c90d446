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


//! The connection manager and its I/O reactor.
//!
//! A [`ConnectionManager`] owns every socket of the process-side endpoint of
//! rpcmux. All reads and writes, envelope decoding, request dispatch entry and
//! client deadline handling happen on one dedicated reactor thread running a
//! current-thread tokio runtime. Other threads talk to the reactor only
//! through two queues:
//!
//! - the command queue, used by [`bind`](ConnectionManager::bind),
//!   [`connect`](ConnectionManager::connect), client calls and shutdown
//! - the reply queue ([`ReplySender`]), used to hand finished replies back
//!
//! Binding and connecting perform the blocking OS call on the caller's thread
//! so failures are reported synchronously; the resulting socket is then handed
//! over to the reactor and never touched by the caller again.
//!
//! ```rust,no_run
//! use rpcmux::{ConnectionManager, ConnectionManagerConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManager::new(ConnectionManagerConfig::default());
//! manager.start()?;
//! let connection = manager.connect("tcp://127.0.0.1:5555")?;
//! println!("connected as {}", connection.id());
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

mod event_loop;
pub(crate) mod queue;

pub use queue::ReplySender;

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::client::pending::{CallKey, PendingCalls};
use crate::config::ConnectionManagerConfig;
use crate::envelope::{Reply, Request, RoutingIdentity};
use crate::observability::ReactorMetrics;
use crate::transport::{
    ConnectionId, Endpoint, InprocTransport, ListenerId, TcpTransport, Transport, TransportError,
};
use event_loop::{Reactor, Startup};
use queue::reply_queue;

/// Entry point for requests decoded by the reactor.
///
/// Called on the reactor thread, once per request envelope, in the order the
/// requests arrived on their connection. Implementations must not block; any
/// real work belongs on another thread, with the reply delivered through the
/// [`ReplySender`].
pub trait RequestHandler: Send + Sync + 'static {
    /// Handles one request received from `identity`.
    fn handle_request(&self, identity: RoutingIdentity, request: Request);
}

/// Listener as it travels from the binding thread to the reactor.
#[derive(Debug)]
pub(crate) enum PendingListener {
    Tcp(std::net::TcpListener),
    Inproc,
}

/// Instructions for the reactor.
pub(crate) enum Command {
    Listen {
        id: ListenerId,
        endpoint: Endpoint,
        listener: PendingListener,
        handler: Arc<dyn RequestHandler>,
    },
    AttachTcp {
        id: ConnectionId,
        stream: std::net::TcpStream,
    },
    ConnectInproc {
        listener: ListenerId,
        client: InprocTransport,
        server: InprocTransport,
    },
    Call {
        key: CallKey,
        message: Bytes,
    },
    Close {
        connection: ConnectionId,
    },
    Shutdown,
}

/// An outbound connection.
///
/// The handle is only an address: the socket itself belongs to the reactor.
/// Cloning it is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    identity: Bytes,
}

impl Connection {
    /// Connection id, unique within the process.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Endpoint this connection was made to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Identity bytes sent in the first frame of every request.
    pub fn identity(&self) -> &Bytes {
        &self.identity
    }
}

/// A bound listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle {
    id: ListenerId,
    endpoint: Endpoint,
    local_addr: Option<SocketAddr>,
}

impl ListenerHandle {
    /// Listener id.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// The endpoint clients should connect to.
    ///
    /// For TCP this reports the address actually bound, so binding port 0
    /// yields the ephemeral port chosen by the OS.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bound socket address, for TCP listeners.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

struct Shared {
    config: ConnectionManagerConfig,
    commands: mpsc::UnboundedSender<Command>,
    startup: Mutex<Option<Startup>>,
    replies: ReplySender,
    thread: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    inproc: Mutex<HashMap<String, ListenerId>>,
    pending: Arc<PendingCalls>,
    metrics: Arc<ReactorMetrics>,
}

const SHUTDOWN_DETAIL: &str = "connection manager shut down";

impl Shared {
    fn shutdown(&self) {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        let _ = self.commands.send(Command::Shutdown);

        // Never started: nothing will ever drain the queues.
        if self.startup.lock().take().is_some() {
            self.pending.close(SHUTDOWN_DETAIL);
        }

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("shutdown requested from the reactor thread, not joining");
                return;
            }
            if handle.join().is_err() {
                error!("reactor thread panicked");
                self.pending.close(SHUTDOWN_DETAIL);
            }
        }
        if first {
            info!("connection manager shut down");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owner of all connections and the reactor thread.
///
/// Cheap to clone; all clones control the same reactor. Dropping the last
/// clone shuts the reactor down.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Creates a connection manager. Nothing runs until [`start`](Self::start).
    pub fn new(config: ConnectionManagerConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (replies, reply_rx) = reply_queue();
        let metrics = Arc::new(ReactorMetrics::new());
        let pending = Arc::new(PendingCalls::new(metrics.clone()));

        Self {
            shared: Arc::new(Shared {
                config,
                commands,
                startup: Mutex::new(Some(Startup {
                    commands: command_rx,
                    replies: reply_rx,
                })),
                replies,
                thread: Mutex::new(None),
                closed: AtomicBool::new(false),
                inproc: Mutex::new(HashMap::new()),
                pending,
                metrics,
            }),
        }
    }

    /// The configuration this manager was created with.
    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.shared.config
    }

    /// Shared counters.
    pub fn metrics(&self) -> Arc<ReactorMetrics> {
        self.shared.metrics.clone()
    }

    /// A producer handle for the reply queue.
    pub fn reply_sender(&self) -> ReplySender {
        self.shared.replies.clone()
    }

    /// Queues a reply for delivery to `identity`. Callable from any thread.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the reactor has stopped.
    pub fn enqueue_reply(&self, identity: RoutingIdentity, reply: Reply) -> Result<(), TransportError> {
        self.shared.replies.enqueue(identity, reply)
    }

    /// `true` between a successful [`start`](Self::start) and shutdown.
    pub fn is_running(&self) -> bool {
        self.shared.thread.lock().is_some() && !self.shared.closed.load(Ordering::Acquire)
    }

    /// Launches the reactor thread.
    ///
    /// # Errors
    ///
    /// - [`TransportError::AlreadyStarted`] on the second call
    /// - [`TransportError::Closed`] after shutdown
    /// - [`TransportError::InvalidConfiguration`] if the configuration is unusable
    /// - [`TransportError::Io`] if the runtime or thread cannot be created
    pub fn start(&self) -> Result<(), TransportError> {
        let shared = &self.shared;
        let mut startup = shared.startup.lock();
        if startup.is_none() {
            return Err(if shared.closed.load(Ordering::Acquire) {
                TransportError::Closed
            } else {
                TransportError::AlreadyStarted
            });
        }
        shared.config.validate()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let Some(parts) = startup.take() else {
            return Err(TransportError::AlreadyStarted);
        };
        let reactor = Reactor::new(
            shared.config.clone(),
            parts,
            shared.pending.clone(),
            shared.metrics.clone(),
        );

        let spawned = thread::Builder::new()
            .name(shared.config.reactor_thread_name.clone())
            .spawn(move || runtime.block_on(reactor.run()));
        match spawned {
            Ok(handle) => {
                *shared.thread.lock() = Some(handle);
                info!(thread = %shared.config.reactor_thread_name, "reactor started");
                Ok(())
            }
            Err(e) => {
                shared.closed.store(true, Ordering::Release);
                shared.pending.close(SHUTDOWN_DETAIL);
                Err(TransportError::Io { source: e })
            }
        }
    }

    /// Binds `endpoint` and routes every request received on it to `handler`.
    ///
    /// Allowed before or after [`start`](Self::start); connections are only
    /// accepted once the reactor runs.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidEndpoint`] for a malformed endpoint
    /// - [`TransportError::BindFailed`] if the TCP address cannot be bound
    /// - [`TransportError::AddressInUse`] if the in-process name is taken
    /// - [`TransportError::Closed`] after shutdown
    pub fn bind(
        &self,
        endpoint: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<ListenerHandle, TransportError> {
        self.ensure_open()?;
        let endpoint = Endpoint::parse(endpoint)?;
        let id = ListenerId::next();

        let (listener, handle) = match &endpoint {
            Endpoint::Tcp { address } => {
                let listener = TcpTransport::bind_std(address)?;
                let local_addr = listener.local_addr().ok();
                let bound = match local_addr {
                    Some(addr) => Endpoint::Tcp {
                        address: addr.to_string(),
                    },
                    None => endpoint.clone(),
                };
                let handle = ListenerHandle {
                    id,
                    endpoint: bound,
                    local_addr,
                };
                (PendingListener::Tcp(listener), handle)
            }
            Endpoint::Inproc { name } => {
                let mut names = self.shared.inproc.lock();
                if names.contains_key(name) {
                    return Err(TransportError::AddressInUse {
                        endpoint: endpoint.to_string(),
                    });
                }
                names.insert(name.clone(), id);
                let handle = ListenerHandle {
                    id,
                    endpoint: endpoint.clone(),
                    local_addr: None,
                };
                (PendingListener::Inproc, handle)
            }
        };

        let sent = self.send(Command::Listen {
            id,
            endpoint: handle.endpoint.clone(),
            listener,
            handler,
        });
        if let Err(e) = sent {
            if let Endpoint::Inproc { name } = &endpoint {
                self.shared.inproc.lock().remove(name);
            }
            return Err(e);
        }

        info!(endpoint = %handle.endpoint, listener = %id, "bound endpoint");
        Ok(handle)
    }

    /// Opens an outbound connection. Its identity is the connection id.
    ///
    /// # Errors
    ///
    /// See [`connect_with_identity`](Self::connect_with_identity).
    pub fn connect(&self, endpoint: &str) -> Result<Connection, TransportError> {
        self.connect_inner(endpoint, None)
    }

    /// Opens an outbound connection that sends `identity` with every request.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidEndpoint`] for a malformed endpoint
    /// - [`TransportError::ConnectionFailed`] if the peer cannot be reached or
    ///   no such in-process name is bound
    /// - [`TransportError::Timeout`] if the TCP connect timed out
    /// - [`TransportError::Closed`] after shutdown
    pub fn connect_with_identity(
        &self,
        endpoint: &str,
        identity: impl Into<Bytes>,
    ) -> Result<Connection, TransportError> {
        self.connect_inner(endpoint, Some(identity.into()))
    }

    fn connect_inner(
        &self,
        endpoint: &str,
        identity: Option<Bytes>,
    ) -> Result<Connection, TransportError> {
        self.ensure_open()?;
        let endpoint = Endpoint::parse(endpoint)?;

        let id = match &endpoint {
            Endpoint::Tcp { address } => {
                let stream = TcpTransport::connect_std(address, self.shared.config.connect_timeout)?;
                let id = ConnectionId::next();
                self.attach(id, Command::AttachTcp { id, stream })?;
                id
            }
            Endpoint::Inproc { name } => {
                let listener = self.shared.inproc.lock().get(name).copied();
                let Some(listener) = listener else {
                    return Err(TransportError::ConnectionFailed {
                        address: endpoint.to_string(),
                        source: io::Error::new(
                            io::ErrorKind::ConnectionRefused,
                            "no in-process endpoint with this name",
                        ),
                    });
                };
                let (client, server) = InprocTransport::pair(self.shared.config.inproc_buffer_size);
                let id = client.metadata().id;
                self.attach(
                    id,
                    Command::ConnectInproc {
                        listener,
                        client,
                        server,
                    },
                )?;
                id
            }
        };

        let identity =
            identity.unwrap_or_else(|| Bytes::copy_from_slice(&id.as_u64().to_be_bytes()));
        debug!(connection = %id, %endpoint, "connected");
        Ok(Connection {
            id,
            endpoint,
            identity,
        })
    }

    /// Closes an outbound connection. Calls still waiting on it complete with
    /// `Cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after shutdown.
    pub fn close(&self, connection: &Connection) -> Result<(), TransportError> {
        self.send(Command::Close {
            connection: connection.id,
        })
    }

    /// Stops the reactor, closes every socket and cancels every pending call.
    ///
    /// Blocks until the reactor thread has exited. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub(crate) fn pending(&self) -> &Arc<PendingCalls> {
        &self.shared.pending
    }

    pub(crate) fn submit_call(&self, key: CallKey, message: Bytes) -> Result<(), TransportError> {
        self.send(Command::Call { key, message })
    }

    /// Hands a new outbound connection to the reactor. Calls may be issued
    /// on it as soon as this returns.
    fn attach(&self, id: ConnectionId, command: Command) -> Result<(), TransportError> {
        self.shared.pending.open_connection(id);
        self.send(command).inspect_err(|_| {
            self.shared.pending.fail_connection(id, SHUTDOWN_DETAIL);
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<(), TransportError> {
        self.shared
            .commands
            .send(command)
            .map_err(|_| TransportError::Closed)
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("running", &self.is_running())
            .field("pending_calls", &self.shared.pending.len())
            .field("config", &self.shared.config)
            .finish()
    }
}
