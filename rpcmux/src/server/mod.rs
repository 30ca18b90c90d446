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


//! Service registry and request dispatch.
//!
//! A [`Server`] collects services by name, then [`start`](Server::start)
//! freezes the registry. From then on the reactor resolves every incoming
//! request against the frozen map without taking a lock. Requests for an
//! unknown service are answered with `ServiceNotFound` straight away; all
//! others are handed to their [`RpcService`] together with a
//! [`ServerChannel`] for the reply.

mod channel;

pub use channel::ServerChannel;

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, trace};

use crate::config::MisusePolicy;
use crate::envelope::{MethodSelector, Reply, Request, RoutingIdentity};
use crate::error::ServerError;
use crate::observability::ReactorMetrics;
use crate::reactor::{ConnectionManager, ListenerHandle, ReplySender, RequestHandler};
use crate::transport::TransportError;
use crate::Status;

/// A service reachable over rpcmux.
///
/// `dispatch` runs on the reactor thread and must return quickly. It owns the
/// obligation to complete `channel` exactly once, either before returning or
/// later from any thread.
pub trait RpcService: Send + Sync + 'static {
    /// Handles one call of `method` with its raw request payload.
    fn dispatch(&self, method: &MethodSelector, payload: Bytes, channel: ServerChannel);
}

impl<T: RpcService + ?Sized> RpcService for Arc<T> {
    fn dispatch(&self, method: &MethodSelector, payload: Bytes, channel: ServerChannel) {
        (**self).dispatch(method, payload, channel)
    }
}

/// A service that knows the name it should be registered under.
pub trait NamedService {
    /// Registry name.
    fn service_name(&self) -> &str;
}

type Registry = HashMap<String, Arc<dyn RpcService>>;

/// The request handler a server installs on its listeners.
struct Dispatcher {
    registry: OnceLock<Registry>,
    replies: ReplySender,
    policy: MisusePolicy,
    metrics: Arc<ReactorMetrics>,
}

impl RequestHandler for Dispatcher {
    fn handle_request(&self, identity: RoutingIdentity, request: Request) {
        let Request {
            request_id,
            service,
            method,
            payload,
        } = request;

        let Some(target) = self.registry.get().and_then(|registry| registry.get(&service)) else {
            debug!(
                connection = %identity.connection_id(),
                %request_id,
                %service,
                "no such service"
            );
            let reply = Reply::error(
                request_id,
                Status::ServiceNotFound,
                format!("no service named '{service}'"),
            );
            if let Err(e) = self.replies.enqueue(identity, reply) {
                debug!(%request_id, error = %e, "reply discarded, reactor has stopped");
            }
            return;
        };

        self.metrics.record_request_dispatched();
        trace!(%request_id, %service, %method, "dispatching");
        let channel = ServerChannel::new(
            identity,
            request_id,
            self.replies.clone(),
            self.policy,
            self.metrics.clone(),
        );
        target.dispatch(&method, payload, channel);
    }
}

/// Registry of services served through one connection manager.
///
/// # Examples
///
/// ```rust,no_run
/// use rpcmux::{ConnectionManager, ConnectionManagerConfig, Server};
/// # use rpcmux::{MethodSelector, RpcService, ServerChannel};
/// # struct Echo;
/// # impl RpcService for Echo {
/// #     fn dispatch(&self, _: &MethodSelector, payload: bytes::Bytes, channel: ServerChannel) {
/// #         let _ = channel.send(payload);
/// #     }
/// # }
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConnectionManager::new(ConnectionManagerConfig::default());
/// let mut server = Server::new(&manager);
/// server.register_service_as(Echo, "Echo")?;
/// let listener = server.bind("tcp://127.0.0.1:0")?;
/// server.start()?;
/// manager.start()?;
/// println!("serving on {}", listener.endpoint());
/// # Ok(())
/// # }
/// ```
pub struct Server {
    manager: ConnectionManager,
    staged: Registry,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Creates a server that receives requests through `manager`.
    pub fn new(manager: &ConnectionManager) -> Self {
        let dispatcher = Dispatcher {
            registry: OnceLock::new(),
            replies: manager.reply_sender(),
            policy: manager.config().misuse_policy,
            metrics: manager.metrics(),
        };
        Self {
            manager: manager.clone(),
            staged: HashMap::new(),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Registers a service under its own name.
    ///
    /// # Errors
    ///
    /// See [`register_service_as`](Self::register_service_as).
    pub fn register_service<T>(&mut self, service: T) -> Result<(), ServerError>
    where
        T: RpcService + NamedService,
    {
        let name = service.service_name().to_string();
        self.register_service_as(service, name)
    }

    /// Registers a service under `name`.
    ///
    /// # Errors
    ///
    /// - [`ServerError::InvalidName`] for an empty name
    /// - [`ServerError::DuplicateName`] if the name is taken
    /// - [`ServerError::AlreadyStarted`] after [`start`](Self::start)
    pub fn register_service_as(
        &mut self,
        service: impl RpcService,
        name: impl Into<String>,
    ) -> Result<(), ServerError> {
        let name = name.into();
        if self.is_started() {
            return Err(ServerError::AlreadyStarted);
        }
        if name.is_empty() {
            return Err(ServerError::InvalidName {
                name,
                reason: "service names must not be empty",
            });
        }
        if self.staged.contains_key(&name) {
            return Err(ServerError::DuplicateName { name });
        }

        debug!(service = %name, "registered service");
        self.staged.insert(name, Arc::new(service));
        Ok(())
    }

    /// Binds `endpoint` with this server as its request handler.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::bind`].
    pub fn bind(&self, endpoint: &str) -> Result<ListenerHandle, TransportError> {
        self.manager.bind(endpoint, self.dispatcher.clone())
    }

    /// Freezes the registry. Requests are only routed to services from now on.
    ///
    /// Does not start the connection manager.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyStarted`] on the second call.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let registry = std::mem::take(&mut self.staged);
        let count = registry.len();
        if let Err(registry) = self.dispatcher.registry.set(registry) {
            self.staged = registry;
            return Err(ServerError::AlreadyStarted);
        }
        info!(services = count, "server started");
        Ok(())
    }

    /// `true` once [`start`](Self::start) succeeded.
    pub fn is_started(&self) -> bool {
        self.dispatcher.registry.get().is_some()
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let registry = self.dispatcher.registry.get().unwrap_or(&self.staged);
        let mut names: Vec<String> = registry.keys().cloned().collect();
        names.sort();
        names
    }

    /// The connection manager this server uses.
    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("services", &self.service_names())
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionManagerConfig;
    use crate::envelope::RequestId;
    use crate::reactor::queue::{ReplyQueue, reply_queue};
    use crate::transport::ConnectionId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl RpcService for Counting {
        fn dispatch(&self, method: &MethodSelector, payload: Bytes, channel: ServerChannel) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match method {
                MethodSelector::Name(name) if name == "Say" => {
                    let _ = channel.send(payload);
                }
                other => {
                    let _ = channel.send_error(Status::MethodNotFound, format!("no method {other}"));
                }
            }
        }
    }

    impl NamedService for Counting {
        fn service_name(&self) -> &str {
            "Echo"
        }
    }

    fn dispatcher(registry: Option<Registry>) -> (Dispatcher, ReplyQueue) {
        let (replies, queue) = reply_queue();
        let dispatcher = Dispatcher {
            registry: OnceLock::new(),
            replies,
            policy: MisusePolicy::Report,
            metrics: Arc::new(ReactorMetrics::new()),
        };
        if let Some(registry) = registry {
            dispatcher.registry.set(registry).ok().unwrap();
        }
        (dispatcher, queue)
    }

    fn request(service: &str, method: &str) -> Request {
        Request {
            request_id: RequestId::new(5),
            service: service.to_string(),
            method: method.into(),
            payload: Bytes::from_static(b"hi"),
        }
    }

    fn identity() -> RoutingIdentity {
        RoutingIdentity::new(ConnectionId::new(1), Bytes::from_static(b"client"))
    }

    #[test]
    fn test_registration_rules() {
        let manager = ConnectionManager::new(ConnectionManagerConfig::default());
        let mut server = Server::new(&manager);
        let calls = Arc::new(AtomicUsize::new(0));

        server.register_service(Counting { calls: calls.clone() }).unwrap();
        assert_eq!(
            server.register_service(Counting { calls: calls.clone() }),
            Err(ServerError::DuplicateName {
                name: "Echo".to_string()
            })
        );
        assert!(matches!(
            server.register_service_as(Counting { calls: calls.clone() }, ""),
            Err(ServerError::InvalidName { .. })
        ));
        server.register_service_as(Counting { calls: calls.clone() }, "Echo2").unwrap();
        assert_eq!(server.service_names(), vec!["Echo", "Echo2"]);

        server.start().unwrap();
        assert!(server.is_started());
        assert_eq!(server.start(), Err(ServerError::AlreadyStarted));
        assert_eq!(
            server.register_service_as(Counting { calls }, "Late"),
            Err(ServerError::AlreadyStarted)
        );
        assert_eq!(server.service_names(), vec!["Echo", "Echo2"]);
    }

    #[test]
    fn test_unknown_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry: Registry = HashMap::new();
        registry.insert("Echo".to_string(), Arc::new(Counting { calls: calls.clone() }));
        let (dispatcher, mut queue) = dispatcher(Some(registry));

        dispatcher.handle_request(identity(), request("Ghost", "Say"));

        let queued = queue.try_recv().unwrap();
        assert_eq!(queued.reply.status, Status::ServiceNotFound);
        assert_eq!(queued.reply.request_id, RequestId::new(5));
        assert_eq!(queued.identity.peer(), &Bytes::from_static(b"client"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_before_start_nothing_is_routed() {
        let (dispatcher, mut queue) = dispatcher(None);
        dispatcher.handle_request(identity(), request("Echo", "Say"));
        assert_eq!(queue.try_recv().unwrap().reply.status, Status::ServiceNotFound);
    }

    #[test]
    fn test_dispatch_to_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry: Registry = HashMap::new();
        registry.insert("Echo".to_string(), Arc::new(Counting { calls: calls.clone() }));
        let (dispatcher, mut queue) = dispatcher(Some(registry));

        dispatcher.handle_request(identity(), request("Echo", "Say"));
        dispatcher.handle_request(identity(), request("Echo", "Missing"));

        let first = queue.try_recv().unwrap();
        assert_eq!(first.reply.status, Status::Ok);
        assert_eq!(first.reply.payload, Bytes::from_static(b"hi"));
        assert_eq!(queue.try_recv().unwrap().reply.status, Status::MethodNotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.metrics.requests_dispatched(), 2);
    }
}
