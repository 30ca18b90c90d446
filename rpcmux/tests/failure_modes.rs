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


//! Integration tests for failure handling.
//!
//! These tests verify that:
//! - Reply obligations are enforced (double completion, dropped channels)
//! - Late replies are discarded and counted
//! - Lost connections cancel their pending calls
//! - Malformed peer input never takes the reactor down
//! - A peer that stops reading never stalls other connections
//! - Replies are routed by the identity captured at receipt
//! - Work can move off the reactor thread

use bytes::Bytes;
use parking_lot::Mutex;
use rpcmux::serialization::PostcardSerializer;
use rpcmux::transport::TransportError;
use rpcmux::{
    ChannelMisuseError, ConnectionManager, ConnectionManagerConfig, MethodSelector, RpcClient,
    RpcError, RpcService, Server, ServerChannel, ServiceDescriptor, Status, TypedService,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const DEADLINE: Option<Duration> = Some(Duration::from_secs(5));

/// Raw service whose behavior is picked by the method name.
#[derive(Default)]
struct Scripted {
    misuse: Mutex<Vec<Result<(), ChannelMisuseError>>>,
    parked: Mutex<Vec<ServerChannel>>,
}

impl RpcService for Scripted {
    fn dispatch(&self, method: &MethodSelector, payload: Bytes, channel: ServerChannel) {
        let MethodSelector::Name(name) = method else {
            let _ = channel.send_error(Status::MethodNotFound, "names only");
            return;
        };
        match name.as_str() {
            "Twice" => {
                let _ = channel.send(Bytes::from_static(b"first"));
                let second = channel.send(Bytes::from_static(b"second"));
                self.misuse.lock().push(second);
            }
            "Drop" => drop(channel),
            "Who" => {
                let peer = channel.identity().peer().clone();
                let _ = channel.send(peer);
            }
            "Later" => {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(100));
                    let _ = channel.send(payload);
                });
            }
            "Park" => self.parked.lock().push(channel),
            _ => {
                let _ = channel.send_error(Status::MethodNotFound, format!("no method {name}"));
            }
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn serve(manager: &ConnectionManager, endpoint: &str) -> (Arc<Scripted>, String) {
    let scripted = Arc::new(Scripted::default());
    let mut server = Server::new(manager);
    server.register_service_as(scripted.clone(), "Scripted").unwrap();
    let listener = server.bind(endpoint).unwrap();
    server.start().unwrap();
    (scripted, listener.endpoint().to_string())
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_double_completion_sends_one_reply() {
    init_tracing();
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (scripted, endpoint) = serve(&manager, "inproc://scripted");
    manager.start().unwrap();
    let connection = manager.connect(&endpoint).unwrap();
    let client = RpcClient::new(&manager);

    let reply = client
        .call(&connection, "Scripted", "Twice", "", DEADLINE)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(&reply[..], b"first");

    let misuse = scripted.misuse.lock().pop().unwrap();
    assert!(matches!(
        misuse,
        Err(ChannelMisuseError::AlreadyCompleted {
            attempted: "send",
            ..
        })
    ));

    // A follow-up call still works and nothing extra arrived.
    let reply = client
        .call(&connection, "Scripted", "Who", "", DEADLINE)
        .unwrap()
        .await
        .unwrap();
    assert!(!reply.is_empty());
    let metrics = manager.metrics();
    assert_eq!(metrics.channel_misuses(), 1);
    assert_eq!(metrics.late_replies(), 0);
    eventually("replies", || metrics.replies_sent() == 2).await;
    manager.shutdown();
}

#[tokio::test]
async fn test_dropped_channel_replies_with_error() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (_scripted, endpoint) = serve(&manager, "tcp://127.0.0.1:0");
    manager.start().unwrap();
    let connection = manager.connect(&endpoint).unwrap();

    let err = RpcClient::new(&manager)
        .call(&connection, "Scripted", "Drop", "", DEADLINE)
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err.status, Status::ApplicationError);
    assert_eq!(err.detail, "request dropped without a reply");
    manager.shutdown();
}

#[tokio::test]
async fn test_late_reply_is_discarded() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (_scripted, endpoint) = serve(&manager, "inproc://late");
    manager.start().unwrap();
    let connection = manager.connect(&endpoint).unwrap();
    let client = RpcClient::new(&manager);

    let err = client
        .call(&connection, "Scripted", "Later", "x", Some(Duration::from_millis(10)))
        .unwrap()
        .await
        .unwrap_err();
    assert!(err.is_deadline_exceeded());
    assert_eq!(client.pending_count(), 0);

    let metrics = manager.metrics();
    eventually("late reply", || metrics.late_replies() == 1).await;
    assert_eq!(metrics.calls_timed_out(), 1);
    assert_eq!(metrics.calls_completed(), 0);
    manager.shutdown();
}

#[tokio::test]
async fn test_cancelled_call_ignores_reply() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (_scripted, endpoint) = serve(&manager, "inproc://cancel");
    manager.start().unwrap();
    let connection = manager.connect(&endpoint).unwrap();
    let client = RpcClient::new(&manager);

    let metrics = manager.metrics();
    let call = client
        .call(&connection, "Scripted", "Later", "x", None)
        .unwrap();
    eventually("dispatch", || metrics.requests_dispatched() == 1).await;
    assert!(call.cancel());
    assert_eq!(call.await.unwrap_err().status, Status::Cancelled);

    eventually("late reply", || metrics.late_replies() == 1).await;
    assert_eq!(metrics.calls_cancelled(), 1);
    manager.shutdown();
}

#[tokio::test]
async fn test_connection_loss_cancels_pending_calls() {
    init_tracing();
    let server_manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (scripted, endpoint) = serve(&server_manager, "tcp://127.0.0.1:0");
    server_manager.start().unwrap();

    let client_manager = ConnectionManager::new(ConnectionManagerConfig::default());
    client_manager.start().unwrap();
    let connection = client_manager.connect(&endpoint).unwrap();
    let client = RpcClient::new(&client_manager);

    let first = client.call(&connection, "Scripted", "Park", "", None).unwrap();
    let second = client.call(&connection, "Scripted", "Park", "", None).unwrap();
    eventually("requests to arrive", || scripted.parked.lock().len() == 2).await;

    server_manager.shutdown();

    for call in [first, second] {
        let err = call.await.unwrap_err();
        assert_eq!(err.status, Status::Cancelled);
        assert_eq!(err.detail, "connection lost");
    }
    assert_eq!(client.pending_count(), 0);
    client_manager.shutdown();
}

#[tokio::test]
async fn test_closing_a_connection_cancels_its_calls() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (_scripted, endpoint) = serve(&manager, "inproc://close");
    manager.start().unwrap();
    let connection = manager.connect(&endpoint).unwrap();
    let client = RpcClient::new(&manager);

    let call = client.call(&connection, "Scripted", "Park", "", None).unwrap();
    manager.close(&connection).unwrap();
    assert_eq!(call.await.unwrap_err().status, Status::Cancelled);

    assert!(matches!(
        client.call(&connection, "Scripted", "Who", "", None),
        Err(RpcError::Transport(TransportError::UnknownConnection { .. }))
    ));
    assert_eq!(client.pending_count(), 0);
    manager.shutdown();
}

#[tokio::test]
async fn test_stalled_peer_does_not_block_reactor() {
    init_tracing();
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (_scripted, endpoint) = serve(&manager, "inproc://unrelated");
    manager.start().unwrap();
    let client = RpcClient::new(&manager);

    // A peer that accepts and never reads a byte.
    let sink = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let stalled = manager
        .connect(&format!("tcp://{}", sink.local_addr().unwrap()))
        .unwrap();
    let (_held, _) = sink.accept().unwrap();

    let blocked: Vec<_> = (0..4)
        .map(|_| {
            client
                .call(&stalled, "Scripted", "Who", vec![0u8; 8 << 20], None)
                .unwrap()
        })
        .collect();

    let connection = manager.connect(&endpoint).unwrap();
    let started = std::time::Instant::now();
    let err = tokio::time::timeout(
        Duration::from_secs(2),
        client
            .call(&connection, "Scripted", "Park", "", Some(Duration::from_millis(20)))
            .unwrap(),
    )
    .await
    .expect("deadline must fire while another peer is stalled")
    .unwrap_err();
    assert!(err.is_deadline_exceeded());
    assert!(started.elapsed() < Duration::from_secs(1));

    let reply = client
        .call(&connection, "Scripted", "Who", "", DEADLINE)
        .unwrap()
        .await
        .unwrap();
    assert!(!reply.is_empty());

    manager.shutdown();
    for call in blocked {
        assert_eq!(call.await.unwrap_err().status, Status::Cancelled);
    }
}

#[tokio::test]
async fn test_small_read_queue_still_serves_bursts() {
    let manager = ConnectionManager::new(
        ConnectionManagerConfig::default().with_read_queue_capacity(1),
    );
    let (_scripted, endpoint) = serve(&manager, "tcp://127.0.0.1:0");
    manager.start().unwrap();
    let connection = manager.connect(&endpoint).unwrap();
    let client = RpcClient::new(&manager);

    let calls: Vec<_> = (0..64)
        .map(|_| client.call(&connection, "Scripted", "Who", "", DEADLINE).unwrap())
        .collect();
    for call in calls {
        assert!(!call.await.unwrap().is_empty());
    }
    assert_eq!(manager.metrics().requests_received(), 64);
    manager.shutdown();
}

#[tokio::test]
async fn test_huge_deadlines_are_unbounded() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (scripted, endpoint) = serve(&manager, "inproc://forever");
    manager.start().unwrap();
    let connection = manager.connect(&endpoint).unwrap();
    let client = RpcClient::new(&manager);

    let call = client
        .call(&connection, "Scripted", "Park", "", Some(Duration::MAX))
        .unwrap();
    eventually("request to park", || scripted.parked.lock().len() == 1).await;

    let channel = scripted.parked.lock().pop().unwrap();
    channel.send(Bytes::from_static(b"eventually")).unwrap();
    assert_eq!(&call.await.unwrap()[..], b"eventually");
    assert_eq!(manager.metrics().calls_timed_out(), 0);
    manager.shutdown();
}

#[tokio::test]
async fn test_malformed_input_keeps_reactor_alive() {
    init_tracing();
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (_scripted, endpoint) = serve(&manager, "tcp://127.0.0.1:0");
    manager.start().unwrap();
    let address = endpoint.trim_start_matches("tcp://").to_string();
    let metrics = manager.metrics();

    // One frame where a request needs five.
    let mut raw = std::net::TcpStream::connect(&address).unwrap();
    raw.write_all(&[0, 1, 0, 0, 0, 1, 0xAA]).unwrap();
    eventually("malformed message", || metrics.malformed_messages() == 1).await;

    // More frames than allowed closes the connection.
    let mut raw = std::net::TcpStream::connect(&address).unwrap();
    raw.write_all(&[0xFF, 0xFF]).unwrap();
    eventually("connection close", || metrics.connections_closed() >= 1).await;

    let connection = manager.connect(&endpoint).unwrap();
    let reply = RpcClient::new(&manager)
        .call(&connection, "Scripted", "Who", "", DEADLINE)
        .unwrap()
        .await
        .unwrap();
    assert!(!reply.is_empty());
    manager.shutdown();
}

#[tokio::test]
async fn test_replies_follow_routing_identity() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let (_scripted, endpoint) = serve(&manager, "tcp://127.0.0.1:0");
    manager.start().unwrap();
    let alice = manager.connect_with_identity(&endpoint, "alice").unwrap();
    let bob = manager.connect_with_identity(&endpoint, "bob").unwrap();
    let client = RpcClient::new(&manager);

    let to_alice = client.call(&alice, "Scripted", "Who", "", DEADLINE).unwrap();
    let to_bob = client.call(&bob, "Scripted", "Who", "", DEADLINE).unwrap();
    assert_eq!(to_alice.request_id(), to_bob.request_id());

    let (bob_reply, alice_reply) = tokio::join!(to_bob, to_alice);
    assert_eq!(&alice_reply.unwrap()[..], b"alice");
    assert_eq!(&bob_reply.unwrap()[..], b"bob");
    manager.shutdown();
}

#[tokio::test]
async fn test_requests_before_server_start() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let mut server = Server::new(&manager);
    server.register_service_as(Scripted::default(), "Scripted").unwrap();
    server.bind("inproc://early").unwrap();
    manager.start().unwrap();
    let connection = manager.connect("inproc://early").unwrap();
    let client = RpcClient::new(&manager);

    let err = client
        .call(&connection, "Scripted", "Who", "", DEADLINE)
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err.status, Status::ServiceNotFound);

    server.start().unwrap();
    let reply = client
        .call(&connection, "Scripted", "Who", "", DEADLINE)
        .unwrap()
        .await
        .unwrap();
    assert!(!reply.is_empty());
    manager.shutdown();
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    serve(&manager, "inproc://taken");

    let mut other = Server::new(&manager);
    assert!(matches!(
        other.bind("inproc://taken"),
        Err(TransportError::AddressInUse { .. })
    ));
    assert!(matches!(
        other.bind("udp://nowhere:1"),
        Err(TransportError::InvalidEndpoint { .. })
    ));
    assert!(matches!(
        manager.connect("inproc://nobody"),
        Err(TransportError::ConnectionFailed { .. })
    ));
    other.start().unwrap();

    manager.start().unwrap();
    assert!(manager.is_running());
    assert!(matches!(manager.start(), Err(TransportError::AlreadyStarted)));

    manager.shutdown();
    assert!(!manager.is_running());
    assert!(matches!(manager.start(), Err(TransportError::Closed)));
    assert!(matches!(
        manager.connect("inproc://taken"),
        Err(TransportError::Closed)
    ));
    manager.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_pool_moves_work_off_reactor() {
    struct Threads;

    let descriptor = ServiceDescriptor::<Threads>::builder("Threads")
        .method::<(), String, _>("Current", |_, (), reply| {
            let name = std::thread::current()
                .name()
                .unwrap_or_default()
                .to_string();
            let _ = reply.send(name);
        })
        .build()
        .unwrap();

    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let mut server = Server::new(&manager);
    server
        .register_service(
            TypedService::new(Arc::new(Threads), descriptor, PostcardSerializer::default())
                .with_worker_pool(Arc::new(tokio::runtime::Handle::current())),
        )
        .unwrap();
    server.bind("inproc://threads").unwrap();
    server.start().unwrap();
    manager.start().unwrap();

    let connection = manager.connect("inproc://threads").unwrap();
    let name: String = RpcClient::new(&manager)
        .invoke(
            &connection,
            "Threads",
            "Current",
            &(),
            &PostcardSerializer::default(),
            DEADLINE,
        )
        .await
        .unwrap();
    assert_ne!(name, manager.config().reactor_thread_name);
    manager.shutdown();
}
