//! Tests for the `#[rpcmux::service]` macro.
//!
//! These tests verify the generated descriptor and client stub, both on their
//! own and end to end over an in-process connection.

use rpcmux::serialization::PostcardSerializer;
use rpcmux::{
    ConnectionManager, ConnectionManagerConfig, Reply, RpcClient, Server, Status, TypedService,
    service,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sum {
    pub a: i64,
    pub b: i64,
}

#[service(name = "test.Calculator")]
pub trait Calculator {
    fn add(&self, request: Sum, reply: Reply<i64>);
    fn divide_by_zero(&self, request: i64, reply: Reply<i64>);
    #[rpc(name = "Ping")]
    fn health_check(&self, request: (), reply: Reply<String>);
}

struct Calc;

impl Calculator for Calc {
    fn add(&self, request: Sum, reply: Reply<i64>) {
        let _ = reply.send(request.a + request.b);
    }

    fn divide_by_zero(&self, _request: i64, reply: Reply<i64>) {
        let _ = reply.fail("division by zero");
    }

    fn health_check(&self, _request: (), reply: Reply<String>) {
        // Answer from another thread.
        std::thread::spawn(move || {
            let _ = reply.send("pong".to_string());
        });
    }
}

#[test]
fn test_descriptor_generated() {
    let descriptor = calculator_descriptor::<Calc, PostcardSerializer>().unwrap();
    assert_eq!(descriptor.name(), "test.Calculator");

    let names: Vec<(&str, u32)> = descriptor
        .methods()
        .iter()
        .map(|m| (m.name(), m.index()))
        .collect();
    assert_eq!(names, vec![("Add", 0), ("DivideByZero", 1), ("Ping", 2)]);
}

#[test]
fn test_client_service_name() {
    assert_eq!(
        CalculatorClient::<PostcardSerializer>::SERVICE_NAME,
        "test.Calculator"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_round_trip() {
    let manager = ConnectionManager::new(ConnectionManagerConfig::default());
    let mut server = Server::new(&manager);
    let descriptor = calculator_descriptor::<Calc, PostcardSerializer>().unwrap();
    server
        .register_service(TypedService::new(
            Arc::new(Calc),
            descriptor,
            PostcardSerializer::default(),
        ))
        .unwrap();
    server.bind("inproc://macro-calculator").unwrap();
    server.start().unwrap();
    manager.start().unwrap();

    let connection = manager.connect("inproc://macro-calculator").unwrap();
    let calculator = CalculatorClient::new(
        RpcClient::new(&manager),
        connection,
        PostcardSerializer::default(),
    )
    .with_deadline(std::time::Duration::from_secs(5));

    assert_eq!(calculator.add(&Sum { a: 2, b: 40 }).await.unwrap(), 42);
    assert_eq!(calculator.health_check(&()).await.unwrap(), "pong");

    let err = calculator.divide_by_zero(&1).await.unwrap_err();
    assert_eq!(err.status(), Some(Status::ApplicationError));
    assert!(err.to_string().contains("division by zero"));

    manager.shutdown();
}
