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


//! # Echo Example
//!
//! Serves a typed `Echo` service on a TCP port and calls it through the
//! generated client stub, all within one process and one connection manager.
//!
//! Run with:
//! ```bash
//! cargo run --example echo
//! ```

use rpcmux::serialization::PostcardSerializer;
use rpcmux::{ConnectionManager, ConnectionManagerConfig, Reply, RpcClient, Server, TypedService, service};
use std::sync::Arc;
use std::time::Duration;

#[service(name = "Echo")]
pub trait Echo {
    fn say(&self, text: String, reply: Reply<String>);
    fn shout(&self, text: String, reply: Reply<String>);
}

struct EchoImpl;

impl Echo for EchoImpl {
    fn say(&self, text: String, reply: Reply<String>) {
        let _ = reply.send(text);
    }

    fn shout(&self, text: String, reply: Reply<String>) {
        // Answer from a worker thread; the reactor is not blocked.
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = reply.send(text.to_uppercase());
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let manager = ConnectionManager::new(ConnectionManagerConfig::default());

    let mut server = Server::new(&manager);
    server.register_service(TypedService::new(
        Arc::new(EchoImpl),
        echo_descriptor::<EchoImpl, PostcardSerializer>()?,
        PostcardSerializer::default(),
    ))?;
    let listener = server.bind("tcp://127.0.0.1:0")?;
    server.start()?;
    manager.start()?;
    println!("Serving Echo on {}", listener.endpoint());

    let connection = manager.connect(&listener.endpoint().to_string())?;
    let echo = EchoClient::new(RpcClient::new(&manager), connection, PostcardSerializer::default())
        .with_deadline(Duration::from_secs(1));

    let say_arg = "hello".to_string();
    let shout_arg = "hello".to_string();
    let (said, shouted) = tokio::join!(echo.say(&say_arg), echo.shout(&shout_arg));
    println!("Say   -> {}", said?);
    println!("Shout -> {}", shouted?);

    let metrics = manager.metrics().snapshot();
    println!("{metrics:?}");

    manager.shutdown();
    Ok(())
}
