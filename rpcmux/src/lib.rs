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


#![doc = include_str!("../../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! ## Layers
//!
//! - **[`transport`]**: endpoints and byte streams (TCP, in-process)
//! - **[`serialization`]**: payload serializers and multipart framing
//! - **[`envelope`]**: request and reply envelopes on top of the framing
//! - **[`reactor`]**: the [`ConnectionManager`] and its single I/O thread
//! - **[`server`]**: the service registry and one-shot [`ServerChannel`]s
//! - **[`typed`]**: descriptor-driven typed services
//! - **[`client`]**: request correlation, deadlines and cancellation
//! - **[`observability`]**: counters and error logging

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod observability;
pub mod reactor;
pub mod serialization;
pub mod server;
pub mod transport;
pub mod typed;
pub mod worker;

mod status;

#[cfg(feature = "derive")]
pub use rpcmux_macros::service;

pub use client::{CancelHandle, PendingCall, RpcClient};
pub use config::{ConnectionManagerConfig, MisusePolicy};
pub use envelope::{MethodSelector, RequestId, RoutingIdentity};
pub use error::{CallError, ChannelMisuseError, RpcError, ServerError};
pub use observability::{MetricsSnapshot, ReactorMetrics, log_error};
pub use reactor::{Connection, ConnectionManager, ListenerHandle, ReplySender, RequestHandler};
pub use server::{NamedService, RpcService, Server, ServerChannel};
pub use status::Status;
pub use typed::{MethodDescriptor, Reply, ServiceDescriptor, ServiceDescriptorBuilder, TypedService};
pub use worker::WorkerPool;
