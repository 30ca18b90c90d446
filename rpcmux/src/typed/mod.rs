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


//! Typed services.
//!
//! A [`ServiceDescriptor`] lists the methods of a service type `S`: a name,
//! an index (its registration order) and a handler taking `&S`, the decoded
//! request and a [`Reply`] for the response. [`TypedService`] pairs a
//! descriptor with a service instance and a serializer and turns it into an
//! [`RpcService`] the server can dispatch to.
//!
//! Descriptors are usually generated by `#[rpcmux::service]`, but can be
//! written by hand:
//!
//! ```rust
//! use rpcmux::{ServiceDescriptor, TypedService};
//! use rpcmux::serialization::PostcardSerializer;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! let descriptor = ServiceDescriptor::<Echo>::builder("Echo")
//!     .method::<String, String, _>("Say", |_echo, text, reply| {
//!         let _ = reply.send(text);
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(descriptor.methods()[0].name(), "Say");
//! let service = TypedService::new(Arc::new(Echo), descriptor, PostcardSerializer::default());
//! # let _ = service;
//! ```

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::envelope::{MethodSelector, RequestId};
use crate::error::{ChannelMisuseError, ServerError};
use crate::serialization::{PostcardSerializer, SerializationError, Serializer};
use crate::server::{NamedService, RpcService, ServerChannel};
use crate::worker::WorkerPool;
use crate::Status;

type Invoker<S, Z> = Box<dyn Fn(&S, &Arc<Z>, Bytes, ServerChannel) + Send + Sync>;
type Encoder<T> = Arc<dyn Fn(&T) -> Result<Vec<u8>, SerializationError> + Send + Sync>;

/// One method of a typed service.
pub struct MethodDescriptor<S, Z = PostcardSerializer> {
    name: String,
    index: u32,
    invoke: Invoker<S, Z>,
}

impl<S, Z> MethodDescriptor<S, Z> {
    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method index, its position in registration order.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<S, Z> fmt::Debug for MethodDescriptor<S, Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// The method table of a service type.
pub struct ServiceDescriptor<S, Z = PostcardSerializer> {
    name: String,
    methods: Vec<MethodDescriptor<S, Z>>,
    by_name: HashMap<String, usize>,
}

impl<S, Z> ServiceDescriptor<S, Z>
where
    S: Send + Sync + 'static,
    Z: Serializer,
{
    /// Starts a descriptor for the service called `name`.
    pub fn builder(name: impl Into<String>) -> ServiceDescriptorBuilder<S, Z> {
        ServiceDescriptorBuilder {
            name: name.into(),
            methods: Vec::new(),
            error: None,
        }
    }
}

impl<S, Z> ServiceDescriptor<S, Z> {
    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Methods in index order.
    pub fn methods(&self) -> &[MethodDescriptor<S, Z>] {
        &self.methods
    }

    /// Resolves a selector to a method.
    pub fn find(&self, selector: &MethodSelector) -> Option<&MethodDescriptor<S, Z>> {
        let position = match selector {
            MethodSelector::Name(name) => *self.by_name.get(name)?,
            MethodSelector::Index(index) => usize::try_from(*index).ok()?,
        };
        self.methods.get(position)
    }
}

impl<S, Z> fmt::Debug for ServiceDescriptor<S, Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Builder returned by [`ServiceDescriptor::builder`].
pub struct ServiceDescriptorBuilder<S, Z = PostcardSerializer> {
    name: String,
    methods: Vec<MethodDescriptor<S, Z>>,
    error: Option<ServerError>,
}

impl<S, Z> ServiceDescriptorBuilder<S, Z>
where
    S: Send + Sync + 'static,
    Z: Serializer,
{
    /// Adds a method. Its index is the number of methods added before it.
    ///
    /// The handler receives the service, the decoded request and the reply
    /// obligation. It may answer right away or move the [`Reply`] elsewhere
    /// and answer later.
    pub fn method<Req, Resp, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        Req: DeserializeOwned + 'static,
        Resp: Serialize + 'static,
        F: Fn(&S, Req, Reply<Resp>) + Send + Sync + 'static,
    {
        let name = name.into();
        if self.error.is_some() {
            return self;
        }
        if name.is_empty() {
            self.error = Some(ServerError::InvalidName {
                name,
                reason: "method names must not be empty",
            });
            return self;
        }
        if self.methods.iter().any(|m| m.name == name) {
            self.error = Some(ServerError::DuplicateName { name });
            return self;
        }
        let Ok(index) = u32::try_from(self.methods.len()) else {
            self.error = Some(ServerError::InvalidName {
                name,
                reason: "too many methods",
            });
            return self;
        };

        let invoke: Invoker<S, Z> = Box::new(
            move |service: &S, serializer: &Arc<Z>, payload: Bytes, channel: ServerChannel| {
                let request = match serializer.deserialize::<Req>(&payload) {
                    Ok(request) => request,
                    Err(e) => {
                        debug!(request_id = %channel.request_id(), error = %e, "undecodable request");
                        let _ = channel.send_error(Status::BadRequest, e.to_string());
                        return;
                    }
                };
                let serializer = serializer.clone();
                let encode: Encoder<Resp> = Arc::new(move |value: &Resp| serializer.serialize(value));
                handler(service, request, Reply { channel, encode });
            },
        );
        self.methods.push(MethodDescriptor {
            name,
            index,
            invoke,
        });
        self
    }

    /// Finishes the descriptor.
    ///
    /// # Errors
    ///
    /// - [`ServerError::DuplicateName`] if two methods share a name
    /// - [`ServerError::InvalidName`] for an empty service or method name
    pub fn build(self) -> Result<ServiceDescriptor<S, Z>, ServerError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.name.is_empty() {
            return Err(ServerError::InvalidName {
                name: self.name,
                reason: "service names must not be empty",
            });
        }
        let by_name = self
            .methods
            .iter()
            .enumerate()
            .map(|(position, method)| (method.name.clone(), position))
            .collect();
        Ok(ServiceDescriptor {
            name: self.name,
            methods: self.methods,
            by_name,
        })
    }
}

/// The typed reply obligation of one call.
///
/// Consumed by [`send`](Reply::send) or [`fail`](Reply::fail). Dropping it
/// unanswered sends an `ApplicationError` on its behalf.
pub struct Reply<T> {
    channel: ServerChannel,
    encode: Encoder<T>,
}

impl<T> Reply<T> {
    /// Encodes `value` and completes the call with it.
    ///
    /// A value the serializer rejects completes the call with
    /// `ApplicationError` instead.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelMisuseError`] if the underlying channel was already
    /// completed through [`channel`](Self::channel).
    pub fn send(self, value: T) -> Result<(), ChannelMisuseError> {
        match (self.encode)(&value) {
            Ok(bytes) => self.channel.send(bytes),
            Err(e) => self.channel.send_error(
                Status::ApplicationError,
                format!("failed to encode response: {e}"),
            ),
        }
    }

    /// Completes the call with `ApplicationError` and `detail`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn fail(self, detail: impl Into<String>) -> Result<(), ChannelMisuseError> {
        self.channel.send_error(Status::ApplicationError, detail)
    }

    /// The request being answered.
    pub fn request_id(&self) -> RequestId {
        self.channel.request_id()
    }

    /// The untyped channel underneath.
    pub fn channel(&self) -> &ServerChannel {
        &self.channel
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").field("channel", &self.channel).finish()
    }
}

/// A service instance served through its descriptor.
pub struct TypedService<S, Z = PostcardSerializer> {
    service: Arc<S>,
    descriptor: Arc<ServiceDescriptor<S, Z>>,
    serializer: Arc<Z>,
    pool: Option<Arc<dyn WorkerPool>>,
}

impl<S, Z> TypedService<S, Z>
where
    S: Send + Sync + 'static,
    Z: Serializer,
{
    /// Serves `service` with the methods of `descriptor`.
    pub fn new(service: Arc<S>, descriptor: ServiceDescriptor<S, Z>, serializer: Z) -> Self {
        Self {
            service,
            descriptor: Arc::new(descriptor),
            serializer: Arc::new(serializer),
            pool: None,
        }
    }

    /// Decodes requests and runs methods on `pool` instead of the reactor.
    pub fn with_worker_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// The descriptor being served.
    pub fn descriptor(&self) -> &ServiceDescriptor<S, Z> {
        &self.descriptor
    }
}

impl<S, Z> RpcService for TypedService<S, Z>
where
    S: Send + Sync + 'static,
    Z: Serializer,
{
    fn dispatch(&self, method: &MethodSelector, payload: Bytes, channel: ServerChannel) {
        let Some(found) = self.descriptor.find(method) else {
            let _ = channel.send_error(
                Status::MethodNotFound,
                format!("service '{}' has no method {method}", self.descriptor.name),
            );
            return;
        };

        match &self.pool {
            None => (found.invoke)(&self.service, &self.serializer, payload, channel),
            Some(pool) => {
                let position = found.index as usize;
                let service = self.service.clone();
                let descriptor = self.descriptor.clone();
                let serializer = self.serializer.clone();
                pool.submit(Box::new(move || {
                    (descriptor.methods[position].invoke)(&service, &serializer, payload, channel);
                }));
            }
        }
    }
}

impl<S, Z> NamedService for TypedService<S, Z> {
    fn service_name(&self) -> &str {
        &self.descriptor.name
    }
}

impl<S, Z> fmt::Debug for TypedService<S, Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedService")
            .field("descriptor", &self.descriptor)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}
