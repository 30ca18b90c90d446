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


//! Configuration of a [`ConnectionManager`](crate::ConnectionManager).

use std::time::Duration;

use crate::serialization::framing::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_FRAMES, FrameLimits};
use crate::transport::{DEFAULT_INPROC_BUFFER, TransportError};

const DEFAULT_READ_QUEUE_CAPACITY: usize = 1024;

/// Minimum frame count a message must be allowed to carry (a request envelope).
const MIN_FRAMES: usize = 5;

/// What a [`ServerChannel`](crate::ServerChannel) does when it is completed
/// twice or completed with `Status::Ok` as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MisusePolicy {
    /// Log at `error!` and return `Err(ChannelMisuseError)` to the caller.
    #[default]
    Report,
    /// Panic on the offending thread.
    Abort,
}

/// Configuration for a connection manager.
///
/// # Examples
///
/// ```rust
/// use rpcmux::{ConnectionManagerConfig, MisusePolicy};
/// use std::time::Duration;
///
/// let config = ConnectionManagerConfig::default()
///     .with_default_deadline(Some(Duration::from_secs(2)))
///     .with_misuse_policy(MisusePolicy::Abort);
///
/// assert_eq!(config.max_frames, 8);
/// assert_eq!(config.reactor_thread_name, "rpcmux-reactor");
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Largest frame accepted or sent. Connections that exceed it are closed.
    ///
    /// Default: 16 MiB
    pub max_frame_size: usize,

    /// Largest number of frames in one message. Must be at least 5.
    ///
    /// Default: 8
    pub max_frames: usize,

    /// Timeout for establishing outbound TCP connections.
    ///
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Deadline applied to client calls that do not specify one.
    /// `None` means calls wait until a reply arrives or they are cancelled.
    ///
    /// Default: `None`
    pub default_deadline: Option<Duration>,

    /// Behavior of server channels on double completion.
    ///
    /// Default: [`MisusePolicy::Report`]
    pub misuse_policy: MisusePolicy,

    /// Name of the reactor thread.
    ///
    /// Default: `"rpcmux-reactor"`
    pub reactor_thread_name: String,

    /// Whether `TCP_NODELAY` is set on TCP connections.
    ///
    /// Default: `true`
    pub tcp_nodelay: bool,

    /// Per-direction buffer of in-process connections, in bytes.
    ///
    /// Default: 64 KiB
    pub inproc_buffer_size: usize,

    /// Messages read from sockets but not yet processed by the reactor.
    /// When the queue is full, connection readers stop reading until the
    /// reactor catches up.
    ///
    /// Default: 1024
    pub read_queue_capacity: usize,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_frames: DEFAULT_MAX_FRAMES,
            connect_timeout: Duration::from_secs(5),
            default_deadline: None,
            misuse_policy: MisusePolicy::Report,
            reactor_thread_name: "rpcmux-reactor".to_string(),
            tcp_nodelay: true,
            inproc_buffer_size: DEFAULT_INPROC_BUFFER,
            read_queue_capacity: DEFAULT_READ_QUEUE_CAPACITY,
        }
    }
}

impl ConnectionManagerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Sets the maximum number of frames per message.
    pub fn with_max_frames(mut self, frames: usize) -> Self {
        self.max_frames = frames;
        self
    }

    /// Sets the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the deadline used by calls that do not pass one.
    pub fn with_default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }

    /// Sets the server channel misuse policy.
    pub fn with_misuse_policy(mut self, policy: MisusePolicy) -> Self {
        self.misuse_policy = policy;
        self
    }

    /// Sets the reactor thread name.
    pub fn with_reactor_thread_name(mut self, name: impl Into<String>) -> Self {
        self.reactor_thread_name = name.into();
        self
    }

    /// Enables or disables `TCP_NODELAY`.
    pub fn with_tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Sets the in-process pipe buffer size.
    pub fn with_inproc_buffer_size(mut self, size: usize) -> Self {
        self.inproc_buffer_size = size;
        self
    }

    /// Sets how many read messages may wait for the reactor.
    pub fn with_read_queue_capacity(mut self, capacity: usize) -> Self {
        self.read_queue_capacity = capacity;
        self
    }

    /// Frame limits derived from this configuration.
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_frames: self.max_frames,
            max_frame_size: self.max_frame_size,
        }
    }

    /// Checks that the configuration can carry envelopes at all.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfiguration`] describing the first
    /// problem found.
    pub fn validate(&self) -> Result<(), TransportError> {
        let invalid = |reason: String| Err(TransportError::InvalidConfiguration { reason });
        if self.max_frames < MIN_FRAMES {
            return invalid(format!(
                "max_frames is {}, envelopes need at least {MIN_FRAMES}",
                self.max_frames
            ));
        }
        if self.max_frame_size == 0 {
            return invalid("max_frame_size must be positive".to_string());
        }
        if self.inproc_buffer_size == 0 {
            return invalid("inproc_buffer_size must be positive".to_string());
        }
        if self.read_queue_capacity == 0 {
            return invalid("read_queue_capacity must be positive".to_string());
        }
        if self.connect_timeout.is_zero() {
            return invalid("connect_timeout must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionManagerConfig::default();
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(config.max_frames, 8);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.default_deadline, None);
        assert_eq!(config.misuse_policy, MisusePolicy::Report);
        assert!(config.tcp_nodelay);
        assert_eq!(config.read_queue_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ConnectionManagerConfig::new()
            .with_max_frame_size(1024)
            .with_max_frames(6)
            .with_connect_timeout(Duration::from_millis(250))
            .with_reactor_thread_name("io")
            .with_tcp_nodelay(false);

        assert_eq!(
            config.frame_limits(),
            FrameLimits {
                max_frames: 6,
                max_frame_size: 1024
            }
        );
        assert_eq!(config.reactor_thread_name, "io");
        assert!(!config.tcp_nodelay);
    }

    #[test]
    fn test_validate_rejects_too_few_frames() {
        let config = ConnectionManagerConfig::new().with_max_frames(4);
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_read_queue() {
        let config = ConnectionManagerConfig::new().with_read_queue_capacity(0);
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfiguration { .. })
        ));
    }
}
