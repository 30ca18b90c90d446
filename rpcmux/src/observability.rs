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


//! Observability support.
//!
//! - [`ReactorMetrics`]: atomic counters for connections, requests, replies
//!   and client calls, optionally mirrored to the `metrics` crate.
//! - [`log_error`]: logs an [`RpcError`] through `tracing` at a level that
//!   matches its layer.
//!
//! The library only emits `tracing` events. Installing a subscriber is up to
//! the application:
//!
//! ```rust,no_run
//! tracing_subscriber::fmt()
//!     .with_env_filter("rpcmux=debug")
//!     .init();
//! ```

mod metrics;

pub use self::metrics::{MetricsSnapshot, ReactorMetrics};

use crate::RpcError;

/// Logs an error with structured context.
///
/// Transport errors that leave the connection usable and call outcomes the
/// caller is expected to handle are logged quietly; misuse and registration
/// errors are logged at `ERROR`.
pub fn log_error(error: &RpcError) {
    match error {
        RpcError::Transport(e) => {
            if e.is_recoverable() {
                tracing::warn!(
                    error = %e,
                    should_close_connection = e.should_close_connection(),
                    "transport error"
                );
            } else {
                tracing::error!(
                    error = %e,
                    should_close_connection = e.should_close_connection(),
                    "transport error"
                );
            }
        }
        RpcError::Codec(e) => tracing::warn!(error = %e, "malformed envelope"),
        RpcError::Serialization(e) => tracing::warn!(error = %e, "payload encoding failed"),
        RpcError::Deserialization(e) => tracing::warn!(error = %e, "payload decoding failed"),
        RpcError::Server(e) => tracing::error!(error = %e, "service registration failed"),
        RpcError::Misuse(e) => tracing::error!(error = %e, "server channel misuse"),
        RpcError::Call(e) => {
            if e.status.is_local() {
                tracing::debug!(status = %e.status, detail = %e.detail, "call ended locally");
            } else {
                tracing::info!(status = %e.status, detail = %e.detail, "call failed");
            }
        }
        RpcError::RequestIdInUse {
            connection,
            request_id,
        } => tracing::warn!(%connection, %request_id, "request id still in use"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use crate::{CallError, ServerError, Status};

    #[test]
    fn test_log_each_layer() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        log_error(&TransportError::Closed.into());
        log_error(&ServerError::AlreadyStarted.into());
        log_error(&CallError::new(Status::DeadlineExceeded, "deadline exceeded").into());
        log_error(&CallError::new(Status::ApplicationError, "boom").into());
    }
}
