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

//! Reply status codes.
//!
//! Every reply envelope carries exactly one [`Status`]. Protocol failures,
//! application failures and locally generated outcomes (timeouts and
//! cancellation) all travel through the same reply path as a successful
//! response; only the status differs.

use std::fmt;

/// Outcome of a single RPC call.
///
/// The numeric value of each variant is its one-byte wire code and must
/// never change.
///
/// # Examples
///
/// ```rust
/// use rpcmux::Status;
///
/// assert_eq!(Status::from_code(2), Some(Status::MethodNotFound));
/// assert!(Status::Ok.is_ok());
/// assert_eq!(Status::DeadlineExceeded.to_string(), "DeadlineExceeded");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// The call succeeded and the payload holds the encoded response.
    Ok = 0,
    /// No service is registered under the requested name.
    ServiceNotFound = 1,
    /// The service exists but has no method matching the selector.
    MethodNotFound = 2,
    /// The request payload could not be decoded into the method's request type.
    BadRequest = 3,
    /// The handler reported a failure; the payload holds the detail text.
    ApplicationError = 4,
    /// The caller's deadline passed before a reply arrived.
    DeadlineExceeded = 5,
    /// The call was cancelled locally or its connection was lost.
    Cancelled = 6,
}

impl Status {
    /// All statuses in wire-code order.
    pub const ALL: [Status; 7] = [
        Status::Ok,
        Status::ServiceNotFound,
        Status::MethodNotFound,
        Status::BadRequest,
        Status::ApplicationError,
        Status::DeadlineExceeded,
        Status::Cancelled,
    ];

    /// Returns the one-byte wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Parses a wire code, returning `None` for unknown values.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::ServiceNotFound),
            2 => Some(Self::MethodNotFound),
            3 => Some(Self::BadRequest),
            4 => Some(Self::ApplicationError),
            5 => Some(Self::DeadlineExceeded),
            6 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns `true` for [`Status::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns `true` for statuses that are produced on the calling side
    /// without any reply from the server.
    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Cancelled)
    }

    /// Returns the stable name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::ServiceNotFound => "ServiceNotFound",
            Self::MethodNotFound => "MethodNotFound",
            Self::BadRequest => "BadRequest",
            Self::ApplicationError => "ApplicationError",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense_and_stable() {
        for (expected, status) in Status::ALL.iter().enumerate() {
            assert_eq!(status.code() as usize, expected);
            assert_eq!(Status::from_code(status.code()), Some(*status));
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(Status::from_code(7), None);
        assert_eq!(Status::from_code(0xFF), None);
    }

    #[test]
    fn test_local_statuses() {
        assert!(Status::DeadlineExceeded.is_local());
        assert!(Status::Cancelled.is_local());
        assert!(!Status::ApplicationError.is_local());
        assert!(!Status::Ok.is_local());
    }
}
