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

//! Endpoint addresses.
//!
//! Two schemes are understood:
//!
//! - `tcp://host:port`: a TCP socket. Port `0` asks the OS for an ephemeral
//!   port when binding.
//! - `inproc://name`: an in-process pipe, visible only to the connection
//!   manager the name was bound on.

use std::fmt;
use std::str::FromStr;

use crate::transport::{TransportError, TransportKind};

/// A parsed endpoint.
///
/// # Examples
///
/// ```rust
/// use rpcmux::transport::Endpoint;
///
/// let tcp: Endpoint = "tcp://127.0.0.1:0".parse().unwrap();
/// assert_eq!(tcp.to_string(), "tcp://127.0.0.1:0");
///
/// let local = Endpoint::parse("inproc://search").unwrap();
/// assert_eq!(local, Endpoint::Inproc { name: "search".to_string() });
///
/// assert!(Endpoint::parse("udp://host:1").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `tcp://host:port`
    Tcp {
        /// `host:port`, as accepted by `std::net::ToSocketAddrs`
        address: String,
    },
    /// `inproc://name`
    Inproc {
        /// Name registered with the connection manager
        name: String,
    },
}

impl Endpoint {
    /// Parses an endpoint string.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEndpoint`] when the scheme is missing
    /// or unknown, the TCP address lacks a host or a numeric port, or the
    /// in-process name is empty.
    pub fn parse(endpoint: &str) -> Result<Self, TransportError> {
        let Some((scheme, rest)) = endpoint.split_once("://") else {
            return Err(TransportError::invalid_endpoint(
                endpoint,
                "missing scheme, expected tcp:// or inproc://",
            ));
        };

        match scheme {
            "tcp" => {
                let Some((host, port)) = rest.rsplit_once(':') else {
                    return Err(TransportError::invalid_endpoint(endpoint, "missing port"));
                };
                if host.is_empty() {
                    return Err(TransportError::invalid_endpoint(endpoint, "missing host"));
                }
                if port.parse::<u16>().is_err() {
                    return Err(TransportError::invalid_endpoint(
                        endpoint,
                        format!("invalid port '{port}'"),
                    ));
                }
                Ok(Endpoint::Tcp {
                    address: rest.to_string(),
                })
            }
            "inproc" => {
                if rest.is_empty() {
                    return Err(TransportError::invalid_endpoint(endpoint, "empty name"));
                }
                Ok(Endpoint::Inproc {
                    name: rest.to_string(),
                })
            }
            other => Err(TransportError::invalid_endpoint(
                endpoint,
                format!("unsupported scheme '{other}'"),
            )),
        }
    }

    /// The stream kind this endpoint produces.
    pub fn kind(&self) -> TransportKind {
        match self {
            Endpoint::Tcp { .. } => TransportKind::Tcp,
            Endpoint::Inproc { .. } => TransportKind::Inproc,
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { address } => write!(f, "tcp://{address}"),
            Endpoint::Inproc { name } => write!(f, "inproc://{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let endpoint = Endpoint::parse("tcp://localhost:5555").unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Tcp {
                address: "localhost:5555".to_string()
            }
        );
        assert_eq!(endpoint.kind(), TransportKind::Tcp);
    }

    #[test]
    fn test_parse_tcp_ipv6() {
        let endpoint = Endpoint::parse("tcp://[::1]:0").unwrap();
        assert_eq!(endpoint.to_string(), "tcp://[::1]:0");
    }

    #[test]
    fn test_parse_inproc() {
        let endpoint: Endpoint = "inproc://a.b".parse().unwrap();
        assert_eq!(endpoint.kind(), TransportKind::Inproc);
        assert_eq!(endpoint.to_string(), "inproc://a.b");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "127.0.0.1:80",
            "tcp://127.0.0.1",
            "tcp://:80",
            "tcp://host:http",
            "tcp://host:70000",
            "inproc://",
            "ipc:///tmp/sock",
        ] {
            let err = Endpoint::parse(bad).unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidEndpoint { .. }),
                "{bad} -> {err}"
            );
        }
    }
}
