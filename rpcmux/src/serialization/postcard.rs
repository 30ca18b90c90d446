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


//! Postcard serializer, the default payload format.

use crate::serialization::{DeserializationError, SerializationError, Serializer};

/// Compact binary serializer based on `postcard`.
///
/// Postcard is a varint-based, non-self-describing format: both sides must
/// agree on the exact types. It is the serializer the `#[service]` macro and
/// [`TypedService`](crate::TypedService) use by default.
///
/// An optional size limit rejects oversized payloads before decoding starts.
///
/// # Examples
///
/// Encoding a request the way a typed client does:
///
/// ```rust
/// use rpcmux::serialization::{PostcardSerializer, Serializer};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Transfer {
///     from: u64,
///     to: u64,
///     cents: i64,
/// }
///
/// let serializer = PostcardSerializer::default();
/// let request = Transfer { from: 1, to: 2, cents: 1_250 };
/// let bytes = serializer.serialize(&request).unwrap();
/// assert_eq!(serializer.deserialize::<Transfer>(&bytes).unwrap(), request);
/// ```
///
/// Limiting what a server is willing to decode:
///
/// ```rust
/// use rpcmux::serialization::{PostcardSerializer, Serializer};
///
/// let serializer = PostcardSerializer::new().with_max_size(16);
/// let bytes = serializer.serialize(&"x".repeat(64)).unwrap();
/// assert!(serializer.deserialize::<String>(&bytes).is_err());
/// ```
#[derive(Clone, Debug, Default)]
pub struct PostcardSerializer {
    max_size: Option<usize>,
}

impl PostcardSerializer {
    /// Creates a serializer without a size limit. Same as `default()`.
    pub fn new() -> Self {
        Self { max_size: None }
    }

    /// Rejects payloads larger than `max_size` bytes when decoding.
    ///
    /// Encoding is not limited; frame limits on the connection cap what can
    /// be sent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rpcmux::serialization::{PostcardSerializer, Serializer};
    ///
    /// let serializer = PostcardSerializer::new().with_max_size(1024);
    /// let small = serializer.serialize(&[7u8; 16]).unwrap();
    /// assert!(serializer.deserialize::<[u8; 16]>(&small).is_ok());
    ///
    /// let large = serializer.serialize(&vec![7u8; 4096]).unwrap();
    /// let err = serializer.deserialize::<Vec<u8>>(&large).unwrap_err();
    /// assert!(err.message().contains("exceeds maximum allowed size 1024"));
    /// ```
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }
}

impl Serializer for PostcardSerializer {
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializationError>
    where
        T: serde::Serialize + ?Sized,
    {
        postcard::to_allocvec(value).map_err(Into::into)
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, DeserializationError>
    where
        T: serde::de::DeserializeOwned,
    {
        if let Some(max_size) = self.max_size {
            if bytes.len() > max_size {
                return Err(DeserializationError::new(format!(
                    "payload size {} exceeds maximum allowed size {}",
                    bytes.len(),
                    max_size
                )));
            }
        }

        postcard::from_bytes(bytes).map_err(Into::into)
    }

    fn name(&self) -> &'static str {
        "postcard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct SearchRequest {
        query: String,
        page_number: u32,
    }

    #[test]
    fn test_postcard_preserves_values() {
        let serializer = PostcardSerializer::default();
        let request = SearchRequest {
            query: "rust".to_string(),
            page_number: 3,
        };

        let bytes = serializer.serialize(&request).unwrap();
        let decoded: SearchRequest = serializer.deserialize(&bytes).unwrap();
        assert_eq!(request, decoded);
    }

    #[test]
    fn test_postcard_truncated_input() {
        let serializer = PostcardSerializer::default();
        let bytes = serializer.serialize(&"hello".to_string()).unwrap();
        let result: Result<String, _> = serializer.deserialize(&bytes[..3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_postcard_size_limit() {
        let serializer = PostcardSerializer::new().with_max_size(4);
        let bytes = serializer.serialize(&vec![1u8; 32]).unwrap();
        let err = serializer.deserialize::<Vec<u8>>(&bytes).unwrap_err();
        assert!(err.message().contains("exceeds maximum"));
    }

    #[test]
    fn test_postcard_name() {
        assert_eq!(PostcardSerializer::default().name(), "postcard");
    }
}
