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


//! Serialization trait definitions.

use crate::serialization::{DeserializationError, SerializationError};

/// Encodes and decodes request and response values.
///
/// A serializer is chosen per typed service and per client call; both sides
/// of a call must agree on it. The envelope itself never goes through a
/// serializer, only the payload frame does.
///
/// # Examples
///
/// ```rust
/// use rpcmux::serialization::{PostcardSerializer, Serializer};
///
/// let serializer = PostcardSerializer::default();
/// let bytes = serializer.serialize(&("hi".to_string(), 7u32)).unwrap();
/// let (text, n): (String, u32) = serializer.deserialize(&bytes).unwrap();
/// assert_eq!((text.as_str(), n), ("hi", 7));
/// ```
pub trait Serializer: Send + Sync + 'static {
    /// Encodes a value.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if the value cannot be represented.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rpcmux::serialization::{PostcardSerializer, Serializer};
    /// use serde::Serialize;
    ///
    /// #[derive(Serialize)]
    /// struct Lookup<'a> {
    ///     key: &'a str,
    ///     limit: u32,
    /// }
    ///
    /// let bytes = PostcardSerializer::default()
    ///     .serialize(&Lookup { key: "user:42", limit: 10 })
    ///     .unwrap();
    /// assert!(!bytes.is_empty());
    /// ```
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializationError>
    where
        T: serde::Serialize + ?Sized;

    /// Decodes a value.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializationError`] if the bytes are not a valid encoding
    /// of `T`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rpcmux::serialization::{PostcardSerializer, Serializer};
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Debug, PartialEq, Serialize, Deserialize)]
    /// enum Reading {
    ///     Celsius(f32),
    ///     Missing,
    /// }
    ///
    /// let serializer = PostcardSerializer::default();
    /// let bytes = serializer.serialize(&vec![Reading::Celsius(21.5), Reading::Missing]).unwrap();
    /// let readings: Vec<Reading> = serializer.deserialize(&bytes).unwrap();
    /// assert_eq!(readings[1], Reading::Missing);
    ///
    /// // Bytes from another format are rejected, not misread.
    /// assert!(serializer.deserialize::<Vec<Reading>>(b"[1, 2]").is_err());
    /// ```
    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, DeserializationError>
    where
        T: serde::de::DeserializeOwned;

    /// Short name used in logs.
    ///
    /// ```rust
    /// use rpcmux::serialization::{PostcardSerializer, Serializer};
    ///
    /// assert_eq!(PostcardSerializer::default().name(), "postcard");
    /// ```
    fn name(&self) -> &'static str;
}
