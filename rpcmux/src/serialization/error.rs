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


//! Serialization error types.
//!
//! Both errors carry a human-readable message and an optional boxed source.
//! The message of a [`DeserializationError`] raised while decoding a request
//! becomes the detail text of the `BadRequest` reply sent back to the caller.

use std::fmt;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Error encoding a value or writing a message.
///
/// Raised when a request or response value cannot be represented by the
/// serializer, or when an encoded message would exceed the frame limits.
///
/// # Examples
///
/// ```rust
/// use rpcmux::serialization::{JsonSerializer, Serializer};
/// use std::collections::HashMap;
///
/// // JSON objects need string keys.
/// let mut scores = HashMap::new();
/// scores.insert((1u8, 2u8), 3u32);
///
/// let err = JsonSerializer::default().serialize(&scores).unwrap_err();
/// assert!(err.to_string().starts_with("serialization error: JSON encoding failed"));
/// ```
#[derive(Debug)]
pub struct SerializationError {
    message: String,
    source: Option<BoxedSource>,
}

impl SerializationError {
    /// Creates an error with a message and no source.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rpcmux::serialization::SerializationError;
    ///
    /// let error = SerializationError::new("frame too large");
    /// assert_eq!(error.message(), "frame too large");
    /// ```
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rpcmux::serialization::SerializationError;
    /// use std::error::Error;
    /// use std::io;
    ///
    /// let cause = io::Error::new(io::ErrorKind::BrokenPipe, "peer went away");
    /// let error = SerializationError::with_source("failed to write message", cause);
    /// assert!(error.source().is_some());
    /// assert!(error.to_string().contains("peer went away"));
    /// ```
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The message without the source chain.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serialization error: {}", self.message)?;
        if let Some(source) = &self.source {
            write!(f, " (caused by: {source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error decoding a value or reading a message.
///
/// Common causes are a peer using a different serializer, a request type
/// that changed shape between client and server, or a truncated payload.
///
/// # Examples
///
/// ```rust
/// use rpcmux::serialization::{PostcardSerializer, Serializer};
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Lookup {
///     key: String,
///     limit: u32,
/// }
///
/// let serializer = PostcardSerializer::default();
/// let result: Result<Lookup, _> = serializer.deserialize(&[0xFF, 0xFF, 0xFF]);
/// assert!(result.is_err());
/// ```
#[derive(Debug)]
pub struct DeserializationError {
    message: String,
    source: Option<BoxedSource>,
}

impl DeserializationError {
    /// Creates an error with a message and no source.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The message without the source chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the I/O error underneath this one, if any.
    ///
    /// Framing reports socket failures this way, which lets the reactor tell
    /// a dead connection from a malformed message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rpcmux::serialization::DeserializationError;
    /// use std::io;
    ///
    /// let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
    /// let error = DeserializationError::with_source("truncated frame", eof);
    /// assert_eq!(error.io_error().map(|e| e.kind()), Some(io::ErrorKind::UnexpectedEof));
    ///
    /// assert!(DeserializationError::new("bad tag").io_error().is_none());
    /// ```
    pub fn io_error(&self) -> Option<&std::io::Error> {
        self.source
            .as_ref()
            .and_then(|e| e.as_ref().downcast_ref::<std::io::Error>())
    }
}

impl fmt::Display for DeserializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deserialization error: {}", self.message)?;
        if let Some(source) = &self.source {
            write!(f, " (caused by: {source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for DeserializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<postcard::Error> for SerializationError {
    fn from(err: postcard::Error) -> Self {
        Self::with_source("postcard encoding failed", err)
    }
}

impl From<postcard::Error> for DeserializationError {
    fn from(err: postcard::Error) -> Self {
        Self::with_source("postcard decoding failed", err)
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source("JSON encoding failed", err)
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for DeserializationError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source("JSON decoding failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_serialization_error_display() {
        let error = SerializationError::new("frame too large");
        assert_eq!(error.to_string(), "serialization error: frame too large");
        assert_eq!(error.message(), "frame too large");
        assert!(error.source().is_none());
    }

    #[test]
    fn test_deserialization_error_with_io_source() {
        let source = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let error = DeserializationError::with_source("truncated frame", source);
        assert!(error.to_string().contains("truncated frame"));
        assert!(error.source().is_some());
        assert_eq!(
            error.io_error().map(|e| e.kind()),
            Some(std::io::ErrorKind::UnexpectedEof)
        );
    }

    #[test]
    fn test_deserialization_error_without_io_source() {
        let error = DeserializationError::new("bad tag");
        assert!(error.io_error().is_none());
    }
}
