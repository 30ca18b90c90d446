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


//! Serialization layer.
//!
//! Two concerns live here:
//!
//! - **Payload encoding**: the [`Serializer`] trait with [`PostcardSerializer`]
//!   (default) and [`JsonSerializer`] (behind the `json` feature). Typed
//!   services and clients use a serializer to turn request and response
//!   values into payload bytes.
//! - **Framing**: the [`framing`] module reads and writes length-prefixed
//!   multipart messages over any async byte stream.
//!
//! Errors are reported as [`SerializationError`] or [`DeserializationError`].

pub mod framing;

mod error;
#[cfg(feature = "json")]
mod json;
mod postcard;
mod traits;

pub use error::{DeserializationError, SerializationError};
#[cfg(feature = "json")]
pub use self::json::JsonSerializer;
pub use self::postcard::PostcardSerializer;
pub use traits::Serializer;
