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


//! JSON serializer, handy when payloads need to be read by a human.

use crate::serialization::{DeserializationError, SerializationError, Serializer};

/// Serializer based on `serde_json`.
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    /// Creates a compact JSON serializer.
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Emits indented JSON.
    pub fn with_pretty_print(mut self) -> Self {
        self.pretty = true;
        self
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializationError>
    where
        T: serde::Serialize + ?Sized,
    {
        if self.pretty {
            serde_json::to_vec_pretty(value).map_err(Into::into)
        } else {
            serde_json::to_vec(value).map_err(Into::into)
        }
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, DeserializationError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(Into::into)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Echo {
        text: String,
    }

    #[test]
    fn test_json_is_readable() {
        let serializer = JsonSerializer::default();
        let bytes = serializer
            .serialize(&Echo {
                text: "hi".to_string(),
            })
            .unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"text":"hi"}"#);
    }

    #[test]
    fn test_json_pretty_print() {
        let serializer = JsonSerializer::new().with_pretty_print();
        let bytes = serializer
            .serialize(&Echo {
                text: "hi".to_string(),
            })
            .unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains('\n'));
    }

    #[test]
    fn test_json_unicode_round_trip() {
        let serializer = JsonSerializer::default();
        let original = Echo {
            text: "h\u{e9}llo \"w\u{f6}rld\"\n".to_string(),
        };
        let bytes = serializer.serialize(&original).unwrap();
        assert_eq!(serializer.deserialize::<Echo>(&bytes).unwrap(), original);
    }

    #[test]
    fn test_json_invalid_data() {
        let serializer = JsonSerializer::default();
        let result: Result<Echo, _> = serializer.deserialize(b"not valid json {");
        assert!(result.is_err());
    }
}
