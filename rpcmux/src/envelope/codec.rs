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


//! Envelope encoding and decoding.
//!
//! The codec is stateless and works on frame sets produced by
//! [`framing`](crate::serialization::framing). Layout:
//!
//! | Frame | Request                              | Reply                 |
//! |-------|--------------------------------------|-----------------------|
//! | 0     | peer identity                        | peer identity (echo)  |
//! | 1     | `0x01` + request id (u64 BE)         | `0x02` + request id   |
//! | 2     | service name (UTF-8, non-empty)      | status (1 byte)       |
//! | 3     | `0x00` + name, or `0x01` + u32 index | payload               |
//! | 4     | payload                              |                       |

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::Status;
use crate::envelope::{Envelope, MethodSelector, Reply, Request, RequestId};

/// Header kind byte of a request.
pub const KIND_REQUEST: u8 = 0x01;
/// Header kind byte of a reply.
pub const KIND_REPLY: u8 = 0x02;
/// Selector tag for a method name.
pub const SELECTOR_NAME: u8 = 0x00;
/// Selector tag for a method index.
pub const SELECTOR_INDEX: u8 = 0x01;

const HEADER_LEN: usize = 9;
const REQUEST_FRAMES: usize = 5;
const REPLY_FRAMES: usize = 4;

/// A message that does not form a valid envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer than two frames, so not even a header is present.
    #[error("message has {count} frames, too few for an envelope")]
    MissingHeader {
        /// Frames received
        count: usize,
    },

    /// The header frame has the wrong size.
    #[error("header frame is {len} bytes, expected 9")]
    BadHeader {
        /// Actual header length
        len: usize,
    },

    /// The header kind byte is neither request nor reply.
    #[error("unknown envelope kind 0x{0:02x}")]
    UnknownKind(u8),

    /// Request id zero is reserved.
    #[error("request id 0 is reserved")]
    ZeroRequestId,

    /// The frame count does not match the envelope kind.
    #[error("{kind} envelope has {actual} frames, expected {expected}")]
    WrongFrameCount {
        /// `"request"` or `"reply"`
        kind: &'static str,
        /// Frames required
        expected: usize,
        /// Frames received
        actual: usize,
    },

    /// The service name frame is empty.
    #[error("empty service name")]
    EmptyServiceName,

    /// A text field is not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Which field
        field: &'static str,
    },

    /// The method selector frame is malformed.
    #[error("malformed method selector: {reason}")]
    BadSelector {
        /// What is wrong with it
        reason: &'static str,
    },

    /// The status frame is not one byte or holds an unknown code.
    #[error("invalid status frame")]
    BadStatus,
}

fn header(kind: u8, request_id: RequestId) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    buf.put_u8(kind);
    buf.put_u64(request_id.as_u64());
    buf.freeze()
}

fn selector(method: &MethodSelector) -> Bytes {
    match method {
        MethodSelector::Name(name) => {
            let mut buf = BytesMut::with_capacity(1 + name.len());
            buf.put_u8(SELECTOR_NAME);
            buf.put_slice(name.as_bytes());
            buf.freeze()
        }
        MethodSelector::Index(index) => {
            let mut buf = BytesMut::with_capacity(5);
            buf.put_u8(SELECTOR_INDEX);
            buf.put_u32(*index);
            buf.freeze()
        }
    }
}

/// Encodes a request into its frame set.
pub fn encode_request(peer: &Bytes, request: &Request) -> Vec<Bytes> {
    vec![
        peer.clone(),
        header(KIND_REQUEST, request.request_id),
        Bytes::copy_from_slice(request.service.as_bytes()),
        selector(&request.method),
        request.payload.clone(),
    ]
}

/// Encodes a reply into its frame set.
pub fn encode_reply(peer: &Bytes, reply: &Reply) -> Vec<Bytes> {
    vec![
        peer.clone(),
        header(KIND_REPLY, reply.request_id),
        Bytes::copy_from_slice(&[reply.status.code()]),
        reply.payload.clone(),
    ]
}

/// Decodes a frame set into the peer identity and the envelope it carries.
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first defect found.
pub fn decode(frames: Vec<Bytes>) -> Result<(Bytes, Envelope), CodecError> {
    if frames.len() < 2 {
        return Err(CodecError::MissingHeader {
            count: frames.len(),
        });
    }

    let head = &frames[1];
    if head.len() != HEADER_LEN {
        return Err(CodecError::BadHeader { len: head.len() });
    }
    let kind = head[0];
    let mut id_bytes = [0u8; 8];
    id_bytes.copy_from_slice(&head[1..HEADER_LEN]);
    let raw_id = u64::from_be_bytes(id_bytes);

    let (expected, kind_name) = match kind {
        KIND_REQUEST => (REQUEST_FRAMES, "request"),
        KIND_REPLY => (REPLY_FRAMES, "reply"),
        other => return Err(CodecError::UnknownKind(other)),
    };
    if frames.len() != expected {
        return Err(CodecError::WrongFrameCount {
            kind: kind_name,
            expected,
            actual: frames.len(),
        });
    }
    if raw_id == 0 {
        return Err(CodecError::ZeroRequestId);
    }
    let request_id = RequestId::new(raw_id);

    let mut frames = frames.into_iter();
    let peer = frames.next().unwrap_or_default();
    let _header = frames.next();
    let third = frames.next().unwrap_or_default();
    let fourth = frames.next().unwrap_or_default();

    let envelope = if kind == KIND_REQUEST {
        let payload = frames.next().unwrap_or_default();
        Envelope::Request(Request {
            request_id,
            service: decode_service(&third)?,
            method: decode_selector(&fourth)?,
            payload,
        })
    } else {
        let status = match &third[..] {
            [code] => Status::from_code(*code).ok_or(CodecError::BadStatus)?,
            _ => return Err(CodecError::BadStatus),
        };
        Envelope::Reply(Reply {
            request_id,
            status,
            payload: fourth,
        })
    };

    Ok((peer, envelope))
}

fn decode_service(frame: &Bytes) -> Result<String, CodecError> {
    if frame.is_empty() {
        return Err(CodecError::EmptyServiceName);
    }
    std::str::from_utf8(frame)
        .map(str::to_owned)
        .map_err(|_| CodecError::InvalidUtf8 {
            field: "service name",
        })
}

fn decode_selector(frame: &Bytes) -> Result<MethodSelector, CodecError> {
    match frame.split_first() {
        Some((&SELECTOR_NAME, name)) => {
            if name.is_empty() {
                return Err(CodecError::BadSelector {
                    reason: "empty method name",
                });
            }
            std::str::from_utf8(name)
                .map(|name| MethodSelector::Name(name.to_owned()))
                .map_err(|_| CodecError::InvalidUtf8 {
                    field: "method name",
                })
        }
        Some((&SELECTOR_INDEX, index)) => {
            let index: [u8; 4] = index.try_into().map_err(|_| CodecError::BadSelector {
                reason: "index must be 4 bytes",
            })?;
            Ok(MethodSelector::Index(u32::from_be_bytes(index)))
        }
        Some(_) => Err(CodecError::BadSelector {
            reason: "unknown selector tag",
        }),
        None => Err(CodecError::BadSelector {
            reason: "empty selector",
        }),
    }
}
