//! Wire value types for request/reply/push frames.
//!
//! Server-pushed methods and replies are distinguished by the frame's
//! `type` field, not by the presence of an `id` — both are parsed into a
//! [`Frame`] sum and routed at a single point by [`crate::socket::Socket`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessageParseError;

/// An outbound request: a method name, a parameter object, and a flag
/// indicating whether the caller wants a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Method {
    /// Id assigned by the Socket when the Method was created. Monotonic
    /// and never reused within a Socket's lifetime.
    pub id: u32,
    /// Remote method name.
    pub method: String,
    /// Parameter object.
    pub params: Value,
    /// If true, the server will not send a reply; the caller's future
    /// resolves as soon as the frame is written.
    #[serde(default, skip_serializing_if = "is_false")]
    pub discard: bool,
    /// Latest sequence number observed by the Socket, stamped onto the
    /// frame just before serialization.
    #[serde(default)]
    pub seq: u32,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Method {
    /// Constructs a Method with `seq` left at 0; call
    /// [`Method::with_seq`] to stamp the current sequence number before
    /// serialization.
    #[must_use]
    pub fn new(id: u32, method: impl Into<String>, params: Value, discard: bool) -> Self {
        Self {
            id,
            method: method.into(),
            params,
            discard,
            seq: 0,
        }
    }

    /// Returns a copy stamped with the given sequence number, ready for
    /// serialization.
    #[must_use]
    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }
}

/// A structured error carried by a [`Reply`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Application error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional dotted path into the request params the error refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Inbound response to a previously sent Method. Exactly one of
/// `result`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    /// Id of the originating Method.
    pub id: u32,
    /// Successful result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    /// Sequence number, if the server stamped one on this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u32>,
}

/// A server-initiated method call, same shape as [`Method`] minus an
/// assigned id, delivered to subscribers on the client facade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Push {
    /// Remote method name.
    pub method: String,
    /// Parameter object.
    pub params: Value,
    /// Sequence number, if the server stamped one on this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u32>,
}

/// A parsed inbound frame, routed by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A server-initiated method call (`type: "method"`).
    Method(Push),
    /// A response to a previously sent Method (`type: "reply"`).
    Reply(Reply),
}

impl Frame {
    /// The `seq` field carried by this frame, if any.
    #[must_use]
    pub fn seq(&self) -> Option<u32> {
        match self {
            Self::Method(push) => push.seq,
            Self::Reply(reply) => reply.seq,
        }
    }

    /// Parses a raw text frame into a [`Frame`], dispatching on `type`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageParseError::InvalidJson`] if `text` is not valid
    /// JSON, and [`MessageParseError::UnknownType`] if `type` is missing
    /// or not one of `"method"`/`"reply"`.
    pub fn parse(text: &str) -> Result<Self, MessageParseError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| MessageParseError::InvalidJson(e.to_string()))?;

        let frame_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| MessageParseError::UnknownType("<missing type>".to_string()))?;

        match frame_type {
            "method" => serde_json::from_value(value)
                .map(Frame::Method)
                .map_err(|e| MessageParseError::InvalidJson(e.to_string())),
            "reply" => serde_json::from_value(value)
                .map(Frame::Reply)
                .map_err(|e| MessageParseError::InvalidJson(e.to_string())),
            other => Err(MessageParseError::UnknownType(other.to_string())),
        }
    }
}

/// The wire envelope written for an outbound Method: `Method`'s fields
/// plus the literal discriminant `type: "method"`.
#[derive(Debug, Clone, Serialize)]
pub struct MethodFrame {
    #[serde(rename = "type")]
    frame_type: &'static str,
    #[serde(flatten)]
    method: Method,
}

impl MethodFrame {
    /// Wraps `method` for serialization onto the wire.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            frame_type: "method",
            method,
        }
    }

    /// Serializes to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` contains a type `serde_json` cannot
    /// represent (not possible for values already parsed from JSON).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_round_trips_through_frame() {
        let method = Method::new(7, "ready", json!({"isReady": true}), false).with_seq(3);
        let wire = MethodFrame::new(method.clone()).to_json().unwrap();

        let parsed = Frame::parse(&wire).unwrap();
        match parsed {
            Frame::Method(push) => {
                assert_eq!(push.method, "ready");
                assert_eq!(push.params, json!({"isReady": true}));
                assert_eq!(push.seq, Some(3));
            }
            Frame::Reply(_) => panic!("expected a method frame"),
        }
    }

    #[test]
    fn reply_with_result_parses() {
        let text = r#"{"type":"reply","id":0,"result":null,"seq":1}"#;
        let frame = Frame::parse(text).unwrap();
        match frame {
            Frame::Reply(reply) => {
                assert_eq!(reply.id, 0);
                assert_eq!(reply.result, Some(Value::Null));
                assert!(reply.error.is_none());
                assert_eq!(reply.seq, Some(1));
            }
            Frame::Method(_) => panic!("expected a reply frame"),
        }
    }

    #[test]
    fn reply_with_error_parses() {
        let text = r#"{"type":"reply","id":5,"error":{"code":409,"message":"name taken"}}"#;
        let frame = Frame::parse(text).unwrap();
        match frame {
            Frame::Reply(reply) => {
                let err = reply.error.unwrap();
                assert_eq!(err.code, 409);
                assert_eq!(err.message, "name taken");
                assert!(err.path.is_none());
            }
            Frame::Method(_) => panic!("expected a reply frame"),
        }
    }

    #[test]
    fn invalid_json_raises_parse_error() {
        let err = Frame::parse("not json").unwrap_err();
        assert!(matches!(err, MessageParseError::InvalidJson(_)));
    }

    #[test]
    fn unknown_type_raises_parse_error() {
        let err = Frame::parse(r#"{"type":"ping"}"#).unwrap_err();
        assert!(matches!(err, MessageParseError::UnknownType(t) if t == "ping"));
    }

    #[test]
    fn missing_type_raises_parse_error() {
        let err = Frame::parse(r#"{"id":1}"#).unwrap_err();
        assert!(matches!(err, MessageParseError::UnknownType(_)));
    }
}
