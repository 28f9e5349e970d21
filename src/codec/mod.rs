//! Codec module - message body encoding by `content-type`.
//!
//! SEND bodies are decoded when they enter the broker and encoded again on
//! the way out to subscribers:
//!
//! - [`JsonCodec`] - `application/json` bodies via `serde_json`
//! - binary bodies pass through as shared `Bytes`
//! - anything else that is valid UTF-8 is text
//!
//! # Example
//!
//! ```
//! use stomp_broker::codec::MessageBody;
//!
//! let body = MessageBody::decode(Some("application/json"), br#"{"a":1}"#).unwrap();
//! assert!(matches!(body, MessageBody::Json(_)));
//! assert_eq!(&body.encode().unwrap()[..], br#"{"a":1}"#);
//! ```

mod json;

pub use json::JsonCodec;

use bytes::Bytes;

use crate::error::Result;

/// `content-type` of JSON bodies.
pub const APPLICATION_JSON: &str = "application/json";

/// `content-type` of textual bodies.
pub const TEXT_PLAIN: &str = "text/plain";

/// `content-type` of binary bodies.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// No body.
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Parsed JSON, re-serialized on delivery.
    Json(serde_json::Value),
    /// Raw bytes, delivered with an exact `content-length`.
    Binary(Bytes),
}

impl MessageBody {
    /// Decode raw body bytes according to `content-type`.
    ///
    /// JSON content types must carry valid JSON. Numbers keep their written
    /// form; of duplicate object keys only the last survives. Other bodies
    /// are text when they are valid UTF-8 and binary otherwise.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if a JSON body does not parse.
    pub fn decode(content_type: Option<&str>, data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(MessageBody::Empty);
        }
        if content_type.is_some_and(is_json) {
            return Ok(MessageBody::Json(JsonCodec::decode(data)?));
        }
        match std::str::from_utf8(data) {
            Ok(text) => Ok(MessageBody::Text(text.to_string())),
            Err(_) => Ok(MessageBody::Binary(Bytes::copy_from_slice(data))),
        }
    }

    /// Encode the body for the wire.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if a JSON value cannot be serialized.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            MessageBody::Empty => Ok(Bytes::new()),
            MessageBody::Text(text) => Ok(Bytes::from(text.clone())),
            MessageBody::Json(value) => Ok(Bytes::from(JsonCodec::encode(value)?)),
            MessageBody::Binary(bytes) => Ok(bytes.clone()),
        }
    }

    /// The `content-type` the broker assigns when the sender names none.
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            MessageBody::Empty => None,
            MessageBody::Text(_) => Some(TEXT_PLAIN),
            MessageBody::Json(_) => Some(APPLICATION_JSON),
            MessageBody::Binary(_) => Some(OCTET_STREAM),
        }
    }

    /// Check if the body must be framed by exact length.
    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, MessageBody::Binary(_))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, MessageBody::Empty)
    }
}

impl From<&str> for MessageBody {
    fn from(text: &str) -> Self {
        MessageBody::Text(text.to_string())
    }
}

impl From<String> for MessageBody {
    fn from(text: String) -> Self {
        MessageBody::Text(text)
    }
}

impl From<serde_json::Value> for MessageBody {
    fn from(value: serde_json::Value) -> Self {
        MessageBody::Json(value)
    }
}

impl From<Bytes> for MessageBody {
    fn from(bytes: Bytes) -> Self {
        MessageBody::Binary(bytes)
    }
}

impl From<Vec<u8>> for MessageBody {
    fn from(bytes: Vec<u8>) -> Self {
        MessageBody::Binary(Bytes::from(bytes))
    }
}

/// Check if a `content-type` names JSON (parameters such as `charset` are ignored).
pub fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(APPLICATION_JSON))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json() {
        let body = MessageBody::decode(Some("application/json"), br#"{"a":1}"#).unwrap();
        assert_eq!(body, MessageBody::Json(json!({"a": 1})));
    }

    #[test]
    fn test_json_round_trip_is_identical() {
        let raw = br#"{"b":2,"a":[1,2,{"c":null}]}"#;
        let body = MessageBody::decode(Some(APPLICATION_JSON), raw).unwrap();
        assert_eq!(&body.encode().unwrap()[..], &raw[..]);
    }

    #[test]
    fn test_json_numbers_keep_their_form() {
        let raw = br#"{"exp":1e3,"big":123456789012345678901234567890,"f":0.10}"#;
        let body = MessageBody::decode(Some(APPLICATION_JSON), raw).unwrap();
        assert_eq!(&body.encode().unwrap()[..], &raw[..]);
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(MessageBody::decode(Some(APPLICATION_JSON), b"{not json").is_err());
    }

    #[test]
    fn test_decode_text_and_binary() {
        assert_eq!(
            MessageBody::decode(Some("text/plain"), b"hi").unwrap(),
            MessageBody::Text("hi".to_string())
        );
        assert_eq!(
            MessageBody::decode(None, b"hi").unwrap(),
            MessageBody::Text("hi".to_string())
        );
        let binary = MessageBody::decode(None, &[0xff, 0xfe]).unwrap();
        assert!(binary.is_binary());
        assert_eq!(binary.default_content_type(), Some(OCTET_STREAM));
    }

    #[test]
    fn test_binary_encode_shares_memory() {
        let bytes = Bytes::from_static(b"\x00\x01binary");
        let body = MessageBody::from(bytes.clone());
        assert_eq!(body.encode().unwrap().as_ptr(), bytes.as_ptr());
    }

    #[test]
    fn test_decode_empty() {
        let body = MessageBody::decode(Some(APPLICATION_JSON), b"").unwrap();
        assert!(body.is_empty());
        assert!(body.encode().unwrap().is_empty());
        assert_eq!(body.default_content_type(), None);
    }

    #[test]
    fn test_is_json() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("Application/JSON"));
        assert!(!is_json("text/plain"));
    }
}
