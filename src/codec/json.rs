//! JSON codec using `serde_json`.
//!
//! Object key order is preserved (`preserve_order`), so a body parsed on
//! SEND is written back byte-for-byte in compact form on MESSAGE.
//!
//! # Example
//!
//! ```
//! use stomp_broker::codec::JsonCodec;
//!
//! let value: serde_json::Value = JsonCodec::decode(br#"{"z":1,"a":2}"#).unwrap();
//! assert_eq!(JsonCodec::encode(&value).unwrap(), r#"{"z":1,"a":2}"#);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// JSON codec for structured bodies.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value as compact JSON text.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode JSON bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid JSON for type T.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
