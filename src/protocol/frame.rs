//! Frame struct with ordered headers.
//!
//! Represents one STOMP frame: a command, an ordered header list and an
//! optional body. Uses `bytes::Bytes` for zero-copy body sharing between
//! subscribers during fan-out.
//!
//! # Example
//!
//! ```
//! use stomp_broker::protocol::{Command, Frame};
//!
//! let frame = Frame::new(Command::Send)
//!     .header("destination", "/topic/greetings")
//!     .text_body("hello");
//!
//! assert_eq!(frame.get_header("destination"), Some("/topic/greetings"));
//! assert_eq!(frame.body(), Some(&b"hello"[..]));
//! ```

use std::fmt;

use bytes::Bytes;

use super::Command;

/// Ordered header map. Keys are unique; insertion order is kept for
/// deterministic serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check if `key` is present.
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key`, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert `key` only if it is not present yet. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Copy every entry of `other` over this map.
    pub fn merge(&mut self, other: &Headers) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.set(k, v);
        }
        headers
    }
}

/// A complete STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw command token. Kept as a string so unknown commands survive
    /// parsing and can be reported by the dispatcher.
    pub command: String,
    /// Headers in insertion order.
    pub headers: Headers,
    /// Body bytes, if any.
    pub body: Option<Bytes>,
    /// Body length is authoritative (`content-length`) rather than
    /// NUL-terminated. Binary frames are serialized without string
    /// conversion.
    pub binary: bool,
}

impl Frame {
    /// Create a frame with no headers and no body.
    pub fn new(command: Command) -> Self {
        Self::with_command(command.as_str())
    }

    /// Create a frame from a raw command token.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Headers::new(),
            body: None,
            binary: false,
        }
    }

    /// Builder-style header setter.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(key, value);
        self
    }

    /// Builder-style textual body setter.
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Bytes::from(body.into()));
        self.binary = false;
        self
    }

    /// Builder-style binary body setter.
    pub fn binary_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self.binary = true;
        self
    }

    /// The typed command, if the token is a known STOMP verb.
    pub fn command(&self) -> Option<Command> {
        self.command.parse().ok()
    }

    /// Get a header value.
    #[inline]
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Get the body bytes.
    #[inline]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the body length (0 when absent).
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, |b| b.len())
    }

    /// Get the body as UTF-8 text, if it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        self.body().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Check if this frame declared an exact body length.
    #[inline]
    pub fn is_binary(&self) -> bool {
        self.binary
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.command)?;
        for (k, v) in self.headers.iter() {
            writeln!(f, "{}: {}", k, v)?;
        }
        match &self.body {
            Some(body) if !self.binary => match std::str::from_utf8(body) {
                Ok(text) => write!(f, "Body: {}", text),
                Err(_) => write!(f, "Body ({} bytes)", body.len()),
            },
            Some(body) => write!(f, "Body ({} bytes)", body.len()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/topic/a")
            .text_body("hello");

        assert_eq!(frame.command(), Some(Command::Send));
        assert_eq!(frame.get_header("destination"), Some("/topic/a"));
        assert_eq!(frame.body(), Some(&b"hello"[..]));
        assert_eq!(frame.body_len(), 5);
        assert!(!frame.is_binary());
    }

    #[test]
    fn test_unknown_command_kept_raw() {
        let frame = Frame::with_command("BEGIN");
        assert_eq!(frame.command, "BEGIN");
        assert!(frame.command().is_none());
    }

    #[test]
    fn test_headers_set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.set("a", "1");
        headers.set("b", "2");
        headers.set("a", "3");

        let entries: Vec<_> = headers.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_headers_insert_if_absent() {
        let mut headers = Headers::new();
        assert!(headers.insert_if_absent("id", "first"));
        assert!(!headers.insert_if_absent("id", "second"));
        assert_eq!(headers.get("id"), Some("first"));
    }

    #[test]
    fn test_headers_merge_and_remove() {
        let mut defaults: Headers = [("destination", "/topic/a"), ("content-type", "text/plain")]
            .into_iter()
            .collect();
        let caller: Headers = [("content-type", "application/json"), ("priority", "9")]
            .into_iter()
            .collect();

        defaults.merge(&caller);
        assert_eq!(defaults.get("content-type"), Some("application/json"));
        assert_eq!(defaults.get("priority"), Some("9"));
        assert_eq!(defaults.len(), 3);

        assert_eq!(defaults.remove("priority"), Some("9".to_string()));
        assert!(!defaults.contains("priority"));
        assert_eq!(defaults.remove("priority"), None);
    }

    #[test]
    fn test_binary_body_zero_copy() {
        let original = Bytes::from_static(&[0, 1, 2, 0xFF]);
        let frame = Frame::new(Command::Send).binary_body(original.clone());

        assert!(frame.is_binary());
        assert_eq!(frame.body.as_ref().unwrap().as_ptr(), original.as_ptr());
        assert!(frame.body_text().is_none());
    }

    #[test]
    fn test_display() {
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/a")
            .binary_body(vec![0u8, 159, 146, 150]);
        let s = format!("{}", frame);
        assert!(s.starts_with("MESSAGE\n"));
        assert!(s.contains("destination: /topic/a"));
        assert!(s.contains("Body (4 bytes)"));
    }
}
