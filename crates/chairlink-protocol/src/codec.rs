//! Codec trait and the JSON implementation used on the wire.
//!
//! A codec converts between Rust values and text frames. The channel only
//! speaks JSON today, but it goes through [`Codec`] so the frame format is
//! decided in one place.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to text frames and decodes text frames back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the frame is malformed or does not
    /// match `T`.
    fn decode<T: DeserializeOwned>(
        &self,
        frame: &str,
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use chairlink_protocol::{Codec, JsonCodec};
/// use serde_json::json;
///
/// let codec = JsonCodec;
/// let frame = codec.encode(&json!({"type": "ping"})).unwrap();
/// assert_eq!(frame, r#"{"type":"ping"}"#);
///
/// let value: serde_json::Value = codec.decode(&frame).unwrap();
/// assert_eq!(value["type"], "ping");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        frame: &str,
    ) -> Result<T, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn test_encode_produces_compact_json() {
        let frame = JsonCodec
            .encode(&json!({"type": "subscribe", "topic": "schedule"}))
            .unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed, json!({"type": "subscribe", "topic": "schedule"}));
        assert!(!frame.contains('\n'));
    }

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Value, _> = JsonCodec.decode("not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_truncated_frame_returns_error() {
        let result: Result<Value, _> = JsonCodec.decode(r#"{"type": "pi"#);
        assert!(result.is_err());
    }
}
