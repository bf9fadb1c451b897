//! The message contract: deciding whether a payload is a legal message.
//!
//! Validation branches on the `type` tag first. An unknown tag fails
//! immediately with [`ContractViolation::UnknownType`] instead of being
//! tried against every variant, which keeps the diagnostic precise and the
//! check a single lookup.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Codec, ContractViolation, Direction, Message};

/// A closed family of messages discriminated by a `type` field.
pub trait Contract:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Which way messages of this family travel.
    const DIRECTION: Direction;

    /// Every `type` value in the family.
    const TYPES: &'static [&'static str];

    /// The `type` value of this message.
    fn message_type(&self) -> &'static str;

    /// Returns `true` if `message_type` belongs to the family.
    fn is_known_type(message_type: &str) -> bool {
        Self::TYPES.contains(&message_type)
    }
}

/// Checks a JSON value against the contract of `C`.
///
/// The value must be an object with a known string `type`, an RFC 3339
/// `timestamp`, and fields matching that type's variant. Unknown extra
/// fields are ignored.
pub fn validate<C: Contract>(
    value: &Value,
) -> Result<Message<C>, ContractViolation> {
    let direction = C::DIRECTION;

    let object = value
        .as_object()
        .ok_or(ContractViolation::NotAnObject { direction })?;

    let message_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ContractViolation::MissingType { direction })?;

    if !C::is_known_type(message_type) {
        return Err(ContractViolation::UnknownType {
            direction,
            message_type: message_type.to_string(),
        });
    }

    let malformed = |reason: String| ContractViolation::Malformed {
        direction,
        message_type: message_type.to_string(),
        reason,
    };

    let timestamp = match object.get("timestamp") {
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| malformed(format!("invalid timestamp `{raw}`: {e}")))?
            .with_timezone(&Utc),
        Some(_) => {
            return Err(malformed("`timestamp` must be a string".into()));
        }
        None => return Err(malformed("missing `timestamp`".into())),
    };

    let body = C::deserialize(value).map_err(|e| malformed(e.to_string()))?;

    Ok(Message { body, timestamp })
}

/// Decodes a text frame and validates it against the contract of `C`.
///
/// A frame that is not JSON is reported as
/// [`ContractViolation::InvalidJson`].
pub fn decode_frame<C: Contract>(
    codec: &impl Codec,
    frame: &str,
) -> Result<Message<C>, ContractViolation> {
    let value: Value =
        codec
            .decode(frame)
            .map_err(|e| ContractViolation::InvalidJson {
                direction: C::DIRECTION,
                reason: e.to_string(),
            })?;
    validate(&value)
}
