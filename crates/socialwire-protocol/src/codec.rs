//! Codec for encoding requests and decoding inbound frames.
//!
//! Outbound frames are two lines of text: a header with the request tag and
//! correlation id, then the JSON payload. Inbound frames are single JSON
//! objects classified by their `Type` field.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::frames::{CorrelationId, Event, EventKind, RequestType, WireMessage, EVENT_PREFIX, REPLY_ERROR};
use crate::requests::Request;

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Discriminant field of inbound frames.
pub const TYPE_FIELD: &str = "Type";

/// Correlation id field of replies and errors.
pub const SEQ_ID_FIELD: &str = "SeqId";

/// Human-readable text of `REPLY_ERROR` frames.
pub const MESSAGE_FIELD: &str = "Message";

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request payloads must be JSON objects.
    #[error("Request payload must be a JSON object")]
    PayloadNotObject,

    /// Inbound frame is valid JSON but not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// Inbound frame has no string `Type` field.
    #[error("Frame has no `{TYPE_FIELD}` discriminant")]
    MissingType,

    /// Reply without a usable `SeqId`.
    #[error("Reply `{0}` carries no correlation id")]
    MissingCorrelationId(String),

    /// Outbound frame text does not follow the two-line layout.
    #[error("Invalid frame: {0}")]
    Invalid(String),
}

/// Encode a request into an outbound frame.
///
/// The encoded format is:
/// - line 1: `<REQUEST_TYPE> <correlation id>`
/// - line 2: the JSON-serialized payload object
///
/// # Errors
///
/// Returns an error if the payload is not a JSON object or the frame is too large.
pub fn encode<T>(
    request_type: RequestType,
    correlation_id: CorrelationId,
    payload: &T,
) -> Result<String, CodecError>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_value(payload)?;
    if !body.is_object() {
        return Err(CodecError::PayloadNotObject);
    }

    let frame = format!("{request_type} {correlation_id}\n{body}");
    if frame.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(frame.len()));
    }

    Ok(frame)
}

/// Encode a typed request.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_request<R: Request>(
    correlation_id: CorrelationId,
    request: &R,
) -> Result<String, CodecError> {
    encode(R::TYPE, correlation_id, request)
}

/// Decode one inbound frame.
///
/// # Errors
///
/// Returns an error if the frame is too large, is not a JSON object, lacks a
/// discriminant, or is a reply without a correlation id.
pub fn decode(raw: &str) -> Result<WireMessage, CodecError> {
    if raw.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(raw.len()));
    }

    let object = match serde_json::from_str::<Value>(raw)? {
        Value::Object(object) => object,
        _ => return Err(CodecError::NotAnObject),
    };

    let tag = match object.get(TYPE_FIELD) {
        Some(Value::String(tag)) => tag.clone(),
        _ => return Err(CodecError::MissingType),
    };

    if tag.starts_with(EVENT_PREFIX) {
        let kind = EventKind::from_tag(&tag);
        return Ok(WireMessage::Event(Event::new(kind, Value::Object(object))));
    }

    let correlation_id = object.get(SEQ_ID_FIELD).and_then(parse_correlation_id);

    if tag == REPLY_ERROR {
        let message = object
            .get(MESSAGE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(WireMessage::ProtocolError {
            correlation_id,
            message,
        });
    }

    match correlation_id {
        Some(correlation_id) => Ok(WireMessage::Reply {
            correlation_id,
            reply_type: tag,
            payload: Value::Object(object),
        }),
        None => Err(CodecError::MissingCorrelationId(tag)),
    }
}

/// Decode an outbound frame back into its parts.
///
/// This is the server's view of a request, used by test peers and tooling.
///
/// # Errors
///
/// Returns an error if the header or payload is malformed.
pub fn decode_request(
    raw: &str,
) -> Result<(RequestType, CorrelationId, Map<String, Value>), CodecError> {
    let (header, body) = raw
        .split_once('\n')
        .ok_or_else(|| CodecError::Invalid("missing header line".into()))?;
    let (tag, id) = header
        .split_once(' ')
        .ok_or_else(|| CodecError::Invalid(format!("malformed header: {header}")))?;

    let request_type = tag
        .parse::<RequestType>()
        .map_err(|e| CodecError::Invalid(format!("{e}: {tag}")))?;
    let correlation_id = id
        .parse::<CorrelationId>()
        .map_err(|_| CodecError::Invalid(format!("correlation id is not an integer: {id}")))?;

    match serde_json::from_str::<Value>(body)? {
        Value::Object(payload) => Ok((request_type, correlation_id, payload)),
        _ => Err(CodecError::PayloadNotObject),
    }
}

fn parse_correlation_id(value: &Value) -> Option<CorrelationId> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{AddTimelinePost, GetFriends};
    use serde_json::json;

    #[test]
    fn test_encode_layout() {
        let frame = encode(RequestType::GetTimeline, 5, &json!({"Limit": 10})).unwrap();
        assert_eq!(frame, "REQUEST_GET_TIMELINE 5\n{\"Limit\":10}");

        let frame = encode_request(6, &AddTimelinePost { text: "hello".into() }).unwrap();
        let (header, body) = frame.split_once('\n').unwrap();
        assert_eq!(header, "REQUEST_ADD_TO_TIMELINE 6");
        assert_eq!(serde_json::from_str::<Value>(body).unwrap(), json!({"Text": "hello"}));
    }

    #[test]
    fn test_encode_rejects_non_objects() {
        match encode(RequestType::GetFriends, 1, &json!([1, 2, 3])) {
            Err(CodecError::PayloadNotObject) => {}
            other => panic!("Expected PayloadNotObject error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_too_large() {
        let text = "x".repeat(MAX_FRAME_SIZE);
        match encode(RequestType::AddTimelinePost, 1, &json!({ "Text": text })) {
            Err(CodecError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_reply() {
        let message =
            decode(r#"{"SeqId": 9, "Type": "REPLY_GENERIC", "Success": true}"#).unwrap();

        match message {
            WireMessage::Reply {
                correlation_id,
                reply_type,
                payload,
            } => {
                assert_eq!(correlation_id, 9);
                assert_eq!(reply_type, "REPLY_GENERIC");
                assert_eq!(payload["Success"], json!(true));
            }
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_event() {
        let message =
            decode(r#"{"Type": "EVENT_USER_CONNECTED", "Id": "4", "Name": "Dana"}"#).unwrap();

        match message {
            WireMessage::Event(event) => {
                assert_eq!(event.kind, EventKind::UserConnected);
                assert_eq!(event.payload["Name"], json!("Dana"));
            }
            other => panic!("Expected event, got {:?}", other),
        }

        let message = decode(r#"{"Type": "EVENT_SOMETHING_NEW"}"#).unwrap();
        assert!(matches!(
            message,
            WireMessage::Event(Event { kind: EventKind::Unknown(_), .. })
        ));
    }

    #[test]
    fn test_decode_protocol_error() {
        let message =
            decode(r#"{"SeqId": 3, "Type": "REPLY_ERROR", "Message": "bad request"}"#).unwrap();
        assert_eq!(
            message,
            WireMessage::ProtocolError {
                correlation_id: Some(3),
                message: "bad request".to_string(),
            }
        );

        let message = decode(r#"{"Type": "REPLY_ERROR"}"#).unwrap();
        assert_eq!(
            message,
            WireMessage::ProtocolError {
                correlation_id: None,
                message: String::new(),
            }
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("{not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode("AUTH_ERROR"), Err(CodecError::Json(_))));
        assert!(matches!(decode("[1, 2]"), Err(CodecError::NotAnObject)));
        assert!(matches!(decode(r#"{"SeqId": 1}"#), Err(CodecError::MissingType)));
        assert!(matches!(
            decode(r#"{"Type": "REPLY_GENERIC"}"#),
            Err(CodecError::MissingCorrelationId(_))
        ));
    }

    #[test]
    fn test_decode_string_correlation_id() {
        let message = decode(r#"{"SeqId": "12", "Type": "REPLY_GENERIC"}"#).unwrap();
        assert_eq!(message.correlation_id(), Some(12));
    }

    #[test]
    fn test_decode_request() {
        let frame = encode_request(42, &GetFriends { limit: 50 }).unwrap();
        let (request_type, correlation_id, payload) = decode_request(&frame).unwrap();

        assert_eq!(request_type, RequestType::GetFriends);
        assert_eq!(correlation_id, 42);
        assert_eq!(payload.get("Limit"), Some(&json!(50)));

        assert!(decode_request("REQUEST_GET_FRIENDS 1").is_err());
        assert!(decode_request("REQUEST_GET_FRIENDS x\n{}").is_err());
        assert!(decode_request("REQUEST_NOPE 1\n{}").is_err());
    }
}
