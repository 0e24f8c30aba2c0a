//! Message codec
//!
//! Translates between wire frames and the envelopes in [`super::types`]. A frame
//! carrying an `id` is a command response; a frame carrying a `method` and no `id`
//! is an event notification. Anything else is a protocol error.

use super::transport::Frame;
use super::types::{CommandEnvelope, EventEnvelope, InboundMessage, RemoteError, ResponseEnvelope};
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Longest frame excerpt kept in logs and protocol violation reports
const PREVIEW_LEN: usize = 256;

/// Serialize an outbound command into a text frame.
///
/// A `null` or absent `params` and an absent `session_id` are omitted from the frame.
pub fn encode_command(
    id: u64,
    method: &str,
    params: Option<Value>,
    session_id: Option<&str>,
) -> Result<Frame> {
    let request = CommandEnvelope {
        id,
        method: method.to_string(),
        params: params.filter(|p| !p.is_null()),
        session_id: session_id.map(str::to_string),
    };

    let json = serde_json::to_string(&request)
        .map_err(|e| Error::protocol(format!("Failed to serialize request: {}", e)))?;

    Ok(Frame::Text(json))
}

/// Decode an inbound frame into a response or an event.
pub fn decode_frame(frame: &Frame) -> Result<InboundMessage> {
    let value: Value = match frame {
        Frame::Text(text) => serde_json::from_str(text),
        Frame::Binary(bytes) => serde_json::from_slice(bytes),
    }
    .map_err(|e| Error::protocol(format!("Invalid JSON frame: {}", e)))?;

    decode_value(value)
}

fn decode_value(value: Value) -> Result<InboundMessage> {
    let Value::Object(mut obj) = value else {
        return Err(Error::protocol("Frame is not a JSON object"));
    };

    if let Some(id) = obj.get("id") {
        let id = id
            .as_u64()
            .ok_or_else(|| Error::protocol(format!("Invalid response id: {}", id)))?;
        return Ok(decode_response(id, obj));
    }

    match obj.remove("method") {
        Some(Value::String(method)) => Ok(InboundMessage::Event(EventEnvelope {
            method,
            params: obj.remove("params"),
            session_id: take_session_id(&mut obj),
        })),
        Some(other) => Err(Error::protocol(format!("Invalid event method: {}", other))),
        None => Err(Error::protocol("Frame has neither an id nor a method")),
    }
}

fn decode_response(id: u64, mut obj: Map<String, Value>) -> InboundMessage {
    let session_id = take_session_id(&mut obj);

    let outcome = match (obj.remove("result"), obj.remove("error")) {
        (Some(result), None) => Ok(result),
        (None, Some(error)) => match serde_json::from_value::<RemoteError>(error) {
            Ok(error) => Err(error),
            Err(e) => {
                return InboundMessage::MalformedResponse {
                    id,
                    reason: format!("Invalid error object: {}", e),
                }
            }
        },
        (Some(_), Some(_)) => {
            return InboundMessage::MalformedResponse {
                id,
                reason: "Response carries both result and error".to_string(),
            }
        }
        (None, None) => {
            return InboundMessage::MalformedResponse {
                id,
                reason: "Response carries neither result nor error".to_string(),
            }
        }
    };

    InboundMessage::Response(ResponseEnvelope {
        id,
        outcome,
        session_id,
    })
}

fn take_session_id(obj: &mut Map<String, Value>) -> Option<String> {
    match obj.remove("sessionId") {
        Some(Value::String(session_id)) => Some(session_id),
        _ => None,
    }
}

/// Short printable excerpt of a frame
pub(crate) fn preview(frame: &Frame) -> String {
    let text = match frame {
        Frame::Text(text) => text.clone(),
        Frame::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    };

    if text.len() <= PREVIEW_LEN {
        return text;
    }

    let mut end = PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(value: Value) -> Frame {
        Frame::Text(value.to_string())
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let Frame::Text(json) = encode_command(7, "Page.enable", None, None).unwrap() else {
            panic!("expected a text frame");
        };
        assert_eq!(json, r#"{"id":7,"method":"Page.enable"}"#);
    }

    #[test]
    fn test_encode_null_params_is_omitted() {
        let Frame::Text(json) = encode_command(1, "Page.enable", Some(Value::Null), None).unwrap() else {
            panic!("expected a text frame");
        };
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_encode_keeps_empty_params_and_session() {
        let Frame::Text(json) =
            encode_command(1, "Network.enable", Some(json!({})), Some("S-1")).unwrap()
        else {
            panic!("expected a text frame");
        };
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, json!({"id": 1, "method": "Network.enable", "params": {}, "sessionId": "S-1"}));
    }

    #[test]
    fn test_decode_success_response() {
        let message = decode_frame(&text(json!({"id": 1, "result": {}}))).unwrap();
        assert_eq!(
            message,
            InboundMessage::Response(ResponseEnvelope {
                id: 1,
                outcome: Ok(json!({})),
                session_id: None,
            })
        );
    }

    #[test]
    fn test_decode_error_response() {
        let message = decode_frame(&text(json!({
            "id": 2,
            "error": {"code": -32000, "message": "Invalid URL"}
        })))
        .unwrap();

        let InboundMessage::Response(response) = message else {
            panic!("expected a response");
        };
        let err = response.outcome.unwrap_err();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "Invalid URL");
        assert!(err.data.is_none());
    }

    #[test]
    fn test_decode_event_with_session() {
        let message = decode_frame(&text(json!({
            "method": "Page.frameStartedLoading",
            "params": {"frameId": "abc"},
            "sessionId": "S-9"
        })))
        .unwrap();

        assert_eq!(
            message,
            InboundMessage::Event(EventEnvelope {
                method: "Page.frameStartedLoading".to_string(),
                params: Some(json!({"frameId": "abc"})),
                session_id: Some("S-9".to_string()),
            })
        );
    }

    #[test]
    fn test_decode_binary_frame() {
        let frame = Frame::Binary(bytes::Bytes::from_static(br#"{"method":"Page.loadEventFired"}"#));
        assert!(matches!(decode_frame(&frame).unwrap(), InboundMessage::Event(e) if e.params.is_none()));
    }

    #[test]
    fn test_decode_malformed_response_keeps_id() {
        let message = decode_frame(&text(json!({"id": 5, "error": {"oops": true}}))).unwrap();
        assert!(matches!(message, InboundMessage::MalformedResponse { id: 5, .. }));

        let message = decode_frame(&text(json!({"id": 6}))).unwrap();
        assert!(matches!(message, InboundMessage::MalformedResponse { id: 6, .. }));
    }

    #[test]
    fn test_decode_rejects_unrecognized_frames() {
        assert!(matches!(decode_frame(&Frame::Text("not json".into())), Err(Error::Protocol(_))));
        assert!(matches!(decode_frame(&text(json!([1, 2]))), Err(Error::Protocol(_))));
        assert!(matches!(decode_frame(&text(json!({"params": {}}))), Err(Error::Protocol(_))));
        assert!(matches!(decode_frame(&text(json!({"id": "x", "result": {}}))), Err(Error::Protocol(_))));
        assert!(matches!(decode_frame(&text(json!({"method": 3}))), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let preview = preview(&Frame::Text(long));
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= PREVIEW_LEN + 3);
    }
}
