//! Protocol messages and their JSON wire form.
//!
//! Every message travels as one JSON record with a `type` discriminator:
//!
//! ```text
//! {"type":"sync_req"}
//! {"type":"sync_rep","status":true}
//! {"type":"run"}
//! {"type":"report","count":2,"payload":{...}}
//! {"type":"send_report"} / {"type":"received"}
//! {"type":"telemetry","payload":{...}}
//! {"type":"ack"}
//! ```

use crate::error::LinkError;
use serde::{Deserialize, Serialize};

/// Opaque simulation telemetry. Relayed as-is, never inspected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(serde_json::Value);

impl Payload {
    /// Wraps a JSON value.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Serializes any value into a payload.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, LinkError> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// Returns the underlying JSON value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consumes the payload, returning the JSON value.
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// A message exchanged between the coordinator and a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMessage", into = "WireMessage")]
pub enum Message {
    /// Coordinator → broadcast: asks every client to declare readiness.
    SyncRequest,

    /// Client → coordinator: readiness answer to a `SyncRequest`.
    SyncReply { ready: bool },

    /// Coordinator → broadcast: execute one simulation step.
    Run,

    /// Client → coordinator: one part of a report burst.
    ///
    /// `remaining` counts the parts still to come; the last part carries 0.
    Report { remaining: u32, payload: Payload },

    /// Coordinator → client: acknowledges a `Report` part.
    ReportAck { want_more: bool },

    /// Coordinator → broadcast: a relayed report payload.
    Telemetry { payload: Payload },

    /// Coordinator → client: bare acknowledgement for any other request.
    Ack,
}

impl Message {
    /// Returns the wire `type` name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::SyncRequest => "sync_req",
            Message::SyncReply { .. } => "sync_rep",
            Message::Run => "run",
            Message::Report { .. } => "report",
            Message::ReportAck { want_more: true } => "send_report",
            Message::ReportAck { want_more: false } => "received",
            Message::Telemetry { .. } => "telemetry",
            Message::Ack => "ack",
        }
    }
}

/// The flat wire vocabulary. `ReportAck` splits into two record types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WireMessage {
    #[serde(rename = "sync_req")]
    SyncReq,
    #[serde(rename = "sync_rep")]
    SyncRep { status: bool },
    #[serde(rename = "run")]
    Run,
    #[serde(rename = "report")]
    Report { count: u32, payload: Payload },
    #[serde(rename = "send_report")]
    SendReport,
    #[serde(rename = "received")]
    Received,
    #[serde(rename = "telemetry")]
    Telemetry { payload: Payload },
    #[serde(rename = "ack")]
    Ack,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        match wire {
            WireMessage::SyncReq => Message::SyncRequest,
            WireMessage::SyncRep { status } => Message::SyncReply { ready: status },
            WireMessage::Run => Message::Run,
            WireMessage::Report { count, payload } => Message::Report {
                remaining: count,
                payload,
            },
            WireMessage::SendReport => Message::ReportAck { want_more: true },
            WireMessage::Received => Message::ReportAck { want_more: false },
            WireMessage::Telemetry { payload } => Message::Telemetry { payload },
            WireMessage::Ack => Message::Ack,
        }
    }
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::SyncRequest => WireMessage::SyncReq,
            Message::SyncReply { ready } => WireMessage::SyncRep { status: ready },
            Message::Run => WireMessage::Run,
            Message::Report { remaining, payload } => WireMessage::Report {
                count: remaining,
                payload,
            },
            Message::ReportAck { want_more: true } => WireMessage::SendReport,
            Message::ReportAck { want_more: false } => WireMessage::Received,
            Message::Telemetry { payload } => WireMessage::Telemetry { payload },
            Message::Ack => WireMessage::Ack,
        }
    }
}

/// Encodes a message as a JSON record.
pub fn encode(message: &Message) -> Result<Vec<u8>, LinkError> {
    Ok(serde_json::to_vec(message)?)
}

/// Decodes a JSON record into a message.
///
/// An empty record `{}` is read as `Ack`; older coordinators acknowledge
/// sync replies that way.
pub fn decode(bytes: &[u8]) -> Result<Message, LinkError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    if value.as_object().is_some_and(|fields| fields.is_empty()) {
        return Ok(Message::Ack);
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_str(text: &str) -> Result<Message, LinkError> {
        decode(text.as_bytes())
    }

    #[test]
    fn test_control_messages_wire_form() {
        let sync = encode(&Message::SyncRequest).unwrap();
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&sync).unwrap(), json!({"type": "sync_req"}));

        let run = encode(&Message::Run).unwrap();
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&run).unwrap(), json!({"type": "run"}));
    }

    #[test]
    fn test_report_uses_count_field() {
        let report = Message::Report {
            remaining: 2,
            payload: Payload::new(json!({"name": "ownship", "time": 0.5})),
        };
        let value: serde_json::Value = serde_json::from_slice(&encode(&report).unwrap()).unwrap();

        assert_eq!(value["type"], "report");
        assert_eq!(value["count"], 2);
        assert_eq!(value["payload"]["name"], "ownship");
    }

    #[test]
    fn test_report_ack_maps_to_two_record_types() {
        assert_eq!(decode_str(r#"{"type":"send_report"}"#).unwrap(), Message::ReportAck { want_more: true });
        assert_eq!(decode_str(r#"{"type":"received"}"#).unwrap(), Message::ReportAck { want_more: false });
        assert_eq!(Message::ReportAck { want_more: true }.kind(), "send_report");
    }

    #[test]
    fn test_sync_reply_status_field() {
        let decoded = decode_str(r#"{"type":"sync_rep","status":false}"#).unwrap();
        assert_eq!(decoded, Message::SyncReply { ready: false });
    }

    #[test]
    fn test_empty_record_is_ack() {
        assert_eq!(decode_str("{}").unwrap(), Message::Ack);
    }

    #[test]
    fn test_telemetry_payload_is_untouched() {
        let raw = r#"{"type":"telemetry","payload":[1,"two",{"three":3.0},null]}"#;
        match decode_str(raw).unwrap() {
            Message::Telemetry { payload } => {
                assert_eq!(payload.as_value(), &json!([1, "two", {"three": 3.0}, null]));
            }
            other => panic!("expected telemetry, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_codec_error() {
        let err = decode_str(r#"{"type":"stop"}"#).unwrap_err();
        assert!(matches!(err, LinkError::Codec(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_malformed_json_is_codec_error() {
        assert!(matches!(decode_str("{\"type\":"), Err(LinkError::Codec(_))));
        assert!(matches!(decode_str(r#"{"type":"report","count":-1,"payload":1}"#), Err(LinkError::Codec(_))));
    }
}
