// Wire format shared by the server-side registry and the stream consumer.
//
// Each event travels as one `data: <JSON>` line. Anything that is not a data
// line (blank separators, `:keep-alive` comments) is tolerated and skipped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shop_models::{OrderSnapshot, ORDER_STATUS_UPDATED};

use crate::error::Result;

pub const DATA_PREFIX: &str = "data:";
pub const KEEP_ALIVE_TEXT: &str = "keep-alive";
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Serializes `payload` into the single-line JSON carried by one event.
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    Ok(serde_json::to_string(payload)?)
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    order: Option<Value>,
}

#[derive(Debug)]
pub enum LineOutcome {
    /// Not a data line, or a data line with nothing after the prefix.
    Skipped,
    /// Data line whose payload is not a JSON event envelope.
    Malformed(serde_json::Error),
    /// Well-formed event of a kind this consumer does not handle.
    Ignored { kind: String },
    Update(OrderSnapshot),
}

pub fn parse_line(line: &str) -> LineOutcome {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Skipped;
    };
    let payload = rest.trim();
    if payload.is_empty() {
        return LineOutcome::Skipped;
    }

    let envelope: Envelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(e) => return LineOutcome::Malformed(e),
    };

    match envelope.order {
        Some(order) if envelope.kind == ORDER_STATUS_UPDATED && order.is_object() => {
            LineOutcome::Update(OrderSnapshot::from_value(order))
        }
        _ => LineOutcome::Ignored {
            kind: envelope.kind,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shop_models::OrderEvent;

    #[test]
    fn test_encoded_payload_fits_one_data_line() {
        let event = OrderEvent::OrderStatusUpdated {
            order: OrderSnapshot::from_value(json!({"id": "o1", "notes": "line one\nline two"})),
        };
        let payload = encode_payload(&event).unwrap();

        assert!(!payload.contains('\n'));
        match parse_line(&format!("{DATA_PREFIX} {payload}")) {
            LineOutcome::Update(order) => assert_eq!(order.id(), Some("o1")),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_update_line() {
        let line = r#"data: {"type":"ORDER_STATUS_UPDATED","order":{"id":"X","status":"processing"}}"#;
        match parse_line(line) {
            LineOutcome::Update(order) => {
                assert_eq!(order.id(), Some("X"));
                assert_eq!(order.status(), Some("processing"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_prefix_without_space_is_accepted() {
        let line = r#"data:{"type":"ORDER_STATUS_UPDATED","order":{"id":"X"}}"#;
        assert!(matches!(parse_line(line), LineOutcome::Update(_)));
    }

    #[test]
    fn test_non_data_lines_are_skipped() {
        assert!(matches!(parse_line(""), LineOutcome::Skipped));
        assert!(matches!(parse_line(":keep-alive"), LineOutcome::Skipped));
        assert!(matches!(parse_line("event: order"), LineOutcome::Skipped));
        assert!(matches!(parse_line("data:    "), LineOutcome::Skipped));
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(parse_line("data: not-json"), LineOutcome::Malformed(_)));
        assert!(matches!(parse_line(r#"data: {"order":{}}"#), LineOutcome::Malformed(_)));
    }

    #[test]
    fn test_other_kinds_are_ignored() {
        match parse_line(r#"data: {"type":"SOMETHING_ELSE"}"#) {
            LineOutcome::Ignored { kind } => assert_eq!(kind, "SOMETHING_ELSE"),
            other => panic!("expected ignored, got {other:?}"),
        }
        // right kind, but no order object
        assert!(matches!(
            parse_line(r#"data: {"type":"ORDER_STATUS_UPDATED","order":"o1"}"#),
            LineOutcome::Ignored { .. }
        ));
        assert!(matches!(
            parse_line(r#"data: {"type":"ORDER_STATUS_UPDATED"}"#),
            LineOutcome::Ignored { .. }
        ));
    }
}
