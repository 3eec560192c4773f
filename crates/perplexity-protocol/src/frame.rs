//! Frame codec for the socket.io-style wire dialect.
//!
//! A frame is a leading opcode token followed by an optional JSON body.
//! Server frames are classified by their leading characters:
//!
//! | prefix        | meaning                                            |
//! |---------------|----------------------------------------------------|
//! | `2` (exact)   | ping — reply with pong (`3`)                       |
//! | `3probe`      | ping-ack probe — reply with pong-ack (`5`)         |
//! | `40`          | anonymous-user acknowledgement (ignored post-handshake) |
//! | `6`           | noop (ignored)                                     |
//! | `42`          | pending update: `["<event>", <content>]`           |
//! | `43<seq>`     | terminal response: `[<payload>, ...]`, tag must match the in-flight sequence number |
//!
//! Anything else is [`FrameError::Unhandled`] — fatal for the receive loop
//! that saw it, not for the process.

use serde_json::Value;

use crate::payload::QueryUpdate;

/// Server ping, answered with [`ClientFrame::Pong`].
const SERVER_PING: &str = "2";
/// Server probe acknowledgement, answered with [`ClientFrame::PongAck`].
const SERVER_PING_ACK_PROBE: &str = "3probe";
/// Anonymous-user activation acknowledgement.
const SERVER_ANON_ACK: &str = "40";
/// Opcode the vendor sends for messages the client never acts on.
const SERVER_NOOP: &str = "6";
/// Progress-channel updates.
const SERVER_PENDING: &str = "42";
/// Terminal response channel; the full tag carries the sequence number.
const SERVER_RESPONSE: &str = "43";

/// Longest frame prefix echoed back in error messages.
const PREVIEW_BYTES: usize = 96;

/// Decoding failures. All variants are fatal for the frame that produced
/// them; `Unhandled` additionally marks the session unreliable.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Frame body was not valid JSON (including a malformed double-encoded
    /// `text` field).
    #[error("malformed frame body: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame did not match any known classification.
    #[error("unhandled frame: {preview}")]
    Unhandled {
        /// Truncated copy of the offending frame.
        preview: String,
    },

    /// A pending frame carried an event name outside the query lifecycle.
    #[error("unexpected pending event: {event}")]
    UnexpectedEvent {
        /// The event name the server sent.
        event: String,
    },
}

/// Event name on the `Pending` progress channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingEvent {
    /// Incremental progress for the in-flight query.
    QueryProgress,
    /// The query was answered on the progress channel; the cycle is done.
    QueryAnswered,
}

/// A decoded inbound frame.
#[derive(Debug)]
pub enum ServerFrame {
    /// Keepalive ping.
    Ping,
    /// Greeting-ritual probe acknowledgement.
    PingAckProbe,
    /// Anonymous-user activation acknowledgement.
    AnonAck,
    /// Frame the protocol says to ignore.
    Ignored,
    /// Progress-channel update for the in-flight query.
    Pending {
        /// Which lifecycle event this update announces.
        event: PendingEvent,
        /// The decoded payload.
        update: QueryUpdate,
    },
    /// Terminal response whose tag matched the in-flight sequence number.
    Response {
        /// The decoded payload.
        update: QueryUpdate,
    },
}

/// An outbound frame. Only the tags this client actually sends.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientFrame {
    /// Opening-ritual probe (`2probe`), sent immediately after the upgrade.
    ProbePing,
    /// Reply to a server ping (`3`).
    Pong,
    /// Reply to a probe acknowledgement (`5`), also part of the greeting.
    PongAck,
    /// A query tagged with its sequence number (`42<seq>` + JSON array).
    Query {
        /// Sequence number for this connection, unique per query.
        seq: u64,
        /// The JSON array payload (`["perplexity_ask", ...]` et al.).
        body: Value,
    },
}

impl ClientFrame {
    /// Encode to the wire representation.
    pub fn encode(&self) -> String {
        match self {
            Self::ProbePing => "2probe".to_owned(),
            Self::Pong => "3".to_owned(),
            Self::PongAck => "5".to_owned(),
            Self::Query { seq, body } => format!("42{seq}{body}"),
        }
    }
}

/// Classify one inbound frame.
///
/// `expected_seq` is the sequence number of the in-flight query; a `43`
/// frame whose tag does not match it is unhandled, exactly like any other
/// unclassifiable input.
pub fn decode_server_frame(raw: &str, expected_seq: u64) -> Result<ServerFrame, FrameError> {
    if raw == SERVER_PING {
        return Ok(ServerFrame::Ping);
    }
    if raw == SERVER_PING_ACK_PROBE {
        return Ok(ServerFrame::PingAckProbe);
    }
    if raw.starts_with(SERVER_ANON_ACK) {
        return Ok(ServerFrame::AnonAck);
    }
    if raw.starts_with(SERVER_NOOP) {
        return Ok(ServerFrame::Ignored);
    }
    if let Some(body) = raw.strip_prefix(SERVER_PENDING) {
        if !body.starts_with('[') {
            // "42" followed by anything but a JSON array is outside the
            // pending channel; let the response/unhandled path judge it.
            return decode_response(raw, expected_seq);
        }
        let (event, content): (String, Value) = serde_json::from_str(body)?;
        let event = match event.as_str() {
            "query_progress" => PendingEvent::QueryProgress,
            "query_answered" => PendingEvent::QueryAnswered,
            _ => return Err(FrameError::UnexpectedEvent { event }),
        };
        let update = QueryUpdate::from_value(content)?;
        return Ok(ServerFrame::Pending { event, update });
    }
    decode_response(raw, expected_seq)
}

fn decode_response(raw: &str, expected_seq: u64) -> Result<ServerFrame, FrameError> {
    let tag = format!("{SERVER_RESPONSE}{expected_seq}");
    if let Some(body) = raw.strip_prefix(&tag) {
        let mut items: Vec<Value> = serde_json::from_str(body)?;
        if items.is_empty() {
            return Err(FrameError::Unhandled {
                preview: preview(raw),
            });
        }
        let update = QueryUpdate::from_value(items.remove(0))?;
        return Ok(ServerFrame::Response { update });
    }
    Err(FrameError::Unhandled {
        preview: preview(raw),
    })
}

/// Truncate a frame for error messages, honoring char boundaries.
fn preview(raw: &str) -> String {
    let mut end = PREVIEW_BYTES.min(raw.len());
    while end > 0 && !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    // ── control frames ───────────────────────────────────────────────────

    #[test]
    fn decode_ping() {
        assert_matches!(decode_server_frame("2", 0), Ok(ServerFrame::Ping));
    }

    #[test]
    fn decode_probe_ack() {
        assert_matches!(decode_server_frame("3probe", 0), Ok(ServerFrame::PingAckProbe));
    }

    #[test]
    fn bare_pong_is_unhandled() {
        // "3" without the probe suffix is not part of the dialect.
        assert_matches!(
            decode_server_frame("3", 0),
            Err(FrameError::Unhandled { .. })
        );
    }

    #[test]
    fn decode_anon_ack_with_body() {
        assert_matches!(
            decode_server_frame(r#"40{"sid":"xyz"}"#, 0),
            Ok(ServerFrame::AnonAck)
        );
    }

    #[test]
    fn decode_noop() {
        assert_matches!(decode_server_frame("6", 0), Ok(ServerFrame::Ignored));
        assert_matches!(decode_server_frame("6abc", 0), Ok(ServerFrame::Ignored));
    }

    // ── pending channel ──────────────────────────────────────────────────

    #[test]
    fn decode_pending_progress() {
        let raw = r#"42["query_progress",{"status":"pending","text":"{\"answer\":\"Par\"}"}]"#;
        let frame = decode_server_frame(raw, 0).unwrap();
        let ServerFrame::Pending { event, update } = frame else {
            panic!("expected Pending, got {frame:?}");
        };
        assert_eq!(event, PendingEvent::QueryProgress);
        assert_eq!(update.status.as_deref(), Some("pending"));
        // Double-decode: the text field arrived as a JSON string.
        assert_eq!(update.text, Some(json!({"answer": "Par"})));
    }

    #[test]
    fn decode_pending_answered() {
        let raw = r#"42["query_answered",{"uuid":"u-9","status":"completed"}]"#;
        let frame = decode_server_frame(raw, 3).unwrap();
        assert_matches!(
            frame,
            ServerFrame::Pending {
                event: PendingEvent::QueryAnswered,
                ..
            }
        );
    }

    #[test]
    fn pending_with_foreign_event_is_rejected() {
        let raw = r#"42["unrelated_event",{}]"#;
        assert_matches!(
            decode_server_frame(raw, 0),
            Err(FrameError::UnexpectedEvent { event }) if event == "unrelated_event"
        );
    }

    #[test]
    fn pending_with_malformed_json_is_a_decode_error() {
        assert_matches!(
            decode_server_frame("42[\"query_progress\",{", 0),
            Err(FrameError::Json(_))
        );
    }

    // ── response channel ─────────────────────────────────────────────────

    #[test]
    fn decode_response_with_matching_tag() {
        let raw = r#"430[{"uuid":"u-1","status":"completed","text":"{\"answer\":\"Paris\"}"}]"#;
        let frame = decode_server_frame(raw, 0).unwrap();
        let ServerFrame::Response { update } = frame else {
            panic!("expected Response, got {frame:?}");
        };
        assert_eq!(update.uuid.as_deref(), Some("u-1"));
        assert_eq!(update.text, Some(json!({"answer": "Paris"})));
    }

    #[test]
    fn response_with_wrong_tag_is_unhandled() {
        let raw = r#"437[{"uuid":"u-1"}]"#;
        assert_matches!(
            decode_server_frame(raw, 0),
            Err(FrameError::Unhandled { .. })
        );
    }

    #[test]
    fn response_with_multidigit_tag() {
        let raw = r#"4312[{"uuid":"u-2"}]"#;
        assert_matches!(
            decode_server_frame(raw, 12),
            Ok(ServerFrame::Response { .. })
        );
    }

    #[test]
    fn response_with_empty_array_is_unhandled() {
        assert_matches!(
            decode_server_frame("430[]", 0),
            Err(FrameError::Unhandled { .. })
        );
    }

    #[test]
    fn response_takes_first_element_only() {
        let raw = r#"430[{"uuid":"first"},{"uuid":"second"}]"#;
        let frame = decode_server_frame(raw, 0).unwrap();
        let ServerFrame::Response { update } = frame else {
            panic!("expected Response");
        };
        assert_eq!(update.uuid.as_deref(), Some("first"));
    }

    // ── unclassifiable input ─────────────────────────────────────────────

    #[test]
    fn garbage_is_unhandled_with_preview() {
        let err = decode_server_frame("9zzz", 0).unwrap_err();
        assert_matches!(err, FrameError::Unhandled { preview } if preview == "9zzz");
    }

    #[test]
    fn long_garbage_preview_is_truncated() {
        let raw = "9".repeat(500);
        let err = decode_server_frame(&raw, 0).unwrap_err();
        let FrameError::Unhandled { preview } = err else {
            panic!("expected Unhandled");
        };
        assert!(preview.len() <= 96);
    }

    // ── client frames ────────────────────────────────────────────────────

    #[test]
    fn encode_control_frames() {
        assert_eq!(ClientFrame::ProbePing.encode(), "2probe");
        assert_eq!(ClientFrame::Pong.encode(), "3");
        assert_eq!(ClientFrame::PongAck.encode(), "5");
    }

    #[test]
    fn encode_query_frame_carries_sequence_tag() {
        let frame = ClientFrame::Query {
            seq: 0,
            body: json!(["perplexity_ask", "capital of France"]),
        };
        let wire = frame.encode();
        assert!(wire.starts_with("420["), "got: {wire}");
        assert!(wire.contains("perplexity_ask"));
    }

    #[test]
    fn encode_query_frame_multidigit_seq() {
        let frame = ClientFrame::Query {
            seq: 17,
            body: json!(["get_upload_url"]),
        };
        assert!(frame.encode().starts_with("4217["));
    }
}
