//! Typed payload envelopes for `Pending` and `Response` frames.
//!
//! The server sends loosely-shaped JSON objects; the fields the session
//! lifecycle depends on (`uuid`, `final`, `status`, `text`) are lifted into
//! struct fields and everything else is kept in a flattened remainder map.
//!
//! The `text` field is double-encoded on the wire: the envelope is JSON and
//! `text` inside it is itself a JSON-encoded string. [`QueryUpdate::from_value`]
//! decodes it exactly one extra level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One decoded partial or final result for a query cycle.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryUpdate {
    /// Backend identity of the answer this update belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Whether the server marked this update terminal.
    #[serde(default, rename = "final", skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,

    /// Server-side status string (`"pending"`, `"completed"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Answer body. Arrives as a JSON-encoded string and is stored decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,

    /// Everything else the server included, untouched.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl QueryUpdate {
    /// Decode an update from a raw frame payload.
    ///
    /// Applies the double-decode rule: when `text` is a JSON string it is
    /// parsed one more level. A `text` that is already structured (or
    /// absent) passes through unchanged.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut update: Self = serde_json::from_value(value)?;
        update.text = match update.text.take() {
            Some(Value::String(inner)) => Some(serde_json::from_str(&inner)?),
            other => other,
        };
        Ok(update)
    }

    /// Whether the server marked this update terminal.
    pub fn is_final(&self) -> bool {
        self.is_final == Some(true)
    }

    /// Whether the status string is `"completed"`.
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }

    /// Reassemble the full JSON object (inverse of [`Self::from_value`],
    /// minus the text re-encoding — `text` stays structured).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Signed upload destination returned by a `get_upload_url` query.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct UploadTicket {
    /// Server refused to issue a ticket; caller must back off.
    pub rate_limited: bool,
    /// Direct upload URL.
    #[serde(default)]
    pub url: String,
    /// Form fields to send alongside the file blob.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl UploadTicket {
    /// Extract a ticket from the update that answered the upload query.
    pub fn from_update(update: &QueryUpdate) -> Result<Self, serde_json::Error> {
        serde_json::from_value(update.to_value())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── QueryUpdate::from_value ──────────────────────────────────────────

    #[test]
    fn double_encoded_text_is_decoded_one_extra_level() {
        let raw = json!({
            "status": "pending",
            "text": "{\"answer\":\"Paris\"}",
        });
        let update = QueryUpdate::from_value(raw).unwrap();
        assert_eq!(update.text, Some(json!({"answer": "Paris"})));
    }

    #[test]
    fn structured_text_passes_through() {
        let raw = json!({"text": {"answer": "Paris"}});
        let update = QueryUpdate::from_value(raw).unwrap();
        assert_eq!(update.text, Some(json!({"answer": "Paris"})));
    }

    #[test]
    fn missing_text_stays_none() {
        let update = QueryUpdate::from_value(json!({"status": "pending"})).unwrap();
        assert!(update.text.is_none());
    }

    #[test]
    fn malformed_inner_text_is_a_decode_error() {
        let raw = json!({"text": "{not json"});
        assert!(QueryUpdate::from_value(raw).is_err());
    }

    #[test]
    fn known_fields_are_lifted() {
        let raw = json!({
            "uuid": "u-1",
            "final": true,
            "status": "completed",
            "mode": "concise",
        });
        let update = QueryUpdate::from_value(raw).unwrap();
        assert_eq!(update.uuid.as_deref(), Some("u-1"));
        assert!(update.is_final());
        assert!(update.is_completed());
        assert_eq!(update.rest["mode"], "concise");
    }

    #[test]
    fn final_defaults_to_not_terminal() {
        let update = QueryUpdate::from_value(json!({})).unwrap();
        assert!(!update.is_final());
        assert!(!update.is_completed());
    }

    // ── to_value round trip ──────────────────────────────────────────────

    #[test]
    fn to_value_preserves_rest_and_renames_final() {
        let update = QueryUpdate::from_value(json!({
            "final": false,
            "rate_limited": true,
        }))
        .unwrap();
        let value = update.to_value();
        assert_eq!(value["final"], false);
        assert_eq!(value["rate_limited"], true);
    }

    // ── UploadTicket ─────────────────────────────────────────────────────

    #[test]
    fn ticket_from_update() {
        let update = QueryUpdate::from_value(json!({
            "rate_limited": false,
            "url": "https://uploads.example/sign",
            "fields": {"key": "abc", "policy": "xyz"},
        }))
        .unwrap();
        let ticket = UploadTicket::from_update(&update).unwrap();
        assert!(!ticket.rate_limited);
        assert_eq!(ticket.url, "https://uploads.example/sign");
        assert_eq!(ticket.fields["key"], "abc");
        assert_eq!(ticket.fields["policy"], "xyz");
    }

    #[test]
    fn ticket_requires_rate_limited_flag() {
        let update = QueryUpdate::from_value(json!({"url": "https://x"})).unwrap();
        assert!(UploadTicket::from_update(&update).is_err());
    }

    #[test]
    fn rate_limited_ticket_may_omit_url() {
        let update = QueryUpdate::from_value(json!({"rate_limited": true})).unwrap();
        let ticket = UploadTicket::from_update(&update).unwrap();
        assert!(ticket.rate_limited);
        assert!(ticket.url.is_empty());
        assert!(ticket.fields.is_empty());
    }
}
