//! Long-poll bootstrap: negotiate a `sid` and activate the anonymous user.

use serde::Deserialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Socket.io message activating the anonymous user on the fresh session.
const ANON_ACTIVATION_BODY: &str = "40{\"jwt\":\"anonymous-ask-user\"}";

/// Cache-busting token for the polling URLs: eight lowercase hex digits.
pub(crate) fn poll_token() -> String {
    format!("{:08x}", rand::random::<u32>())
}

/// Payload of the engine.io open packet, after the type byte is stripped.
#[derive(Debug, Deserialize)]
struct OpenPacket {
    sid: String,
}

/// What the bootstrap hands to the rest of the client.
#[derive(Debug)]
pub(crate) struct HandshakeOutcome {
    /// Negotiated session id, reused verbatim on the WebSocket upgrade.
    pub sid: String,
    /// The token the whole exchange was performed under.
    pub poll_token: String,
}

/// Run the two-step bootstrap: GET for the open packet, POST to activate.
pub(crate) async fn negotiate(
    http: &reqwest::Client,
    config: &ClientConfig,
) -> Result<HandshakeOutcome> {
    let poll_token = poll_token();

    let body = http
        .get(config.polling_url(&poll_token))
        .send()
        .await?
        .text()
        .await?;
    // First byte is the engine.io packet type; the rest is the JSON payload.
    let payload = body.get(1..).ok_or_else(|| ClientError::Handshake {
        message: "empty open packet".to_owned(),
    })?;
    let open: OpenPacket =
        serde_json::from_str(payload).map_err(|e| ClientError::Handshake {
            message: format!("malformed open packet: {e}"),
        })?;
    debug!(sid = %open.sid, "session negotiated");

    let ack = http
        .post(config.polling_url_with_sid(&poll_token, &open.sid))
        .body(ANON_ACTIVATION_BODY)
        .send()
        .await?
        .text()
        .await?;
    if ack != "OK" {
        return Err(ClientError::Handshake {
            message: format!("activation rejected: {ack:?}"),
        });
    }

    Ok(HandshakeOutcome {
        sid: open.sid,
        poll_token,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
