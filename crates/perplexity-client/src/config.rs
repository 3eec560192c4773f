//! Client configuration: endpoints and the device identity headers.

/// Default service base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.perplexity.ai";

/// Engine.IO protocol version pinned by the dialect.
const EIO_VERSION: &str = "4";

/// Fixed device/user-agent identity sent on every HTTP request and on the
/// WebSocket upgrade.
#[derive(Clone, Debug)]
pub struct Identity {
    /// `User-Agent` header value.
    pub user_agent: String,
    /// `X-Client-Name` header value.
    pub client_name: String,
    /// `X-App-ApiClient` header value.
    pub api_client: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            user_agent: "Ask/2.9.1/2406 (iOS; iPhone; Version 17.1) isiOSOnMac/false".to_owned(),
            client_name: "Perplexity-iOS".to_owned(),
            api_client: "ios".to_owned(),
        }
    }
}

/// Configuration for [`crate::Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// HTTP(S) base URL.
    pub base_url: String,
    /// WebSocket base URL override. When `None`, derived from `base_url`
    /// by swapping the scheme (`https` → `wss`, `http` → `ws`).
    pub socket_base_url: Option<String>,
    /// Device identity headers.
    pub identity: Identity,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            socket_base_url: None,
            identity: Identity::default(),
        }
    }
}

impl ClientConfig {
    /// Long-poll bootstrap URL for a given poll token.
    pub fn polling_url(&self, token: &str) -> String {
        format!(
            "{}/socket.io/?EIO={EIO_VERSION}&transport=polling&t={token}",
            self.base_url
        )
    }

    /// Bootstrap URL with the negotiated `sid` appended, used for the
    /// anonymous-user activation POST.
    pub fn polling_url_with_sid(&self, token: &str, sid: &str) -> String {
        format!("{}&sid={sid}", self.polling_url(token))
    }

    /// WebSocket upgrade URL for the negotiated `sid`.
    pub fn websocket_url(&self, sid: &str) -> String {
        let base = self
            .socket_base_url
            .clone()
            .unwrap_or_else(|| websocket_scheme(&self.base_url));
        format!("{base}/socket.io/?EIO={EIO_VERSION}&transport=websocket&sid={sid}")
    }

    /// Anonymous session warm-up URL.
    pub fn warmup_url(&self, id: &str) -> String {
        format!("{}/search/{id}", self.base_url)
    }

    /// Session-cookie refresh endpoint.
    pub fn auth_session_url(&self) -> String {
        format!("{}/api/auth/session", self.base_url)
    }
}

/// Swap an HTTP(S) scheme for its WebSocket counterpart.
fn websocket_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_owned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_url_carries_token() {
        let config = ClientConfig::default();
        assert_eq!(
            config.polling_url("deadbeef"),
            "https://www.perplexity.ai/socket.io/?EIO=4&transport=polling&t=deadbeef"
        );
    }

    #[test]
    fn activation_url_appends_sid() {
        let config = ClientConfig::default();
        let url = config.polling_url_with_sid("deadbeef", "sid-1");
        assert!(url.ends_with("&t=deadbeef&sid=sid-1"));
    }

    #[test]
    fn websocket_url_swaps_scheme() {
        let config = ClientConfig::default();
        assert_eq!(
            config.websocket_url("sid-1"),
            "wss://www.perplexity.ai/socket.io/?EIO=4&transport=websocket&sid=sid-1"
        );
    }

    #[test]
    fn websocket_url_http_becomes_ws() {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9000".into(),
            ..ClientConfig::default()
        };
        assert!(config.websocket_url("s").starts_with("ws://127.0.0.1:9000/"));
    }

    #[test]
    fn websocket_url_honors_override() {
        let config = ClientConfig {
            socket_base_url: Some("ws://127.0.0.1:4444".into()),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.websocket_url("sid-9"),
            "ws://127.0.0.1:4444/socket.io/?EIO=4&transport=websocket&sid=sid-9"
        );
    }

    #[test]
    fn default_identity_triple() {
        let identity = Identity::default();
        assert!(identity.user_agent.starts_with("Ask/"));
        assert_eq!(identity.client_name, "Perplexity-iOS");
        assert_eq!(identity.api_client, "ios");
    }

    #[test]
    fn warmup_and_auth_urls() {
        let config = ClientConfig::default();
        assert_eq!(
            config.warmup_url("abc"),
            "https://www.perplexity.ai/search/abc"
        );
        assert_eq!(
            config.auth_session_url(),
            "https://www.perplexity.ai/api/auth/session"
        );
    }
}
