//! Error taxonomy for the client.
//!
//! No variant is retried automatically anywhere in the crate; recovery is
//! always the caller's responsibility. `TimeoutExceeded` is the only soft
//! failure — the session stays usable after it.

use perplexity_protocol::OptionsError;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The long-poll bootstrap failed (non-OK activation or malformed
    /// open packet). Fatal: construction aborts, nothing to retry here.
    #[error("handshake failed: {message}")]
    Handshake {
        /// What went wrong.
        message: String,
    },

    /// Query options failed validation. Local; no frame was sent and the
    /// caller may correct the options and retry.
    #[error("invalid query options: {0}")]
    InvalidQueryOptions(#[from] OptionsError),

    /// The receive loop saw a frame it could not classify, or one that
    /// arrived in a state where it is not allowed. Fatal for the session:
    /// the caller should re-establish it.
    #[error("unhandled frame: {message}")]
    UnhandledFrame {
        /// Decode/classification failure description.
        message: String,
    },

    /// The wall-clock budget for a query expired. The state machine was
    /// reset to idle (the server-side query is abandoned, not cancelled)
    /// and the session remains usable.
    #[error("query timed out after {timeout_ms}ms")]
    TimeoutExceeded {
        /// The budget that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// The server refused to issue an upload ticket. Back off and retry
    /// later.
    #[error("upload rate limited")]
    RateLimited,

    /// A query was issued while another was still in flight.
    #[error("a query is already in flight")]
    QueryInFlight,

    /// The query cycle completed without leaving a response payload in
    /// the queue.
    #[error("query completed without a response payload")]
    MissingResponse,

    /// Attachment extension/content type outside txt, pdf, jpg, png.
    #[error("unsupported attachment type: {extension}")]
    UnsupportedAttachment {
        /// The offending extension or MIME type.
        extension: String,
    },

    /// Attachment source could not be read or parsed.
    #[error("invalid attachment source: {message}")]
    InvalidAttachment {
        /// What went wrong.
        message: String,
    },

    /// The multipart upload itself failed.
    #[error("upload failed: {message}")]
    UploadFailed {
        /// What went wrong.
        message: String,
    },

    /// Bad configuration (unparseable base URL, bad header value).
    #[error("invalid configuration: {message}")]
    Config {
        /// What went wrong.
        message: String,
    },

    /// The socket session's outbound channel is gone.
    #[error("socket session closed")]
    SocketClosed,

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failure outside the frame codec.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Local filesystem failure while reading an attachment.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Error category string for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::InvalidQueryOptions(_) => "validation",
            Self::UnhandledFrame { .. } => "protocol",
            Self::TimeoutExceeded { .. } => "timeout",
            Self::RateLimited => "rate_limit",
            Self::QueryInFlight | Self::MissingResponse => "lifecycle",
            Self::UnsupportedAttachment { .. }
            | Self::InvalidAttachment { .. }
            | Self::UploadFailed { .. } => "upload",
            Self::Config { .. } => "config",
            Self::SocketClosed | Self::WebSocket(_) => "socket",
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Io(_) => "io",
        }
    }

    /// Whether the session can keep being used after this error.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::TimeoutExceeded { .. }
                | Self::InvalidQueryOptions(_)
                | Self::QueryInFlight
                | Self::RateLimited
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_error_converts_to_validation() {
        let err: ClientError = OptionsError::PageDomainConflict.into();
        assert_eq!(err.category(), "validation");
        assert!(err.is_soft());
    }

    #[test]
    fn timeout_is_soft() {
        let err = ClientError::TimeoutExceeded { timeout_ms: 500 };
        assert!(err.is_soft());
        assert_eq!(err.to_string(), "query timed out after 500ms");
    }

    #[test]
    fn unhandled_frame_is_fatal() {
        let err = ClientError::UnhandledFrame {
            message: "garbage".into(),
        };
        assert!(!err.is_soft());
        assert_eq!(err.category(), "protocol");
    }
}
