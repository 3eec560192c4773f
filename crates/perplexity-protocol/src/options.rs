//! Query options, validation, and outbound payload builders.
//!
//! `mode` and `search_focus` are enums so invalid values are
//! unrepresentable; the remaining constraints (attachment count, follow-up
//! rules, the `in_page`/`in_domain` exclusivity) are checked by
//! [`AskOptions::validate`] before anything touches the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// Vendor protocol version sent with every query payload.
pub const PROTOCOL_VERSION: &str = "2.13";

/// Source identifier sent with every query payload.
pub const QUERY_SOURCE: &str = "default";

/// Maximum number of attachments per query.
pub const MAX_ATTACHMENTS: usize = 4;

/// Answer mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Short direct answer.
    #[default]
    Concise,
    /// Guided multi-step answer.
    Copilot,
}

impl Mode {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Concise => "concise",
            Self::Copilot => "copilot",
        }
    }
}

/// Search focus for a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchFocus {
    /// General web search.
    #[default]
    Internet,
    /// Academic sources.
    Scholar,
    /// No search, writing assistance only.
    Writing,
    /// Wolfram|Alpha computation.
    Wolfram,
    /// `YouTube` videos.
    Youtube,
    /// Reddit discussions.
    Reddit,
    /// Multi-step reasoning.
    Reasoning,
}

impl SearchFocus {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internet => "internet",
            Self::Scholar => "scholar",
            Self::Writing => "writing",
            Self::Wolfram => "wolfram",
            Self::Youtube => "youtube",
            Self::Reddit => "reddit",
            Self::Reasoning => "reasoning",
        }
    }
}

/// Validation failures. The query is never sent when any of these fire;
/// the caller may correct the options and retry.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    /// More than [`MAX_ATTACHMENTS`] attachments.
    #[error("too many attachments: {count} (max {MAX_ATTACHMENTS})")]
    TooManyAttachments {
        /// How many were supplied.
        count: usize,
    },

    /// Follow-up queries must carry zero attachments.
    #[error("follow-up queries cannot carry attachments")]
    AttachmentsOnFollowUp,

    /// `in_page` and `in_domain` cannot both be set.
    #[error("in_page and in_domain are mutually exclusive")]
    PageDomainConflict,
}

/// Per-query options for the `perplexity_ask` channel.
#[derive(Clone, Debug)]
pub struct AskOptions {
    /// Answer mode.
    pub mode: Mode,
    /// Search focus, overridden when `in_page`/`in_domain` is set.
    pub search_focus: SearchFocus,
    /// Uploaded attachment URLs (max [`MAX_ATTACHMENTS`]).
    pub attachments: Vec<String>,
    /// BCP 47 language tag.
    pub language: String,
    /// IANA timezone name.
    pub timezone: String,
    /// Restrict the query to a single page.
    pub in_page: Option<String>,
    /// Restrict the query to a single domain.
    pub in_domain: Option<String>,
    /// Do not record the query in thread history.
    pub is_incognito: bool,
    /// Backend UUID of the thread this query continues, if any.
    pub follow_up: Option<String>,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            search_focus: SearchFocus::default(),
            attachments: Vec::new(),
            language: "en-GB".to_owned(),
            timezone: "America/Chicago".to_owned(),
            in_page: None,
            in_domain: None,
            is_incognito: false,
            follow_up: None,
        }
    }
}

impl AskOptions {
    /// Check every constraint; nothing is sent when this fails.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.attachments.len() > MAX_ATTACHMENTS {
            return Err(OptionsError::TooManyAttachments {
                count: self.attachments.len(),
            });
        }
        if self.follow_up.is_some() && !self.attachments.is_empty() {
            return Err(OptionsError::AttachmentsOnFollowUp);
        }
        if self.in_page.is_some() && self.in_domain.is_some() {
            return Err(OptionsError::PageDomainConflict);
        }
        Ok(())
    }

    /// The focus string actually sent: `in_page`/`in_domain` override the
    /// declared search focus.
    pub fn effective_focus(&self) -> &'static str {
        if self.in_page.is_some() {
            "in_page"
        } else if self.in_domain.is_some() {
            "in_domain"
        } else {
            self.search_focus.as_str()
        }
    }
}

/// Build the `perplexity_ask` payload array.
///
/// `frontend_session_id` is stable for the façade's lifetime; a fresh
/// `frontend_uuid` is minted per query.
pub fn ask_payload(query: &str, options: &AskOptions, frontend_session_id: &str) -> Value {
    json!([
        "perplexity_ask",
        query,
        {
            "version": PROTOCOL_VERSION,
            "source": QUERY_SOURCE,
            "last_backend_uuid": options.follow_up,
            "read_write_token": "",
            "attachments": options.attachments,
            "language": options.language,
            "timezone": options.timezone,
            "search_focus": options.effective_focus(),
            "frontend_session_id": frontend_session_id,
            "frontend_uuid": Uuid::new_v4().to_string(),
            "mode": options.mode.as_str(),
            "in_page": options.in_page,
            "is_incognito": options.is_incognito,
            "in_domain": options.in_domain,
        }
    ])
}

/// Build the `get_upload_url` payload array.
pub fn upload_url_payload(content_type: &str) -> Value {
    json!([
        "get_upload_url",
        {
            "version": PROTOCOL_VERSION,
            "source": QUERY_SOURCE,
            "content_type": content_type,
        }
    ])
}

/// Build the `list_ask_threads` payload array.
pub fn thread_list_payload(search_term: Option<&str>, limit: u32) -> Value {
    let mut body = json!({
        "version": PROTOCOL_VERSION,
        "source": QUERY_SOURCE,
        "limit": limit,
        "offset": 0,
    });
    if let Some(term) = search_term {
        body["search_term"] = Value::from(term);
    }
    json!(["list_ask_threads", body])
}

/// Build the `list_autosuggest` payload array.
pub fn autosuggest_payload(query: &str, focus: SearchFocus) -> Value {
    json!([
        "list_autosuggest",
        query,
        {
            "has_attachment": false,
            "search_focus": focus.as_str(),
            "source": QUERY_SOURCE,
            "version": PROTOCOL_VERSION,
        }
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
