//! The session façade: one connected client, one query at a time.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use perplexity_protocol::{
    ask_payload, autosuggest_payload, thread_list_payload, upload_url_payload, AskOptions,
    ClientFrame, QueryUpdate, SearchFocus, UploadTicket,
};

use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, StoredCredentials};
use crate::error::{ClientError, Result};
use crate::handshake;
use crate::socket::SocketSession;
use crate::state::QueryState;
use crate::upload;

/// Thread count returned by [`Client::list_threads`] when the caller does
/// not pick one.
const DEFAULT_THREAD_LIMIT: u32 = 20;

/// Stand-in budget when the caller passes no timeout.
const NO_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Stream of updates for one query cycle. Ends when the cycle finishes;
/// yields at most one `Err`, always as the last item.
pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<QueryUpdate>> + Send>>;

/// A connected conversational-search session.
///
/// Construction performs the whole connection ritual (warm-up, long-poll
/// handshake, WebSocket upgrade, greeting); a `Client` you hold is ready
/// to query. At most one query may be outstanding at a time.
pub struct Client {
    http: reqwest::Client,
    jar: Arc<Jar>,
    base: Url,
    config: ClientConfig,
    state: Arc<QueryState>,
    socket: SocketSession,
    sid: String,
    frontend_session_id: String,
    store: Option<(Arc<dyn CredentialStore>, String)>,
}

impl Client {
    /// Connect with no credential persistence.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::build(config, None).await
    }

    /// Connect, seeding cookies from `store` under `key` and writing them
    /// back on [`Self::close`].
    pub async fn connect_with_store(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        key: impl Into<String>,
    ) -> Result<Self> {
        Self::build(config, Some((store, key.into()))).await
    }

    async fn build(
        config: ClientConfig,
        store: Option<(Arc<dyn CredentialStore>, String)>,
    ) -> Result<Self> {
        let base: Url = config.base_url.parse().map_err(|e| ClientError::Config {
            message: format!("invalid base URL: {e}"),
        })?;

        let jar = Arc::new(Jar::default());
        if let Some((store, key)) = &store {
            if let Some(credentials) = store.load(key).await {
                for (name, value) in &credentials.cookies {
                    jar.add_cookie_str(&format!("{name}={value}"), &base);
                }
                debug!(count = credentials.cookies.len(), "seeded stored cookies");
            }
        }

        let http = reqwest::Client::builder()
            .default_headers(identity_headers(&config)?)
            .cookie_provider(jar.clone())
            .build()?;

        // Anonymous warm-up; we only care about the cookies it sets.
        let warmup = http
            .get(config.warmup_url(&Uuid::new_v4().to_string()))
            .send()
            .await?;
        debug!(status = %warmup.status(), "warm-up request");

        let outcome = handshake::negotiate(&http, &config).await?;
        let state = Arc::new(QueryState::new());
        let cookie_header = jar
            .cookies(&base)
            .and_then(|v| v.to_str().ok().map(str::to_owned));
        let socket = SocketSession::connect(
            &config.websocket_url(&outcome.sid),
            &config.identity,
            cookie_header,
            state.clone(),
        )
        .await?;

        // Best effort; a session works without the refreshed auth cookie.
        if let Err(e) = http.get(config.auth_session_url()).send().await {
            debug!(error = %e, "auth session refresh failed");
        }

        Ok(Self {
            http,
            jar,
            base,
            config,
            state,
            socket,
            sid: outcome.sid,
            frontend_session_id: Uuid::new_v4().to_string(),
            store,
        })
    }

    /// The negotiated socket.io session id.
    #[must_use]
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// The configuration the session was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether the session is free to take a query right now.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Issue a query and stream its updates as they arrive.
    ///
    /// The stream ends when the cycle finishes. On timeout the state
    /// machine is reset to idle and the stream yields one final
    /// [`ClientError::TimeoutExceeded`].
    #[tracing::instrument(skip_all, fields(query = %query))]
    pub async fn ask(
        &self,
        query: &str,
        options: &AskOptions,
        timeout: Option<Duration>,
    ) -> Result<UpdateStream> {
        options.validate()?;
        let body = ask_payload(query, options, &self.frontend_session_id);
        self.issue(body).await?;
        debug!("query issued");
        Ok(stream_updates(self.state.clone(), timeout))
    }

    /// Issue a query and return only the last update of the cycle.
    #[tracing::instrument(skip_all, fields(query = %query))]
    pub async fn ask_sync(
        &self,
        query: &str,
        options: &AskOptions,
        timeout: Option<Duration>,
    ) -> Result<QueryUpdate> {
        options.validate()?;
        let body = ask_payload(query, options, &self.frontend_session_id);
        self.issue(body).await?;
        debug!("query issued");
        self.finish_cycle(timeout).await
    }

    /// Upload an attachment and return its hosted URL.
    ///
    /// `source` may be an `http(s)` URL, a base64 `data:` URI, or a local
    /// file path. Runs as a full query cycle (the ticket request goes over
    /// the socket), so it is subject to the same one-at-a-time rule.
    #[tracing::instrument(skip_all, fields(source = %source))]
    pub async fn upload(&self, source: &str, timeout: Option<Duration>) -> Result<String> {
        let attachment = upload::resolve_attachment(&self.http, source).await?;
        let body = upload_url_payload(attachment.content_type);
        self.issue(body).await?;
        let update = self.finish_cycle(timeout).await?;
        let ticket = UploadTicket::from_update(&update)?;
        upload::perform_upload(&self.http, &ticket, attachment).await
    }

    /// List recent query threads, newest first.
    pub async fn list_threads(
        &self,
        search_term: Option<&str>,
        limit: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<QueryUpdate> {
        let body = thread_list_payload(search_term, limit.unwrap_or(DEFAULT_THREAD_LIMIT));
        self.issue(body).await?;
        self.finish_cycle(timeout).await
    }

    /// Fetch query completions for a partial query.
    pub async fn autosuggest(
        &self,
        query: &str,
        focus: SearchFocus,
        timeout: Option<Duration>,
    ) -> Result<QueryUpdate> {
        let body = autosuggest_payload(query, focus);
        self.issue(body).await?;
        self.finish_cycle(timeout).await
    }

    /// Persist cookies (when a store was supplied) and close the socket.
    pub async fn close(self) {
        if let Some((store, key)) = &self.store {
            let credentials = snapshot_cookies(self.jar.as_ref(), &self.base);
            store.save(key, credentials).await;
        }
        self.socket.close().await;
    }

    /// Reserve the query slot and send the tagged frame; the slot is
    /// released again if the send fails.
    async fn issue(&self, body: serde_json::Value) -> Result<()> {
        let seq = self.state.begin_query()?;
        let frame = ClientFrame::Query { seq, body }.encode();
        if let Err(e) = self.socket.send(frame).await {
            self.state.abort_query();
            return Err(e);
        }
        Ok(())
    }

    /// Wait for the in-flight cycle to finish and hand back its last
    /// update, draining anything older.
    async fn finish_cycle(&self, timeout: Option<Duration>) -> Result<QueryUpdate> {
        if !self.state.wait_finished(deadline_from(timeout)).await {
            self.state.force_idle();
            return Err(ClientError::TimeoutExceeded {
                timeout_ms: timeout_millis(timeout),
            });
        }
        if let Some(message) = self.state.failure() {
            return Err(ClientError::UnhandledFrame { message });
        }
        self.state.take_last().ok_or(ClientError::MissingResponse)
    }
}

fn identity_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let parse = |value: &str| {
        HeaderValue::from_str(value).map_err(|e| ClientError::Config {
            message: format!("invalid header value: {e}"),
        })
    };
    let mut headers = HeaderMap::new();
    let _ = headers.insert("User-Agent", parse(&config.identity.user_agent)?);
    let _ = headers.insert("X-Client-Name", parse(&config.identity.client_name)?);
    let _ = headers.insert("X-App-ApiClient", parse(&config.identity.api_client)?);
    Ok(headers)
}

fn snapshot_cookies(jar: &Jar, base: &Url) -> StoredCredentials {
    let mut cookies = BTreeMap::new();
    if let Some(joined) = jar.cookies(base).and_then(|v| v.to_str().ok().map(str::to_owned)) {
        for pair in joined.split("; ") {
            if let Some((name, value)) = pair.split_once('=') {
                let _ = cookies.insert(name.to_owned(), value.to_owned());
            }
        }
    }
    StoredCredentials { cookies }
}

fn deadline_from(timeout: Option<Duration>) -> Instant {
    Instant::now() + timeout.unwrap_or(NO_TIMEOUT)
}

fn timeout_millis(timeout: Option<Duration>) -> u64 {
    timeout.map_or(u64::MAX, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
}

/// Pull-driven view of the update queue for one query cycle.
fn stream_updates(state: Arc<QueryState>, timeout: Option<Duration>) -> UpdateStream {
    let deadline = deadline_from(timeout);
    let timeout_ms = timeout_millis(timeout);
    Box::pin(async_stream::stream! {
        loop {
            if let Some(update) = state.pop_front() {
                yield Ok(update);
                continue;
            }
            if let Some(message) = state.failure() {
                yield Err(ClientError::UnhandledFrame { message });
                return;
            }
            if state.is_idle() {
                return;
            }
            if !state.wait_progress(deadline).await {
                state.force_idle();
                yield Err(ClientError::TimeoutExceeded { timeout_ms });
                return;
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use perplexity_protocol::PendingEvent;
    use serde_json::json;

    fn update(body: serde_json::Value) -> QueryUpdate {
        QueryUpdate::from_value(body).unwrap()
    }

    // ── stream_updates ──

    #[tokio::test]
    async fn stream_yields_queued_updates_until_idle() {
        let state = Arc::new(QueryState::new());
        let _ = state.begin_query().unwrap();
        state.on_pending(PendingEvent::QueryProgress, update(json!({"step": 1})));
        state.on_pending(
            PendingEvent::QueryAnswered,
            update(json!({"uuid": "u", "status": "completed"})),
        );

        let mut stream = stream_updates(state, Some(Duration::from_secs(5)));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.rest["step"], 1);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.uuid.as_deref(), Some("u"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_times_out_and_resets_to_idle() {
        let state = Arc::new(QueryState::new());
        let _ = state.begin_query().unwrap();

        let mut stream = stream_updates(state.clone(), Some(Duration::from_millis(50)));
        let item = stream.next().await.unwrap();
        assert_matches!(item, Err(ClientError::TimeoutExceeded { timeout_ms: 50 }));
        assert!(stream.next().await.is_none());
        assert!(state.is_idle());
    }

    #[tokio::test]
    async fn stream_surfaces_a_latched_failure() {
        let state = Arc::new(QueryState::new());
        let _ = state.begin_query().unwrap();
        state.fail("protocol violation");

        let mut stream = stream_updates(state, Some(Duration::from_secs(5)));
        let item = stream.next().await.unwrap();
        assert_matches!(item, Err(ClientError::UnhandledFrame { message }) if message == "protocol violation");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_drains_queue_before_reporting_failure() {
        let state = Arc::new(QueryState::new());
        let _ = state.begin_query().unwrap();
        state.on_pending(PendingEvent::QueryProgress, update(json!({"step": 1})));
        state.fail("late violation");

        let mut stream = stream_updates(state, Some(Duration::from_secs(5)));
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
    }

    // ── helpers ──

    #[test]
    fn timeout_millis_handles_both_cases() {
        assert_eq!(timeout_millis(Some(Duration::from_millis(250))), 250);
        assert_eq!(timeout_millis(None), u64::MAX);
    }

    #[test]
    fn snapshot_parses_the_cookie_header() {
        let base: Url = "https://www.perplexity.ai".parse().unwrap();
        let jar = Jar::default();
        jar.add_cookie_str("__cf_bm=abc", &base);
        jar.add_cookie_str("session=xyz", &base);
        let credentials = snapshot_cookies(&jar, &base);
        assert_eq!(credentials.cookies.get("__cf_bm").map(String::as_str), Some("abc"));
        assert_eq!(credentials.cookies.get("session").map(String::as_str), Some("xyz"));
    }
}
