//! WebSocket session: upgrade, greeting, and the receive loop.
//!
//! The loop owns the socket; the rest of the client talks to it through an
//! mpsc channel for outbound frames and through [`QueryState`] for inbound
//! ones.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace};

use futures::{SinkExt, StreamExt};

use perplexity_protocol::{decode_server_frame, ClientFrame, ServerFrame};

use crate::config::Identity;
use crate::error::{ClientError, Result};
use crate::state::QueryState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to a live socket session.
#[derive(Debug)]
pub(crate) struct SocketSession {
    out_tx: mpsc::Sender<String>,
    handler: JoinHandle<()>,
}

impl SocketSession {
    /// Upgrade to a WebSocket, send the greeting, and spawn the receive
    /// loop.
    pub(crate) async fn connect(
        url: &str,
        identity: &Identity,
        cookie_header: Option<String>,
        state: Arc<QueryState>,
    ) -> Result<Self> {
        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        let _ = headers.insert("User-Agent", header_value(&identity.user_agent)?);
        let _ = headers.insert("X-Client-Name", header_value(&identity.client_name)?);
        let _ = headers.insert("X-App-ApiClient", header_value(&identity.api_client)?);
        if let Some(cookie) = cookie_header {
            let _ = headers.insert("Cookie", header_value(&cookie)?);
        }

        let (mut ws, _response) = connect_async(request).await?;
        ws.send(Message::Text(ClientFrame::ProbePing.encode().into()))
            .await?;
        ws.send(Message::Text(ClientFrame::PongAck.encode().into()))
            .await?;
        debug!(%url, "websocket session established");

        let (out_tx, out_rx) = mpsc::channel::<String>(16);
        let handler = tokio::spawn(socket_loop(ws, out_rx, state));
        Ok(Self { out_tx, handler })
    }

    /// Queue one frame for sending.
    pub(crate) async fn send(&self, frame: String) -> Result<()> {
        self.out_tx
            .send(frame)
            .await
            .map_err(|_| ClientError::SocketClosed)
    }

    /// Close the socket and wait for the loop to drain.
    pub(crate) async fn close(self) {
        drop(self.out_tx);
        let _ = self.handler.await;
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ClientError::Config {
        message: format!("invalid header value: {e}"),
    })
}

async fn socket_loop(ws: WsStream, mut out_rx: mpsc::Receiver<String>, state: Arc<QueryState>) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        trace!(frame = %frame, "sending frame");
                        if let Err(e) = sink.send(Message::Text(frame.into())).await {
                            error!(error = %e, "websocket send failed");
                            state.fail(format!("websocket send failed: {e}"));
                            break;
                        }
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = dispatch_frame(text.as_str(), &state) {
                            if let Err(e) = sink.send(Message::Text(reply.into())).await {
                                error!(error = %e, "websocket send failed");
                                state.fail(format!("websocket send failed: {e}"));
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        state.fail("socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "websocket receive failed");
                        state.fail(format!("websocket receive failed: {e}"));
                        break;
                    }
                }
            }
        }
    }
    debug!("socket loop exited");
}

/// Classify one inbound frame and route it; returns the keep-alive reply
/// to send, when one is due.
fn dispatch_frame(text: &str, state: &QueryState) -> Option<String> {
    match decode_server_frame(text, state.current_seq()) {
        Ok(ServerFrame::Ping) => Some(ClientFrame::Pong.encode()),
        Ok(ServerFrame::PingAckProbe) => Some(ClientFrame::PongAck.encode()),
        Ok(ServerFrame::AnonAck | ServerFrame::Ignored) => None,
        Ok(ServerFrame::Pending { event, update }) => {
            state.on_pending(event, update);
            None
        }
        Ok(ServerFrame::Response { update }) => {
            state.on_response(update);
            None
        }
        Err(e) => {
            error!(error = %e, "unhandled frame");
            state.fail(e.to_string());
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
