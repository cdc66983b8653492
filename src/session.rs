//! Streaming venue session with request/response correlation
//!
//! Each outgoing request carries a fresh id. A reader task routes every
//! incoming frame with a matching id to the waiting caller, so logon is
//! confirmed by the venue's own answer rather than by a fixed delay.

use crate::error::{OrchestratorError, Result};
use crate::signing::PayloadSigner;
use crate::types::KeyName;
use crate::venue::{now_millis, OrderRequest};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};

pub const LOGON_METHOD: &str = "session.logon";
pub const ORDER_PLACE_METHOD: &str = "order.place";

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, logon not yet acknowledged
    Pending,
    Authenticated,
}

/// Request frame sent over the stream
#[derive(Debug, Serialize)]
struct RequestFrame<'a, P: Serialize> {
    id: &'a str,
    method: &'a str,
    params: P,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogonParams<'a> {
    api_key: &'a str,
    timestamp: i64,
    signature: String,
}

/// Venue's answer to a correlated request
#[derive(Debug, Clone)]
pub struct SessionResponse {
    pub id: String,
    pub status: u16,
    pub result: Value,
}

/// A WebSocket connection to the venue
pub struct VenueSession {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    /// Set by the reader, under the pending lock, once the stream has ended
    closed: Arc<AtomicBool>,
    state: SessionState,
    response_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl VenueSession {
    /// Open a session to `url`
    pub async fn connect(url: &str, response_timeout: Duration) -> Result<Self> {
        let (stream, _) = tokio::time::timeout(response_timeout, connect_async(url))
            .await
            .map_err(|_| OrchestratorError::session(format!("timeout connecting to {}", url)))?
            .map_err(|e| OrchestratorError::session(format!("connect to {} failed: {}", url, e)))?;

        tracing::info!(url, "Connected to venue stream");
        Ok(Self::from_stream(stream, response_timeout))
    }

    /// Wrap an already established WebSocket
    pub fn from_stream<S>(stream: WebSocketStream<S>, response_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(error = %e, "Venue stream write failed");
                    break;
                }
            }
        });

        let routes = pending.clone();
        let reader_closed = closed.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => route_frame(&routes, &text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Venue stream read failed");
                        break;
                    }
                }
            }
            tracing::info!("Venue stream closed");
            // Dropping the senders wakes every waiter with a closed error
            let mut routes = lock(&routes);
            reader_closed.store(true, Ordering::Release);
            routes.clear();
        });

        Self {
            outgoing,
            pending,
            closed,
            state: SessionState::Pending,
            response_timeout,
            reader,
            writer,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// True once the venue side of the stream has gone away
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send `method` with `params` and wait for the response carrying the same id
    pub async fn request<P: Serialize>(&self, method: &str, params: P) -> Result<SessionResponse> {
        let id = uuid::Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&RequestFrame {
            id: &id,
            method,
            params,
        })
        .map_err(|e| OrchestratorError::session(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if self.is_closed() {
                return Err(OrchestratorError::session("venue stream is closed"));
            }
            pending.insert(id.clone(), tx);
        }

        if self.outgoing.send(Message::Text(frame)).is_err() {
            lock(&self.pending).remove(&id);
            return Err(OrchestratorError::session("venue stream is closed"));
        }
        tracing::debug!(request_id = %id, method, "Sent venue request");

        let response = match tokio::time::timeout(self.response_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(OrchestratorError::session(format!(
                    "stream closed before response to {}",
                    id
                )))
            }
            Err(_) => {
                lock(&self.pending).remove(&id);
                return Err(OrchestratorError::SessionTimeout {
                    request_id: id,
                    timeout_ms: self.response_timeout.as_millis() as u64,
                });
            }
        };

        let status = match response_status(&response) {
            Some(200) => 200,
            other => {
                let status = other.unwrap_or(0);
                let message = response
                    .pointer("/error/msg")
                    .and_then(Value::as_str)
                    .unwrap_or("no error message")
                    .to_string();
                tracing::warn!(request_id = %id, method, status, message = %message, "Venue rejected request");
                return Err(OrchestratorError::SessionRejected { status, message });
            }
        };

        Ok(SessionResponse {
            id,
            status,
            result: response.get("result").cloned().unwrap_or(Value::Null),
        })
    }

    /// Place an unsigned order on an authenticated session
    pub async fn place_order(&self, order: &OrderRequest) -> Result<SessionResponse> {
        if !self.is_authenticated() {
            return Err(OrchestratorError::session(
                "session must be authenticated before placing orders",
            ));
        }

        let response = self.request(ORDER_PLACE_METHOD, order).await?;
        tracing::info!(request_id = %response.id, symbol = %order.symbol, "Order accepted");
        Ok(response)
    }

    /// Close the stream politely
    pub fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }
}

impl Drop for VenueSession {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn lock(pending: &PendingMap) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Value>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// HTTP-like status of a response frame; `None` when absent or out of range
fn response_status(response: &Value) -> Option<u16> {
    response
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
}

/// Deliver a frame to its waiter, or log it if nobody asked for it
fn route_frame(pending: &PendingMap, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!(frame = %text, "Non-JSON venue frame");
            return;
        }
    };

    let waiter = value
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| lock(pending).remove(id));

    match waiter {
        Some(tx) => {
            let _ = tx.send(value);
        }
        None => tracing::info!(frame = %text, "Venue message"),
    }
}

/// Handshake payload the venue expects to be signed
pub fn logon_payload(api_key: &str, timestamp: i64) -> String {
    format!("apiKey={}&timestamp={}", api_key, timestamp)
}

/// Authenticates venue sessions with a cluster-held key
pub struct SessionAuthenticator {
    signer: Arc<dyn PayloadSigner>,
}

impl SessionAuthenticator {
    pub fn new(signer: Arc<dyn PayloadSigner>) -> Self {
        Self { signer }
    }

    /// Sign and send `session.logon`, then wait for the venue to accept it
    pub async fn authenticate(
        &self,
        session: &mut VenueSession,
        api_key: &str,
        key_name: &KeyName,
    ) -> Result<SessionResponse> {
        let timestamp = now_millis();
        let payload = logon_payload(api_key, timestamp);
        let signature = self.signer.sign_payload(key_name, payload.as_bytes()).await?;

        let params = LogonParams {
            api_key,
            timestamp,
            signature: BASE64.encode(signature.as_bytes()),
        };

        tracing::info!(key_name = %key_name, timestamp, "Authenticating venue session");
        let response = session.request(LOGON_METHOD, params).await?;

        session.state = SessionState::Authenticated;
        tracing::info!(request_id = %response.id, "Venue session authenticated");
        Ok(response)
    }
}
