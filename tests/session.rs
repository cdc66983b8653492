//! Venue session tests against a local WebSocket server

use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use vertex_orchestrator::{
    KeyName, OrchestratorError, OrderRequest, PayloadSigner, SessionAuthenticator, SessionState,
    Side, Signature, VenueSession,
};

const TIMEOUT: Duration = Duration::from_millis(500);

/// Start a venue that answers every text frame with the frames `handler` returns
async fn spawn_venue<H>(handler: H) -> String
where
    H: Fn(Value) -> Vec<Value> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let request: Value = serde_json::from_str(&text).unwrap();
            for reply in handler(request) {
                if ws.send(Message::Text(reply.to_string())).await.is_err() {
                    return;
                }
            }
        }
    });

    format!("ws://{}", addr)
}

#[derive(Default)]
struct StubSigner {
    payloads: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl PayloadSigner for StubSigner {
    async fn sign_payload(
        &self,
        _key_name: &KeyName,
        payload: &[u8],
    ) -> vertex_orchestrator::Result<Signature> {
        self.payloads.lock().unwrap().push(payload.to_vec());
        Ok(Signature::from_bytes(vec![1u8; 64]))
    }
}

fn accept_all(request: Value) -> Vec<Value> {
    vec![
        // Unsolicited frame that must not be taken as the answer
        json!({"id": "unrelated", "status": 200, "result": {}}),
        json!({"id": request["id"], "status": 200, "result": {"method": request["method"]}}),
    ]
}

#[tokio::test]
async fn logon_is_confirmed_by_matching_response() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let url = spawn_venue(move |request| {
        recorded.lock().unwrap().push(request.clone());
        accept_all(request)
    })
    .await;

    let signer = Arc::new(StubSigner::default());
    let mut session = VenueSession::connect(&url, TIMEOUT).await.unwrap();
    assert_eq!(session.state(), SessionState::Pending);

    let response = SessionAuthenticator::new(signer.clone())
        .authenticate(&mut session, "venue-api-key", &KeyName::new("k1"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.result["method"], "session.logon");
    assert!(session.is_authenticated());

    let payloads = signer.payloads.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    let payload = String::from_utf8(payloads[0].clone()).unwrap();
    assert!(payload.starts_with("apiKey=venue-api-key&timestamp="));

    let requests = seen.lock().unwrap().clone();
    let params = &requests[0]["params"];
    assert_eq!(requests[0]["method"], "session.logon");
    assert_eq!(params["apiKey"], "venue-api-key");
    assert_eq!(
        params["signature"],
        base64::engine::general_purpose::STANDARD.encode([1u8; 64])
    );
    assert_eq!(
        payload,
        format!("apiKey=venue-api-key&timestamp={}", params["timestamp"])
    );
}

#[tokio::test]
async fn orders_follow_authentication() {
    let url = spawn_venue(accept_all).await;
    let mut session = VenueSession::connect(&url, TIMEOUT).await.unwrap();

    let order = OrderRequest::market("BTCUSDT", Side::Buy, "0.001");
    let err = session.place_order(&order).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Session(_)));

    SessionAuthenticator::new(Arc::new(StubSigner::default()))
        .authenticate(&mut session, "key", &KeyName::new("k1"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(session.place_order(&order), session.place_order(&order));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.id, b.id);
    assert_eq!(a.result["method"], "order.place");

    session.close();
}

#[tokio::test]
async fn rejected_logon_leaves_session_pending() {
    let url = spawn_venue(|request| {
        vec![json!({
            "id": request["id"],
            "status": 401,
            "error": {"code": -1022, "msg": "Signature for this request is not valid."},
        })]
    })
    .await;

    let mut session = VenueSession::connect(&url, TIMEOUT).await.unwrap();
    let err = SessionAuthenticator::new(Arc::new(StubSigner::default()))
        .authenticate(&mut session, "key", &KeyName::new("k1"))
        .await
        .unwrap_err();

    match err {
        OrchestratorError::SessionRejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Signature for this request is not valid.");
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Pending);
}

#[tokio::test]
async fn silent_venue_times_out() {
    let url = spawn_venue(|_| Vec::new()).await;

    let mut session = VenueSession::connect(&url, Duration::from_millis(200))
        .await
        .unwrap();
    let err = SessionAuthenticator::new(Arc::new(StubSigner::default()))
        .authenticate(&mut session, "key", &KeyName::new("k1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::SessionTimeout { timeout_ms: 200, .. }
    ));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn closed_stream_fails_pending_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        // Read the logon, then hang up without answering
        let _ = ws.next().await;
        let _ = ws.close(None).await;
    });

    let mut session = VenueSession::connect(&format!("ws://{}", addr), Duration::from_secs(5))
        .await
        .unwrap();
    let err = SessionAuthenticator::new(Arc::new(StubSigner::default()))
        .authenticate(&mut session, "key", &KeyName::new("k1"))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Session(_)));
}

#[tokio::test]
async fn connect_to_missing_venue_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = VenueSession::connect(&format!("ws://{}", addr), TIMEOUT).await;
    assert!(matches!(result, Err(OrchestratorError::Session(_))));
}

#[tokio::test]
async fn reply_without_status_is_not_a_logon() {
    let url = spawn_venue(|request| vec![json!({"id": request["id"], "error": {"msg": "bad"}})]).await;

    let mut session = VenueSession::connect(&url, TIMEOUT).await.unwrap();
    let err = SessionAuthenticator::new(Arc::new(StubSigner::default()))
        .authenticate(&mut session, "key", &KeyName::new("k1"))
        .await
        .unwrap_err();

    match err {
        OrchestratorError::SessionRejected { status, message } => {
            assert_eq!(status, 0);
            assert_eq!(message, "bad");
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Pending);
}

#[tokio::test]
async fn requests_after_venue_hangs_up_fail_fast() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let request: Value = serde_json::from_str(&text).unwrap();
            let reply = json!({"id": request["id"], "status": 200, "result": {}});
            ws.send(Message::Text(reply.to_string())).await.unwrap();
        }
        let _ = ws.close(None).await;
        // Keep the socket around so writes still succeed
        while ws.next().await.is_some() {}
    });

    let response_timeout = Duration::from_secs(5);
    let mut session = VenueSession::connect(&format!("ws://{}", addr), response_timeout)
        .await
        .unwrap();
    SessionAuthenticator::new(Arc::new(StubSigner::default()))
        .authenticate(&mut session, "key", &KeyName::new("k1"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while !session.is_closed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let started = Instant::now();
    let err = session
        .place_order(&OrderRequest::market("BTCUSDT", Side::Buy, "0.001"))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Session(_)));
    assert!(started.elapsed() < response_timeout);
}
