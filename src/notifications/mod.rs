//! WebSocket notification fan-out.
//!
//! Connected users are tracked in an explicit registry keyed by user id.
//! Each connection is an actor: messages go into a bounded mpsc channel
//! drained by the task that owns the socket sink, so there is a single
//! writer per connection. Delivery is at-most-once — if the user is offline
//! or their channel is full, the message is accepted and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::auth::{self, Internal};
use crate::error::{AppError, Result};
use crate::state::AppState;

const CONNECTION_BUFFER: usize = 32;

/// Registry of live connections, one sender per user. A reconnect replaces
/// the previous sender; the stale connection's drain task ends when its
/// receiver is dropped.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl ConnectionRegistry {
    pub async fn register(&self, user_id: Uuid, tx: mpsc::Sender<String>) {
        self.inner.write().await.insert(user_id, tx);
    }

    /// Removes the user's entry only if it still belongs to `tx`, so a
    /// disconnecting stale socket cannot evict its replacement.
    pub async fn unregister(&self, user_id: Uuid, tx: &mpsc::Sender<String>) {
        let mut map = self.inner.write().await;
        if map.get(&user_id).is_some_and(|current| current.same_channel(tx)) {
            map.remove(&user_id);
        }
    }

    /// Attempts delivery to a connected user. Returns `false` when the user
    /// is offline or their channel is saturated — the message is dropped.
    pub async fn deliver(&self, user_id: Uuid, payload: String) -> bool {
        let map = self.inner.read().await;
        match map.get(&user_id) {
            Some(tx) => tx.try_send(payload).is_ok(),
            None => false,
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/ws", get(ws_connect))
        .route("/notifications/broadcast", post(broadcast))
        .route("/notifications/send", post(send))
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// Browsers cannot set headers on WebSocket handshakes, so the token rides
/// in the query string, mirroring the customer frontend's connect URL.
async fn ws_connect(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let token = params
        .token
        .ok_or_else(|| AppError::Auth("Authentication token required.".to_string()))?;
    let user = auth::decode_token(&state.config.jwt_secret, &token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(state, user.id, socket)))
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let (tx, mut rx) = mpsc::channel::<String>(CONNECTION_BUFFER);
    state.registry.register(user_id, tx.clone()).await;
    tracing::info!(%user_id, "client connected");

    let (mut sink, mut stream) = socket.split();
    let welcome = json!({ "type": "connection_success", "message": "Connected to SwiftMart notifications." });
    if sink.send(Message::Text(welcome.to_string())).await.is_err() {
        state.registry.unregister(user_id, &tx).await;
        return;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(payload) => {
                    if sink.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                // Sender replaced by a newer connection.
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.registry.unregister(user_id, &tx).await;
    tracing::info!(%user_id, "client disconnected");
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastRequest {
    user_id: Uuid,
    order_id: Uuid,
    new_status: String,
    message: Option<String>,
}

/// Internal: routes an order-status update to the order's owner, if they
/// are currently connected.
async fn broadcast(
    _guard: Internal,
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<serde_json::Value>> {
    let text = req
        .message
        .unwrap_or_else(|| format!("Order {} is now {}.", req.order_id, req.new_status.to_uppercase()));
    let payload = json!({
        "type": "order_update",
        "orderId": req.order_id,
        "status": req.new_status,
        "message": text,
        "timestamp": Utc::now().to_rfc3339(),
    });

    if state.registry.deliver(req.user_id, payload.to_string()).await {
        Ok(Json(json!({ "message": "Notification sent successfully." })))
    } else {
        Ok(Json(json!({ "message": "User offline, notification not sent in real-time." })))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    user_id: Uuid,
    #[serde(rename = "type")]
    kind: String,
    message: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Internal: generic typed notification over the same registry.
async fn send(
    _guard: Internal,
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<serde_json::Value>> {
    let payload = json!({
        "type": req.kind,
        "message": req.message,
        "data": req.data,
        "timestamp": Utc::now().to_rfc3339(),
    });

    if state.registry.deliver(req.user_id, payload.to_string()).await {
        Ok(Json(json!({ "message": "Notification sent successfully." })))
    } else {
        Ok(Json(json!({ "message": "User offline, notification dropped." })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_to_connected_user() {
        let registry = ConnectionRegistry::default();
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(user, tx).await;

        assert!(registry.deliver(user, "hello".to_string()).await);
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_offline_user_drops_message() {
        let registry = ConnectionRegistry::default();
        assert!(!registry.deliver(Uuid::new_v4(), "hello".to_string()).await);
    }

    #[tokio::test]
    async fn test_full_channel_drops_message() {
        let registry = ConnectionRegistry::default();
        let user = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        registry.register(user, tx).await;

        assert!(registry.deliver(user, "first".to_string()).await);
        assert!(!registry.deliver(user, "second".to_string()).await);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_connection() {
        let registry = ConnectionRegistry::default();
        let user = Uuid::new_v4();
        let (old_tx, _old_rx) = mpsc::channel(4);
        let (new_tx, mut new_rx) = mpsc::channel(4);
        registry.register(user, old_tx.clone()).await;
        registry.register(user, new_tx).await;

        // The stale connection cannot evict its replacement.
        registry.unregister(user, &old_tx).await;
        assert!(registry.deliver(user, "still here".to_string()).await);
        assert_eq!(new_rx.recv().await.unwrap(), "still here");

        assert_eq!(registry.connected_count().await, 1);
    }
}
