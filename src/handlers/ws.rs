use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::auth::jwt::{verify_token, TokenType};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
    /// Day to watch; defaults to today (UTC).
    date: Option<NaiveDate>,
}

/// Live view of one day's log. Sends a snapshot frame on connect, then one
/// frame per write to that (user, date). Closing the socket drops the
/// subscription; in-flight writes are not cancelled.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    // Browsers cannot set headers on WebSocket upgrades; the access token
    // arrives as a query parameter instead.
    let user_id = match authenticate_ws(&state, query.token.as_deref()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("WebSocket auth failed: {}", e);
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, date))
}

fn authenticate_ws(state: &AppState, token: Option<&str>) -> Result<Uuid, &'static str> {
    let token = token.ok_or("Missing token query parameter")?;

    let token_data = verify_token(token, &state.config)
        .map_err(|_| "Invalid or expired token")?;

    if token_data.claims.token_type != TokenType::Access {
        return Err("Must use access token for WebSocket");
    }

    Ok(token_data.claims.sub)
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, date: NaiveDate) {
    let (mut sender, mut receiver) = socket.split();

    tracing::debug!(user_id = %user_id, date = %date, "WebSocket connection established");

    let mut sub = match state.store.subscribe(user_id, date).await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::error!(error = %e, user_id = %user_id, "WebSocket subscribe failed");
            let _ = sender.close().await;
            return;
        }
    };

    // Snapshot first: the client always learns the current state (or its
    // absence) before any change frames.
    let snapshot = serde_json::json!({
        "type": "daily_log_snapshot",
        "date": date,
        "log": sub.current.take(),
    });
    if sender
        .send(Message::Text(snapshot.to_string()))
        .await
        .is_err()
    {
        return;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match sub.updates.recv().await {
                Ok(log) => {
                    let msg = serde_json::json!({
                        "type": "daily_log_changed",
                        "date": log.log_date,
                        "log": log,
                    });
                    if sender.send(Message::Text(msg.to_string())).await.is_err() {
                        break;
                    }
                }
                // Fell behind the write rate; skip to the newest frames.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user_id, skipped = skipped, "WebSocket subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!(user_id = %user_id, message = %text, "WebSocket message received");
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(user_id = %user_id, date = %date, "WebSocket connection closed");
}
