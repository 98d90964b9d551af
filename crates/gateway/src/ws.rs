//! The `roomUpdates` streaming endpoint: one WebSocket connection per
//! subscriber, fed by the broadcaster's per-subscription channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use ia_domain::trace::TraceEvent;
use ia_protocol::event::GameEvent;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth::token_eq;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoomUpdatesQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Comma-separated event types to receive (`*` for everything);
    /// defaults to everything when omitted.
    #[serde(default, rename = "eventTypes")]
    pub event_types: Option<String>,
}

pub async fn room_updates(
    Path(interaction_id): Path<String>,
    Query(query): Query<RoomUpdatesQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Some(expected) = &state.api_token_hash {
        let supplied = query.token.as_deref().unwrap_or("");
        if !token_eq(supplied, expected) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let event_types = query
        .event_types
        .as_deref()
        .map(|s| s.split(',').map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()).collect::<Vec<_>>())
        .unwrap_or_else(|| vec!["*".to_owned()]);

    let (subscription_id, events) = match state.broadcaster.subscribe(&interaction_id, &query.user_id, event_types) {
        Ok(pair) => pair,
        Err(_) => {
            warn!(interaction_id = %interaction_id, user_id = %query.user_id, "subscription limit exceeded");
            return (StatusCode::TOO_MANY_REQUESTS, "SUBSCRIPTION_LIMIT").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, interaction_id, query.user_id, subscription_id, events))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    interaction_id: String,
    user_id: String,
    subscription_id: String,
    mut events: mpsc::UnboundedReceiver<GameEvent>,
) {
    info!(interaction_id = %interaction_id, user_id = %user_id, subscription_id = %subscription_id, "subscriber connected");
    TraceEvent::SubscriberConnected {
        interaction_id: interaction_id.clone(),
        subscription_id: subscription_id.clone(),
        user_id: Some(user_id.clone()),
    }
    .emit();

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(%err, "failed to serialize event for subscriber");
                    continue;
                }
            };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // This side of the socket is read-only: RPCs go through the HTTP API.
    // Axum answers WebSocket pings automatically; draining inbound frames
    // here just detects client-initiated close.
    while stream.next().await.is_some() {}

    writer.abort();
    state.broadcaster.unsubscribe(&interaction_id, &subscription_id);
    info!(interaction_id = %interaction_id, user_id = %user_id, subscription_id = %subscription_id, "subscriber disconnected");
    TraceEvent::SubscriberDisconnected {
        interaction_id,
        subscription_id,
        reason: "socket closed".into(),
    }
    .emit();
}
