use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use ia_domain::model::{ChatMessage, ChatMessageType};
use ia_protocol::error::{ApiError, ErrorCode};
use ia_protocol::event::GameEvent;
use ia_protocol::rpc::{GetChatHistoryResponse, SendChatMessageRequest, SendChatMessageResponse};

use super::{domain_err, require_user_id, ApiErrorResponse, ApiResult};
use crate::state::AppState;

const MAX_CONTENT_LEN: usize = 1000;

pub async fn send_chat_message(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendChatMessageRequest>,
) -> ApiResult<SendChatMessageResponse> {
    let user_id = require_user_id(&headers)?;

    if req.content.is_empty() {
        return Err(ApiErrorResponse(ApiError::new(ErrorCode::InvalidInput, "content must not be empty")));
    }
    if req.content.chars().count() > MAX_CONTENT_LEN {
        return Err(ApiErrorResponse(ApiError::new(
            ErrorCode::ContentTooLong,
            format!("content exceeds {MAX_CONTENT_LEN} characters"),
        )));
    }
    if req.message_type == ChatMessageType::Private && req.recipients.as_ref().map_or(true, |r| r.is_empty()) {
        return Err(ApiErrorResponse(ApiError::new(
            ErrorCode::InvalidInput,
            "private messages require at least one recipient",
        )));
    }

    let (game_state, _, _) = state
        .rooms
        .get_room_state(&interaction_id)
        .ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    // A participant controlling an entity speaks on their own behalf; anyone
    // else connected to the room (the DM's spectator connection) is the only
    // one allowed onto the `dm` channel.
    if req.message_type == ChatMessageType::Dm {
        let is_dm = game_state.participants.values().all(|p| p.user_id.as_deref() != Some(user_id.as_str()));
        if !is_dm {
            return Err(ApiErrorResponse(ApiError::new(ErrorCode::DmOnly, "only the DM may post to the dm channel")));
        }
    }

    let message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.clone(),
        entity_id: req.entity_id.clone(),
        content: req.content.clone(),
        message_type: req.message_type,
        recipients: req.recipients.clone(),
        timestamp: Utc::now(),
    };

    state
        .rooms
        .with_room(&interaction_id, |room| room.game_state.chat_log.push(message.clone()))
        .ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    match (&req.message_type, &req.recipients) {
        (ChatMessageType::Private, Some(recipients)) => {
            for recipient in recipients {
                state.broadcaster.broadcast_to_user(
                    &interaction_id,
                    recipient,
                    GameEvent::ChatMessage {
                        interaction_id: interaction_id.clone(),
                        timestamp: message.timestamp,
                        message: message.clone(),
                    },
                );
            }
        }
        _ => {
            state.broadcaster.broadcast(
                &interaction_id,
                GameEvent::ChatMessage {
                    interaction_id: interaction_id.clone(),
                    timestamp: message.timestamp,
                    message: message.clone(),
                },
            );
        }
    }

    Ok(Json(SendChatMessageResponse { success: true, message }))
}

#[derive(Debug, Deserialize)]
pub struct ChatHistoryQuery {
    #[serde(rename = "channelType", default)]
    pub channel_type: Option<ChatMessageType>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn get_chat_history(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<ChatHistoryQuery>,
) -> ApiResult<GetChatHistoryResponse> {
    let (game_state, _, _) = state
        .rooms
        .get_room_state(&interaction_id)
        .ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    let mut messages: Vec<ChatMessage> = game_state
        .chat_log
        .into_iter()
        .filter(|m| query.channel_type.map_or(true, |t| t == m.message_type))
        .collect();

    let total_count = messages.len();
    if let Some(limit) = query.limit {
        if messages.len() > limit {
            let start = messages.len() - limit;
            messages = messages.split_off(start);
        }
    }

    Ok(Json(GetChatHistoryResponse {
        success: true,
        messages,
        total_count,
    }))
}
