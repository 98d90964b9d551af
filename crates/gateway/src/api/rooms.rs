use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use ia_protocol::event::GameEvent;
use ia_protocol::rpc::{
    GetRoomStateResponse, JoinRoomRequest, JoinRoomResponse, LeaveRoomRequest, PauseInteractionRequest,
    PauseInteractionResponse, ResumeInteractionRequest, SimpleMessageResponse,
};

use super::{busy_err, domain_err, require_user_id, ApiResult};
use crate::state::AppState;

pub async fn join_room(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<JoinRoomRequest>,
) -> ApiResult<JoinRoomResponse> {
    let user_id = require_user_id(&headers)?;
    let connection_id = Uuid::new_v4().to_string();

    let outcome = state
        .rooms
        .join_room(&interaction_id, &user_id, &body.entity_id, body.entity_type, &connection_id)
        .await
        .map_err(domain_err)?;

    state.broadcaster.broadcast(
        &interaction_id,
        GameEvent::ParticipantJoined {
            interaction_id: interaction_id.clone(),
            timestamp: Utc::now(),
            user_id,
            entity_id: body.entity_id,
            participant_count: outcome.participant_count,
        },
    );

    Ok(Json(JoinRoomResponse {
        success: true,
        room_id: outcome.room_id,
        game_state: outcome.game_state,
        participant_count: outcome.participant_count,
    }))
}

pub async fn leave_room(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(_body): Json<LeaveRoomRequest>,
) -> ApiResult<SimpleMessageResponse> {
    let user_id = require_user_id(&headers)?;

    let entity_id = state.rooms.get_room_state(&interaction_id).and_then(|(game_state, _, _)| {
        game_state
            .participants
            .values()
            .find(|p| p.user_id.as_deref() == Some(user_id.as_str()))
            .map(|p| p.entity_id.clone())
    });

    state.rooms.leave_room(&interaction_id, &user_id).map_err(domain_err)?;

    state.broadcaster.broadcast(
        &interaction_id,
        GameEvent::ParticipantLeft {
            interaction_id: interaction_id.clone(),
            timestamp: Utc::now(),
            user_id,
            entity_id: entity_id.unwrap_or_default(),
        },
    );

    Ok(Json(SimpleMessageResponse {
        success: true,
        message: "left room".into(),
    }))
}

pub async fn get_room_state(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<GetRoomStateResponse> {
    let (game_state, status, participant_count) = state
        .rooms
        .get_room_state(&interaction_id)
        .ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    Ok(Json(GetRoomStateResponse {
        success: true,
        game_state,
        room_id: interaction_id,
        participant_count,
        status,
    }))
}

pub async fn pause_interaction(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<PauseInteractionRequest>,
) -> ApiResult<PauseInteractionResponse> {
    let _permit = state.room_locks.acquire(&interaction_id).await.map_err(busy_err)?;
    let paused = state.rooms.with_room(&interaction_id, |room| state.turn_engine.pause(room));

    paused.ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    state.broadcaster.broadcast(
        &interaction_id,
        GameEvent::InteractionPaused {
            interaction_id: interaction_id.clone(),
            timestamp: Utc::now(),
            reason: body.reason.clone(),
        },
    );

    Ok(Json(PauseInteractionResponse {
        success: true,
        message: "interaction paused".into(),
        reason: body.reason,
    }))
}

pub async fn resume_interaction(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    Json(_body): Json<ResumeInteractionRequest>,
) -> ApiResult<SimpleMessageResponse> {
    let _permit = state.room_locks.acquire(&interaction_id).await.map_err(busy_err)?;
    let resumed = state.rooms.with_room(&interaction_id, |room| state.turn_engine.resume(room));

    resumed.ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    state.broadcaster.broadcast(
        &interaction_id,
        GameEvent::InteractionResumed {
            interaction_id: interaction_id.clone(),
            timestamp: Utc::now(),
        },
    );

    Ok(Json(SimpleMessageResponse {
        success: true,
        message: "interaction resumed".into(),
    }))
}
