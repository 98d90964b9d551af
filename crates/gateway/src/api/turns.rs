use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use ia_domain::trace::TraceEvent;
use ia_protocol::event::GameEvent;
use ia_protocol::rpc::{BacktrackTurnRequest, BacktrackTurnResponse, SkipTurnRequest, SkipTurnResponse, TakeTurnRequest, TakeTurnResponse};

use super::{busy_err, domain_err, require_user_id, ApiErrorResponse, ApiResult};
use crate::state::AppState;

pub async fn take_turn(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TakeTurnRequest>,
) -> ApiResult<TakeTurnResponse> {
    let user_id = require_user_id(&headers)?;
    let _permit = state.room_locks.acquire(&interaction_id).await.map_err(busy_err)?;

    let outcome = state
        .rooms
        .with_room(&interaction_id, |room| state.turn_engine.apply_action(room, &user_id, req.action.clone()))
        .ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    let (game_state, _, _) = state
        .rooms
        .get_room_state(&interaction_id)
        .ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    if !outcome.validation.valid {
        if let Some(code) = outcome.validation.errors.first() {
            TraceEvent::ActionRejected {
                interaction_id: interaction_id.clone(),
                entity_id: req.action.entity_id().to_owned(),
                action: req.action.kind_str().to_owned(),
                code: code.clone(),
            }
            .emit();
        }
    }

    if outcome.validation.valid {
        for delta in &outcome.validation.deltas {
            state.batcher.enqueue(&interaction_id, delta.clone(), 5);
        }

        if outcome.turn_advanced {
            if let Some(record) = game_state.turn_history.last() {
                state.broadcaster.broadcast(
                    &interaction_id,
                    GameEvent::TurnCompleted {
                        interaction_id: interaction_id.clone(),
                        timestamp: Utc::now(),
                        entity_id: record.entity_id.clone(),
                        turn_number: record.turn_number,
                        round_number: record.round_number,
                    },
                );
            }
            if let Some(next_entity) = game_state.active_entity_id() {
                if let Some(participant) = game_state.participants.get(next_entity) {
                    state.broadcaster.broadcast(
                        &interaction_id,
                        GameEvent::TurnStarted {
                            interaction_id: interaction_id.clone(),
                            timestamp: Utc::now(),
                            entity_id: next_entity.to_owned(),
                            entity_type: participant.entity_type,
                            turn_number: game_state.turn_history.len() as u32 + 1,
                            round_number: game_state.round_number,
                        },
                    );
                }
            }
        }
    }

    Ok(Json(TakeTurnResponse {
        success: outcome.validation.valid,
        result: outcome.validation,
        game_state,
    }))
}

pub async fn skip_turn(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SkipTurnRequest>,
) -> ApiResult<SkipTurnResponse> {
    let _permit = state.room_locks.acquire(&interaction_id).await.map_err(busy_err)?;

    let game_state = state
        .rooms
        .with_room(&interaction_id, |room| {
            state.turn_engine.skip_turn(room, req.reason.clone());
            room.game_state.clone()
        })
        .ok_or_else(|| domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone())))?;

    if let Some(record) = game_state.turn_history.last() {
        state.broadcaster.broadcast(
            &interaction_id,
            GameEvent::TurnSkipped {
                interaction_id: interaction_id.clone(),
                timestamp: Utc::now(),
                entity_id: record.entity_id.clone(),
                turn_number: record.turn_number,
                round_number: record.round_number,
                reason: req.reason.clone().unwrap_or_else(|| "skipped by DM".into()),
            },
        );
    }

    Ok(Json(SkipTurnResponse {
        success: true,
        message: "turn skipped".into(),
        game_state,
    }))
}

pub async fn backtrack_turn(
    Path(interaction_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<BacktrackTurnRequest>,
) -> ApiResult<BacktrackTurnResponse> {
    let _permit = state.room_locks.acquire(&interaction_id).await.map_err(busy_err)?;

    let result = state
        .rooms
        .with_room(&interaction_id, |room| state.turn_engine.backtrack(room, req.turn_number));

    match result {
        None => Err(domain_err(ia_domain::Error::RoomNotFound(interaction_id.clone()))),
        Some(Err(err)) => Err(ApiErrorResponse(ia_protocol::error::ApiError::new(
            ia_protocol::error::ErrorCode::InvalidInput,
            err.to_string(),
        ))),
        Some(Ok(())) => {
            let initiative_order = state
                .rooms
                .get_room_state(&interaction_id)
                .map(|(gs, _, _)| gs.initiative_order)
                .unwrap_or_default();
            state.broadcaster.broadcast(
                &interaction_id,
                GameEvent::InitiativeUpdated {
                    interaction_id: interaction_id.clone(),
                    timestamp: Utc::now(),
                    initiative_order,
                },
            );

            Ok(Json(BacktrackTurnResponse {
                success: true,
                turn_number: req.turn_number,
                reason: req.reason,
            }))
        }
    }
}
