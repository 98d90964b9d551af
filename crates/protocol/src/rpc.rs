//! Request/response schemas for the RPC surface in §6: the chat router and
//! the interaction router.

use chrono::{DateTime, Utc};
use ia_domain::model::{ChatMessage, ChatMessageType, EntityType, GameState, RoomStatus, TurnAction};
use serde::{Deserialize, Serialize};

use crate::delta::StateDelta;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStats {
    pub rooms: usize,
    pub subscriptions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub stats: HealthStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub success: bool,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "gameState")]
    pub game_state: GameState,
    #[serde(rename = "participantCount")]
    pub participant_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRoomRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleMessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseInteractionRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseInteractionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeInteractionRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub deltas: Vec<StateDelta>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok(deltas: Vec<StateDelta>) -> Self {
        Self {
            valid: true,
            deltas,
            errors: Vec::new(),
        }
    }

    pub fn reject(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            deltas: Vec::new(),
            errors: vec![error.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeTurnRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(flatten)]
    pub action: TurnAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeTurnResponse {
    pub success: bool,
    pub result: ValidationResult,
    #[serde(rename = "gameState")]
    pub game_state: GameState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipTurnRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipTurnResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "gameState")]
    pub game_state: GameState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktrackTurnRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(rename = "turnNumber")]
    pub turn_number: u32,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktrackTurnResponse {
    pub success: bool,
    #[serde(rename = "turnNumber")]
    pub turn_number: u32,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRoomStateRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRoomStateResponse {
    pub success: bool,
    #[serde(rename = "gameState")]
    pub game_state: GameState,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "participantCount")]
    pub participant_count: usize,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomUpdatesRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendChatMessageRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: ChatMessageType,
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
    #[serde(rename = "entityId", default)]
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendChatMessageResponse {
    pub success: bool,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetChatHistoryRequest {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(rename = "channelType", default)]
    pub channel_type: Option<ChatMessageType>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetChatHistoryResponse {
    pub success: bool,
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "totalCount")]
    pub total_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_result_ok_has_no_errors() {
        let result = ValidationResult::ok(Vec::new());
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn validation_result_reject_carries_error() {
        let result = ValidationResult::reject("OUT_OF_BOUNDS");
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["OUT_OF_BOUNDS".to_string()]);
    }

    #[test]
    fn take_turn_request_flattens_action() {
        let json = serde_json::json!({
            "interactionId": "i1",
            "type": "end",
            "entityId": "e1",
        });
        let req: TakeTurnRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.interaction_id, "i1");
        assert_eq!(req.action.entity_id(), "e1");
    }
}
