//! GameEvent: the typed, validated event envelope fanned out to
//! subscribers. Every variant carries `interactionId` and `timestamp` in
//! addition to its payload, matching the wire envelope in §6.

use chrono::{DateTime, Utc};
use ia_domain::model::{ChatMessage, EntityType, InitiativeEntry};
use serde::{Deserialize, Serialize};

use crate::delta::StateDelta;
use crate::error::ErrorCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaBatch {
    pub deltas: Vec<StateDelta>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "batchId")]
    pub batch_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEvent {
    ParticipantJoined {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "entityId")]
        entity_id: String,
        #[serde(rename = "participantCount")]
        participant_count: usize,
    },
    ParticipantLeft {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "entityId")]
        entity_id: String,
    },
    TurnStarted {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        #[serde(rename = "entityId")]
        entity_id: String,
        #[serde(rename = "entityType")]
        entity_type: EntityType,
        #[serde(rename = "turnNumber")]
        turn_number: u32,
        #[serde(rename = "roundNumber")]
        round_number: u32,
        /// Non-negative seconds.
        #[serde(rename = "timeLimit")]
        time_limit: u64,
    },
    TurnCompleted {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        #[serde(rename = "entityId")]
        entity_id: String,
        #[serde(rename = "turnNumber")]
        turn_number: u32,
        #[serde(rename = "roundNumber")]
        round_number: u32,
    },
    TurnSkipped {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        #[serde(rename = "entityId")]
        entity_id: String,
        #[serde(rename = "turnNumber")]
        turn_number: u32,
        #[serde(rename = "roundNumber")]
        round_number: u32,
        reason: String,
    },
    StateDelta {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        batch: DeltaBatch,
    },
    ChatMessage {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        message: ChatMessage,
    },
    InitiativeUpdated {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        #[serde(rename = "initiativeOrder")]
        initiative_order: Vec<InitiativeEntry>,
    },
    InteractionPaused {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    InteractionResumed {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        timestamp: DateTime<Utc>,
        code: ErrorCode,
        message: String,
    },
}

impl GameEvent {
    pub fn interaction_id(&self) -> &str {
        match self {
            GameEvent::ParticipantJoined { interaction_id, .. }
            | GameEvent::ParticipantLeft { interaction_id, .. }
            | GameEvent::TurnStarted { interaction_id, .. }
            | GameEvent::TurnCompleted { interaction_id, .. }
            | GameEvent::TurnSkipped { interaction_id, .. }
            | GameEvent::StateDelta { interaction_id, .. }
            | GameEvent::ChatMessage { interaction_id, .. }
            | GameEvent::InitiativeUpdated { interaction_id, .. }
            | GameEvent::InteractionPaused { interaction_id, .. }
            | GameEvent::InteractionResumed { interaction_id, .. }
            | GameEvent::Error { interaction_id, .. } => interaction_id,
        }
    }

    /// The stable event-type string subscriptions filter on
    /// (`PARTICIPANT_JOINED`, `STATE_DELTA`, ...).
    pub fn type_str(&self) -> &'static str {
        match self {
            GameEvent::ParticipantJoined { .. } => "PARTICIPANT_JOINED",
            GameEvent::ParticipantLeft { .. } => "PARTICIPANT_LEFT",
            GameEvent::TurnStarted { .. } => "TURN_STARTED",
            GameEvent::TurnCompleted { .. } => "TURN_COMPLETED",
            GameEvent::TurnSkipped { .. } => "TURN_SKIPPED",
            GameEvent::StateDelta { .. } => "STATE_DELTA",
            GameEvent::ChatMessage { .. } => "CHAT_MESSAGE",
            GameEvent::InitiativeUpdated { .. } => "INITIATIVE_UPDATED",
            GameEvent::InteractionPaused { .. } => "INTERACTION_PAUSED",
            GameEvent::InteractionResumed { .. } => "INTERACTION_RESUMED",
            GameEvent::Error { .. } => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_str_matches_wire_tag() {
        let event = GameEvent::InteractionResumed {
            interaction_id: "i1".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"].as_str().unwrap(), event.type_str());
    }

    #[test]
    fn interaction_id_accessor() {
        let event = GameEvent::ParticipantLeft {
            interaction_id: "abc".into(),
            timestamp: Utc::now(),
            user_id: "u1".into(),
            entity_id: "e1".into(),
        };
        assert_eq!(event.interaction_id(), "abc");
    }
}
