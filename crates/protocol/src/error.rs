//! Stable, wire-visible error codes and the `ApiError` envelope that
//! carries them on the RPC surface and in `ERROR` events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthenticated,
    Unauthorized,
    DmOnly,
    InvalidInput,
    RoomNotFound,
    ParticipantNotInRoom,
    ItemNotFound,
    InvalidTarget,
    GameNotActive,
    GamePaused,
    NotYourTurn,
    OutOfBounds,
    Blocked,
    Occupied,
    OutOfRange,
    NoLineOfSight,
    ConditionBlocksMove,
    ConditionBlocksAttack,
    CapacityExceeded,
    SubscriptionLimit,
    ContentTooLong,
    PersistenceFailed,
    BroadcastFailed,
}

impl ErrorCode {
    /// The stable string clients branch on (matches the serde wire form).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::DmOnly => "DM_ONLY",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorCode::ParticipantNotInRoom => "PARTICIPANT_NOT_IN_ROOM",
            ErrorCode::ItemNotFound => "ITEM_NOT_FOUND",
            ErrorCode::InvalidTarget => "INVALID_TARGET",
            ErrorCode::GameNotActive => "GAME_NOT_ACTIVE",
            ErrorCode::GamePaused => "GAME_PAUSED",
            ErrorCode::NotYourTurn => "NOT_YOUR_TURN",
            ErrorCode::OutOfBounds => "OUT_OF_BOUNDS",
            ErrorCode::Blocked => "BLOCKED",
            ErrorCode::Occupied => "OCCUPIED",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::NoLineOfSight => "NO_LINE_OF_SIGHT",
            ErrorCode::ConditionBlocksMove => "CONDITION_BLOCKS_MOVE",
            ErrorCode::ConditionBlocksAttack => "CONDITION_BLOCKS_ATTACK",
            ErrorCode::CapacityExceeded => "CAPACITY_EXCEEDED",
            ErrorCode::SubscriptionLimit => "SUBSCRIPTION_LIMIT",
            ErrorCode::ContentTooLong => "CONTENT_TOO_LONG",
            ErrorCode::PersistenceFailed => "PERSISTENCE_FAILED",
            ErrorCode::BroadcastFailed => "BROADCAST_FAILED",
        }
    }

    /// HTTP status most appropriate for this code on the REST surface.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Unauthenticated => 401,
            ErrorCode::Unauthorized | ErrorCode::DmOnly => 403,
            ErrorCode::InvalidInput
            | ErrorCode::ContentTooLong
            | ErrorCode::OutOfBounds
            | ErrorCode::Blocked
            | ErrorCode::Occupied
            | ErrorCode::OutOfRange
            | ErrorCode::NoLineOfSight
            | ErrorCode::ConditionBlocksMove
            | ErrorCode::ConditionBlocksAttack
            | ErrorCode::InvalidTarget
            | ErrorCode::ItemNotFound
            | ErrorCode::NotYourTurn
            | ErrorCode::GameNotActive
            | ErrorCode::GamePaused => 400,
            ErrorCode::RoomNotFound | ErrorCode::ParticipantNotInRoom => 404,
            ErrorCode::CapacityExceeded | ErrorCode::SubscriptionLimit => 429,
            ErrorCode::PersistenceFailed | ErrorCode::BroadcastFailed => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Uniform error envelope returned by every RPC operation and carried in
/// `ERROR` events: a stable code, a human message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
