//! Persistence contract implemented by `ia-persistence` and consumed by
//! `ia-engine`'s room manager. Kept here (rather than in either crate) so
//! neither needs to depend on the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::GameState;
use crate::Result;

/// Durable snapshot of a room, written periodically so a restarted server
/// (or a reconnecting participant) can resume without replaying history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(rename = "lastStateSnapshot")]
    pub last_state_snapshot: GameState,
    #[serde(rename = "snapshotTimestamp")]
    pub snapshot_timestamp: DateTime<Utc>,
    #[serde(rename = "connectedParticipants")]
    pub connected_participants: Vec<String>,
    #[serde(rename = "lastActivity")]
    pub last_activity: DateTime<Utc>,
}

/// One entry in the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(rename = "eventData")]
    pub event_data: Value,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(rename = "entityId", default)]
    pub entity_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load_snapshot(&self, interaction_id: &str) -> Result<Option<RoomSnapshot>>;
    async fn save_snapshot(&self, snapshot: &RoomSnapshot) -> Result<()>;
    async fn append_log(&self, entry: &AuditLogEntry) -> Result<()>;
}
