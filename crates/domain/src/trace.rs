use serde::Serialize;

/// Structured trace events emitted across the interaction-gateway crates.
///
/// These are distinct from the wire-visible `GameEvent` envelope in
/// `ia-protocol` — they're for operational logging, not subscriber fan-out.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RoomCreated {
        interaction_id: String,
        room_id: String,
    },
    RoomDestroyed {
        interaction_id: String,
        reason: String,
    },
    ParticipantJoined {
        interaction_id: String,
        user_id: String,
        entity_id: String,
        reconnect: bool,
    },
    ParticipantLeft {
        interaction_id: String,
        user_id: String,
        grace_expired: bool,
    },
    TurnAdvanced {
        interaction_id: String,
        entity_id: String,
        turn_number: u32,
        round_number: u32,
        reason: String,
    },
    ActionRejected {
        interaction_id: String,
        entity_id: String,
        action: String,
        code: String,
    },
    SubscriberConnected {
        interaction_id: String,
        subscription_id: String,
        user_id: Option<String>,
    },
    SubscriberDisconnected {
        interaction_id: String,
        subscription_id: String,
        reason: String,
    },
    BatchFlushed {
        interaction_id: String,
        batch_id: String,
        message_count: usize,
        delta_count: usize,
    },
    SnapshotPersisted {
        interaction_id: String,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ia_event");
    }
}
