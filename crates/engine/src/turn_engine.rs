//! Turn state machine: applies validated actions to `GameState`, advances
//! initiative, and enforces per-turn time budgets.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use ia_domain::model::{
    GameStatus, InitiativeEntry, Position, Room, TurnAction, TurnRecord, TurnRecordStatus, TurnStatus,
};
use ia_domain::trace::TraceEvent;
use ia_protocol::delta::StateDelta;
use ia_protocol::rpc::ValidationResult;
use parking_lot::Mutex;

use crate::validator;

/// Result of submitting one action against a room's current turn.
pub struct TurnOutcome {
    pub validation: ValidationResult,
    /// True if accepting this action ended the turn (an `end` action, or a
    /// server-driven skip/timeout).
    pub turn_advanced: bool,
}

pub struct TurnEngine {
    rules: ia_domain::config::RuleConfig,
    turn_time_limit: Duration,
    /// Actions accepted so far in the entity's current turn, keyed by
    /// `interactionId`. Flushed into a `TurnRecord` on advance.
    pending_actions: Mutex<HashMap<String, Vec<TurnAction>>>,
}

impl TurnEngine {
    pub fn new(rules: ia_domain::config::RuleConfig, turn_time_limit: Duration) -> Self {
        Self {
            rules,
            turn_time_limit,
            pending_actions: Mutex::new(HashMap::new()),
        }
    }

    /// Seed `initiative_order` for a fresh game, sorted by initiative
    /// descending; ties broken by entity id for determinism.
    pub fn roll_initiative(&self, mut entries: Vec<InitiativeEntry>) -> Vec<InitiativeEntry> {
        entries.sort_by(|a, b| b.initiative.cmp(&a.initiative).then_with(|| a.entity_id.cmp(&b.entity_id)));
        entries
    }

    /// Validate and, if legal, apply `action` to `room`. Callers must hold
    /// the room's lock (see [`crate::room_lock::RoomLockMap`]) for the
    /// duration of this call.
    pub fn apply_action(&self, room: &mut Room, actor_user_id: &str, action: TurnAction) -> TurnOutcome {
        let validation = validator::validate(&room.game_state, actor_user_id, &action, &self.rules);
        if !validation.valid {
            return TurnOutcome {
                validation,
                turn_advanced: false,
            };
        }

        for delta in &validation.deltas {
            apply_delta(room, delta);
        }

        self.pending_actions
            .lock()
            .entry(room.interaction_id.clone())
            .or_default()
            .push(action.clone());

        let turn_advanced = matches!(action, TurnAction::End { .. });
        if turn_advanced {
            self.finish_turn(room, TurnRecordStatus::Completed, None);
        }

        TurnOutcome {
            validation,
            turn_advanced,
        }
    }

    /// Force the active entity's turn to end without requiring an `end`
    /// action — used for server-driven timeouts and DM-issued skips.
    pub fn skip_turn(&self, room: &mut Room, reason: Option<String>) {
        self.finish_turn(room, TurnRecordStatus::Skipped, reason);
    }

    /// Force the active entity's turn to end because its time budget
    /// elapsed.
    pub fn timeout_turn(&self, room: &mut Room) {
        self.finish_turn(room, TurnRecordStatus::Timeout, Some("turn time limit exceeded".into()));
    }

    fn finish_turn(&self, room: &mut Room, status: TurnRecordStatus, reason: Option<String>) {
        let Some(active) = room.game_state.active_entity_id().map(str::to_owned) else {
            return;
        };
        let entity_type = room
            .game_state
            .participants
            .get(&active)
            .map(|p| p.entity_type)
            .unwrap_or(ia_domain::model::EntityType::Npc);
        let user_id = room.game_state.participants.get(&active).and_then(|p| p.user_id.clone());

        let actions = self
            .pending_actions
            .lock()
            .remove(&room.interaction_id)
            .unwrap_or_default();

        let turn_number = room.game_state.turn_history.len() as u32 + 1;
        let record = TurnRecord {
            interaction_id: room.interaction_id.clone(),
            entity_id: active.clone(),
            entity_type,
            turn_number,
            round_number: room.game_state.round_number,
            actions,
            start_time: room
                .current_turn_deadline
                .map(|d| d - chrono::Duration::from_std(self.turn_time_limit).unwrap_or_default())
                .unwrap_or_else(Utc::now),
            end_time: Some(Utc::now()),
            status,
            user_id,
        };
        room.game_state.turn_history.push(record);

        if let Some(participant) = room.game_state.participants.get_mut(&active) {
            participant.turn_status = match status {
                TurnRecordStatus::Completed => TurnStatus::Completed,
                TurnRecordStatus::Skipped | TurnRecordStatus::Timeout => TurnStatus::Skipped,
            };
        }

        TraceEvent::TurnAdvanced {
            interaction_id: room.interaction_id.clone(),
            entity_id: active,
            turn_number,
            round_number: room.game_state.round_number,
            reason: reason.unwrap_or_else(|| format!("{status:?}").to_lowercase()),
        }
        .emit();

        self.advance_turn(room);
    }

    /// Move `current_turn_index` forward, wrapping to the next round, and
    /// arm the next turn's deadline.
    pub fn advance_turn(&self, room: &mut Room) {
        if room.game_state.initiative_order.is_empty() {
            return;
        }
        let next = room.game_state.current_turn_index + 1;
        if next >= room.game_state.initiative_order.len() {
            room.game_state.current_turn_index = 0;
            room.game_state.round_number += 1;
        } else {
            room.game_state.current_turn_index = next;
        }
        if let Some(next_entity) = room.game_state.active_entity_id() {
            if let Some(participant) = room.game_state.participants.get_mut(next_entity) {
                participant.turn_status = TurnStatus::Active;
            }
        }
        room.current_turn_deadline = Some(Utc::now() + chrono::Duration::from_std(self.turn_time_limit).unwrap_or_default());
        room.game_state.touch();
    }

    /// Whether the active turn's deadline has passed.
    pub fn is_overdue(&self, room: &Room) -> bool {
        room.game_state.status == GameStatus::Active
            && room
                .current_turn_deadline
                .is_some_and(|deadline| Utc::now() >= deadline)
    }

    pub fn pause(&self, room: &mut Room) {
        room.game_state.status = GameStatus::Paused;
        room.current_turn_deadline = None;
        room.game_state.touch();
    }

    pub fn resume(&self, room: &mut Room) {
        room.game_state.status = GameStatus::Active;
        room.current_turn_deadline = Some(Utc::now() + chrono::Duration::from_std(self.turn_time_limit).unwrap_or_default());
        room.game_state.touch();
    }

    /// Truncate history back to (and excluding) `turn_number`, and rewind
    /// initiative bookkeeping to match. Per-entity HP/inventory/position are
    /// deliberately NOT rewound (see `DESIGN.md`): this restores *whose*
    /// turn it is, not the game's prior material state.
    pub fn backtrack(&self, room: &mut Room, turn_number: u32) -> Result<(), ia_domain::Error> {
        if turn_number == 0 || turn_number as usize > room.game_state.turn_history.len() {
            return Err(ia_domain::Error::Other(format!("no such turn number: {turn_number}")));
        }
        room.game_state.turn_history.truncate((turn_number - 1) as usize);
        self.pending_actions.lock().remove(&room.interaction_id);

        match room.game_state.turn_history.last() {
            Some(last) => {
                room.game_state.round_number = last.round_number;
                if let Some(idx) = room
                    .game_state
                    .initiative_order
                    .iter()
                    .position(|e| e.entity_id == last.entity_id)
                {
                    room.game_state.current_turn_index = idx;
                }
            }
            None => {
                room.game_state.current_turn_index = 0;
                room.game_state.round_number = 1;
            }
        }
        room.current_turn_deadline = Some(Utc::now() + chrono::Duration::from_std(self.turn_time_limit).unwrap_or_default());
        room.game_state.touch();
        Ok(())
    }
}

fn apply_delta(room: &mut Room, delta: &StateDelta) {
    let Some(entity_id) = &delta.entity_id else { return };
    let Some(participant) = room.game_state.participants.get_mut(entity_id) else {
        return;
    };

    if let Some(value) = delta.changes.get("position") {
        if let Ok(pos) = serde_json::from_value::<Position>(value.clone()) {
            if let Some(map_entity) = room.game_state.map_state.entities.get_mut(entity_id) {
                map_entity.position = pos;
            }
            participant.position = pos;
        }
    }
    if let Some(value) = delta.changes.get("currentHP") {
        if let Some(hp) = value.as_i64() {
            participant.current_hp = hp;
        }
    }
    if let (Some(instance_id), Some(qty)) = (
        delta.changes.get("itemInstanceId").and_then(|v| v.as_str()),
        delta.changes.get("quantity").and_then(|v| v.as_u64()),
    ) {
        if let Some(item) = participant.inventory.items.iter_mut().find(|i| i.id == instance_id) {
            item.quantity = qty as u32;
        }
        participant.inventory.items.retain(|i| i.quantity > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ia_domain::model::{EntityType, GameState, InventoryState, MapState, ParticipantState};
    use std::collections::HashMap as StdHashMap;

    fn room_with_two_participants() -> Room {
        let map = MapState {
            width: 20,
            height: 20,
            entities: StdHashMap::new(),
            obstacles: Vec::new(),
            terrain: Vec::new(),
        };
        let mut room = Room::new("i1", map);
        room.game_state.status = GameStatus::Active;
        room.game_state.initiative_order = vec![
            InitiativeEntry {
                entity_id: "p1".into(),
                entity_type: EntityType::PlayerCharacter,
                initiative: 18,
                user_id: Some("u1".into()),
            },
            InitiativeEntry {
                entity_id: "p2".into(),
                entity_type: EntityType::PlayerCharacter,
                initiative: 12,
                user_id: Some("u2".into()),
            },
        ];
        for (id, user) in [("p1", "u1"), ("p2", "u2")] {
            room.game_state.participants.insert(
                id.into(),
                ParticipantState {
                    entity_id: id.into(),
                    entity_type: EntityType::PlayerCharacter,
                    user_id: Some(user.into()),
                    current_hp: 50,
                    max_hp: 100,
                    position: Position::new(1, 1),
                    conditions: Vec::new(),
                    inventory: InventoryState::default(),
                    available_actions: Vec::new(),
                    turn_status: TurnStatus::Waiting,
                },
            );
        }
        room.game_state.current_turn_index = 0;
        room.current_turn_deadline = Some(Utc::now() + chrono::Duration::seconds(90));
        room
    }

    fn engine() -> TurnEngine {
        TurnEngine::new(ia_domain::config::RuleConfig::default(), Duration::from_secs(90))
    }

    #[test]
    fn roll_initiative_sorts_descending() {
        let engine = engine();
        let entries = vec![
            InitiativeEntry {
                entity_id: "a".into(),
                entity_type: EntityType::PlayerCharacter,
                initiative: 5,
                user_id: None,
            },
            InitiativeEntry {
                entity_id: "b".into(),
                entity_type: EntityType::Monster,
                initiative: 19,
                user_id: None,
            },
        ];
        let sorted = engine.roll_initiative(entries);
        assert_eq!(sorted[0].entity_id, "b");
        assert_eq!(sorted[1].entity_id, "a");
    }

    #[test]
    fn end_action_advances_turn_and_records_history() {
        let engine = engine();
        let mut room = room_with_two_participants();
        let outcome = engine.apply_action(&mut room, "u1", TurnAction::End { entity_id: "p1".into() });
        assert!(outcome.validation.valid);
        assert!(outcome.turn_advanced);
        assert_eq!(room.game_state.current_turn_index, 1);
        assert_eq!(room.game_state.turn_history.len(), 1);
        assert_eq!(room.game_state.turn_history[0].status, TurnRecordStatus::Completed);
    }

    #[test]
    fn wraps_to_next_round_after_last_entity() {
        let engine = engine();
        let mut room = room_with_two_participants();
        room.game_state.current_turn_index = 1;
        engine.apply_action(&mut room, "u2", TurnAction::End { entity_id: "p2".into() });
        assert_eq!(room.game_state.current_turn_index, 0);
        assert_eq!(room.game_state.round_number, 2);
    }

    #[test]
    fn move_action_mutates_position_without_ending_turn() {
        let engine = engine();
        let mut room = room_with_two_participants();
        let outcome = engine.apply_action(
            &mut room,
            "u1",
            TurnAction::Move {
                entity_id: "p1".into(),
                position: Position::new(3, 1),
            },
        );
        assert!(outcome.validation.valid);
        assert!(!outcome.turn_advanced);
        assert_eq!(room.game_state.participants["p1"].position, Position::new(3, 1));
        assert_eq!(room.game_state.current_turn_index, 0);
    }

    #[test]
    fn pause_clears_deadline_and_resume_rearms_it() {
        let engine = engine();
        let mut room = room_with_two_participants();
        engine.pause(&mut room);
        assert_eq!(room.game_state.status, GameStatus::Paused);
        assert!(room.current_turn_deadline.is_none());
        engine.resume(&mut room);
        assert_eq!(room.game_state.status, GameStatus::Active);
        assert!(room.current_turn_deadline.is_some());
    }

    #[test]
    fn overdue_detection() {
        let engine = engine();
        let mut room = room_with_two_participants();
        room.current_turn_deadline = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(engine.is_overdue(&room));
        engine.pause(&mut room);
        assert!(!engine.is_overdue(&room));
    }

    #[test]
    fn backtrack_rewinds_turn_index_not_participant_state() {
        let engine = engine();
        let mut room = room_with_two_participants();
        engine.apply_action(&mut room, "u1", TurnAction::End { entity_id: "p1".into() });
        engine.apply_action(
            &mut room,
            "u1",
            TurnAction::UseItem {
                entity_id: "p2".into(),
                item_id: "healing-potion".into(),
            },
        );
        engine.apply_action(&mut room, "u2", TurnAction::End { entity_id: "p2".into() });
        assert_eq!(room.game_state.turn_history.len(), 2);

        engine.backtrack(&mut room, 1).unwrap();
        assert_eq!(room.game_state.turn_history.len(), 0);
        assert_eq!(room.game_state.current_turn_index, 0);
        // HP is untouched by backtrack even though a heal wasn't applied here.
        assert_eq!(room.game_state.participants["p1"].current_hp, 50);
    }

    #[test]
    fn backtrack_rejects_out_of_range_turn_number() {
        let engine = engine();
        let mut room = room_with_two_participants();
        assert!(engine.backtrack(&mut room, 5).is_err());
    }
}
