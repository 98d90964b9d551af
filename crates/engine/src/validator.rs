//! Pure action validation. No side effects, no suspension points: the same
//! logic runs server-authoritative and as the client-side predictor.

use ia_domain::config::RuleConfig;
use ia_domain::model::{GameState, GameStatus, TurnAction};
use ia_protocol::delta::{DeltaType, StateDelta};
use ia_protocol::rpc::ValidationResult;
use serde_json::json;

const MOVE_BLOCKING_CONDITIONS: &[&str] = &["paralyzed", "restrained", "grappled", "stunned"];
const ATTACK_BLOCKING_CONDITIONS: &[&str] = &["paralyzed", "stunned", "unconscious"];

/// Decide whether `action` is legal for `actor_user_id` against `state`,
/// and if so, the deltas applying it would produce.
pub fn validate(state: &GameState, actor_user_id: &str, action: &TurnAction, rules: &RuleConfig) -> ValidationResult {
    // Rule 1: game must be active (paused gets its own distinct code).
    match state.status {
        GameStatus::Active => {}
        GameStatus::Paused => return ValidationResult::reject("GAME_PAUSED"),
        GameStatus::Waiting | GameStatus::Completed => {
            return ValidationResult::reject("GAME_NOT_ACTIVE")
        }
    }

    let entity_id = action.entity_id();

    // Rule 2: must be the acting entity's turn.
    match state.active_entity_id() {
        Some(active) if active == entity_id => {}
        _ => return ValidationResult::reject("NOT_YOUR_TURN"),
    }

    // Rule 3: the entity must be owned by the calling user.
    let participant = match state.participants.get(entity_id) {
        Some(p) => p,
        None => return ValidationResult::reject("PARTICIPANT_NOT_IN_ROOM"),
    };
    if participant.user_id.as_deref() != Some(actor_user_id) {
        return ValidationResult::reject("UNAUTHORIZED");
    }

    match action {
        TurnAction::Move { position, .. } => {
            if !state.map_state.in_bounds(position) {
                return ValidationResult::reject("OUT_OF_BOUNDS");
            }
            if state.map_state.is_obstacle(position) {
                return ValidationResult::reject("BLOCKED");
            }
            if state.map_state.occupant_at(position, entity_id).is_some() {
                return ValidationResult::reject("OCCUPIED");
            }
            if participant.position.chebyshev_distance(position) > rules.movement_budget {
                return ValidationResult::reject("OUT_OF_RANGE");
            }
            if MOVE_BLOCKING_CONDITIONS.iter().any(|c| participant.has_condition(c)) {
                return ValidationResult::reject("CONDITION_BLOCKS_MOVE");
            }

            let mut changes = serde_json::Map::new();
            changes.insert("position".into(), json!(position));
            ValidationResult::ok(vec![StateDelta::new(DeltaType::Participant, changes).with_entity(entity_id)])
        }

        TurnAction::Attack { target, .. } => {
            if target == entity_id || !state.participants.contains_key(target) {
                return ValidationResult::reject("INVALID_TARGET");
            }
            let target_participant = &state.participants[target];
            if participant.position.manhattan_distance(&target_participant.position) > rules.attack_range {
                return ValidationResult::reject("OUT_OF_RANGE");
            }
            if !has_line_of_sight(state, &participant.position, &target_participant.position) {
                return ValidationResult::reject("NO_LINE_OF_SIGHT");
            }
            if ATTACK_BLOCKING_CONDITIONS.iter().any(|c| participant.has_condition(c)) {
                return ValidationResult::reject("CONDITION_BLOCKS_ATTACK");
            }

            // Damage resolution is outside this system's scope (no
            // attack-power literal is specified); legality only.
            ValidationResult::ok(Vec::new())
        }

        TurnAction::UseItem { item_id, .. } => {
            let item = match participant.inventory.find_item(item_id) {
                Some(item) => item,
                None => return ValidationResult::reject("ITEM_NOT_FOUND"),
            };
            let mut changes = serde_json::Map::new();
            changes.insert("itemInstanceId".into(), json!(item.id));
            changes.insert("quantity".into(), json!(item.quantity - 1));

            let mut deltas = vec![StateDelta::new(DeltaType::Participant, changes.clone()).with_entity(entity_id)];

            if is_healing_potion(item_id) {
                let healed = (participant.current_hp + rules.healing_amount).min(participant.max_hp);
                let mut hp_changes = serde_json::Map::new();
                hp_changes.insert("currentHP".into(), json!(healed));
                deltas.push(StateDelta::new(DeltaType::Participant, hp_changes).with_entity(entity_id));
            }

            ValidationResult::ok(deltas)
        }

        TurnAction::Cast { target, .. } => {
            // Minimum shape check only; deeper validation is deferred (§9).
            if let Some(target) = target {
                if !state.participants.contains_key(target) {
                    return ValidationResult::reject("INVALID_TARGET");
                }
            }
            ValidationResult::ok(Vec::new())
        }

        TurnAction::Interact { target, .. } => {
            if target.is_empty() {
                return ValidationResult::reject("INVALID_TARGET");
            }
            ValidationResult::ok(Vec::new())
        }

        TurnAction::End { .. } => ValidationResult::ok(Vec::new()),
    }
}

fn is_healing_potion(item_id: &str) -> bool {
    item_id.eq_ignore_ascii_case("healing-potion") || item_id.eq_ignore_ascii_case("healing_potion")
}

/// Bresenham line between `from` and `to`, excluding the endpoints; true if
/// no obstacle lies on the line.
fn has_line_of_sight(state: &GameState, from: &ia_domain::model::Position, to: &ia_domain::model::Position) -> bool {
    let (mut x0, mut y0) = (from.x, from.y);
    let (x1, y1) = (to.x, to.y);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if (x0, y0) != (from.x, from.y)
            && (x0, y0) != (x1, y1)
            && state.map_state.is_obstacle(&ia_domain::model::Position::new(x0, y0))
        {
            return false;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ia_domain::model::{
        EntityType, InitiativeEntry, InventoryItem, InventoryState, MapState, ParticipantState, Position, TurnStatus,
    };
    use std::collections::HashMap;

    fn base_state() -> GameState {
        let map = MapState {
            width: 20,
            height: 20,
            entities: HashMap::new(),
            obstacles: vec![Position::new(10, 10)],
            terrain: Vec::new(),
        };
        let mut state = GameState::new("i1", map);
        state.status = GameStatus::Active;
        state.initiative_order = vec![InitiativeEntry {
            entity_id: "p1".into(),
            entity_type: EntityType::PlayerCharacter,
            initiative: 15,
            user_id: Some("u1".into()),
        }];
        state.current_turn_index = 0;
        state.participants.insert(
            "p1".into(),
            ParticipantState {
                entity_id: "p1".into(),
                entity_type: EntityType::PlayerCharacter,
                user_id: Some("u1".into()),
                current_hp: 50,
                max_hp: 100,
                position: Position::new(5, 5),
                conditions: Vec::new(),
                inventory: InventoryState {
                    items: vec![InventoryItem {
                        id: "inst-1".into(),
                        item_id: "healing-potion".into(),
                        quantity: 2,
                        properties: HashMap::new(),
                    }],
                    equipped: HashMap::new(),
                    capacity: 10,
                },
                available_actions: Vec::new(),
                turn_status: TurnStatus::Active,
            },
        );
        state
    }

    #[test]
    fn bounds_reject() {
        let state = base_state();
        let action = TurnAction::Move {
            entity_id: "p1".into(),
            position: Position::new(25, 25),
        };
        let result = validate(&state, "u1", &action, &RuleConfig::default());
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["OUT_OF_BOUNDS".to_string()]);
    }

    #[test]
    fn obstacle_reject() {
        let state = base_state();
        let action = TurnAction::Move {
            entity_id: "p1".into(),
            position: Position::new(10, 10),
        };
        let result = validate(&state, "u1", &action, &RuleConfig::default());
        assert_eq!(result.errors, vec!["BLOCKED".to_string()]);
    }

    #[test]
    fn too_far_reject() {
        let state = base_state();
        let action = TurnAction::Move {
            entity_id: "p1".into(),
            position: Position::new(15, 15),
        };
        let result = validate(&state, "u1", &action, &RuleConfig::default());
        assert_eq!(result.errors, vec!["OUT_OF_RANGE".to_string()]);
    }

    #[test]
    fn healing_potion_heals_and_consumes() {
        let state = base_state();
        let action = TurnAction::UseItem {
            entity_id: "p1".into(),
            item_id: "healing-potion".into(),
        };
        let result = validate(&state, "u1", &action, &RuleConfig::default());
        assert!(result.valid);
        assert_eq!(result.deltas.len(), 2);
        let hp_delta = result.deltas.iter().find(|d| d.changes.contains_key("currentHP")).unwrap();
        assert_eq!(hp_delta.changes["currentHP"], json!(60));
        let qty_delta = result.deltas.iter().find(|d| d.changes.contains_key("quantity")).unwrap();
        assert_eq!(qty_delta.changes["quantity"], json!(1));
    }

    #[test]
    fn not_your_turn_when_not_active_entity() {
        let mut state = base_state();
        state.initiative_order.push(InitiativeEntry {
            entity_id: "m1".into(),
            entity_type: EntityType::Monster,
            initiative: 10,
            user_id: None,
        });
        let action = TurnAction::End { entity_id: "m1".into() };
        let result = validate(&state, "u1", &action, &RuleConfig::default());
        assert_eq!(result.errors, vec!["NOT_YOUR_TURN".to_string()]);
    }

    #[test]
    fn unauthorized_when_user_does_not_own_entity() {
        let state = base_state();
        let action = TurnAction::End { entity_id: "p1".into() };
        let result = validate(&state, "someone-else", &action, &RuleConfig::default());
        assert_eq!(result.errors, vec!["UNAUTHORIZED".to_string()]);
    }

    #[test]
    fn paused_game_rejects_with_game_paused() {
        let mut state = base_state();
        state.status = GameStatus::Paused;
        let action = TurnAction::End { entity_id: "p1".into() };
        let result = validate(&state, "u1", &action, &RuleConfig::default());
        assert_eq!(result.errors, vec!["GAME_PAUSED".to_string()]);
    }

    #[test]
    fn condition_blocks_move() {
        let mut state = base_state();
        state.participants.get_mut("p1").unwrap().conditions.push(ia_domain::model::StatusEffect {
            id: "c1".into(),
            name: "stunned".into(),
            duration: 2,
            effects: HashMap::new(),
        });
        let action = TurnAction::Move {
            entity_id: "p1".into(),
            position: Position::new(6, 5),
        };
        let result = validate(&state, "u1", &action, &RuleConfig::default());
        assert_eq!(result.errors, vec!["CONDITION_BLOCKS_MOVE".to_string()]);
    }

    #[test]
    fn end_is_always_legal_when_turn_order_checks_pass() {
        let state = base_state();
        let action = TurnAction::End { entity_id: "p1".into() };
        let result = validate(&state, "u1", &action, &RuleConfig::default());
        assert!(result.valid);
    }

    #[test]
    fn validator_is_referentially_transparent() {
        let state = base_state();
        let cloned = state.clone();
        let action = TurnAction::Move {
            entity_id: "p1".into(),
            position: Position::new(6, 5),
        };
        let r1 = validate(&state, "u1", &action, &RuleConfig::default());
        let r2 = validate(&cloned, "u1", &action, &RuleConfig::default());
        assert_eq!(r1.valid, r2.valid);
        assert_eq!(r1.errors, r2.errors);
    }
}
