//! Authoritative data model for a live interaction: positions, participants,
//! turn records, chat, and the per-room `GameState` that the turn engine
//! mutates. Mirrors the canonical wire shape — mappings keyed by `entityId`,
//! never parallel lists.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(&self, other: &Position) -> i64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn chebyshev_distance(&self, other: &Position) -> i64 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEffect {
    pub id: String,
    pub name: String,
    /// Turns remaining; 0 means it expires at the next tick.
    pub duration: u32,
    #[serde(default)]
    pub effects: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Stable instance id (distinct copies of the same template).
    pub id: String,
    #[serde(rename = "itemId")]
    pub item_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryState {
    pub items: Vec<InventoryItem>,
    /// slotName -> equipped item instance id.
    #[serde(default)]
    pub equipped: HashMap<String, String>,
    pub capacity: u32,
}

impl InventoryState {
    pub fn find_item(&self, item_id: &str) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.item_id == item_id && i.quantity > 0)
    }

    pub fn find_item_mut(&mut self, item_id: &str) -> Option<&mut InventoryItem> {
        self.items.iter_mut().find(|i| i.item_id == item_id && i.quantity > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Move,
    Attack,
    UseItem,
    Cast,
    Interact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequirement {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
    pub met: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub available: bool,
    #[serde(default)]
    pub requirements: Vec<ActionRequirement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    PlayerCharacter,
    Npc,
    Monster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnStatus {
    Waiting,
    Active,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantState {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(rename = "currentHP")]
    pub current_hp: i64,
    #[serde(rename = "maxHP")]
    pub max_hp: i64,
    pub position: Position,
    #[serde(default)]
    pub conditions: Vec<StatusEffect>,
    #[serde(default)]
    pub inventory: InventoryState,
    #[serde(rename = "availableActions", default)]
    pub available_actions: Vec<Action>,
    #[serde(rename = "turnStatus")]
    pub turn_status: TurnStatus,
}

impl ParticipantState {
    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.iter().any(|c| c.name == name)
    }

    pub fn heal(&mut self, amount: i64) {
        self.current_hp = (self.current_hp + amount).min(self.max_hp);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiativeEntry {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    pub initiative: i64,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEntity {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub position: Position,
    #[serde(default)]
    pub facing: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainTile {
    pub position: Position,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapState {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub entities: HashMap<String, MapEntity>,
    #[serde(default)]
    pub obstacles: Vec<Position>,
    #[serde(default)]
    pub terrain: Vec<TerrainTile>,
}

impl MapState {
    pub fn in_bounds(&self, pos: &Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    pub fn is_obstacle(&self, pos: &Position) -> bool {
        self.obstacles.contains(pos)
    }

    pub fn occupant_at(&self, pos: &Position, excluding: &str) -> Option<&str> {
        self.entities
            .values()
            .find(|e| e.position == *pos && e.entity_id != excluding)
            .map(|e| e.entity_id.as_str())
    }
}

/// Input action a client submits for the current actor's turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TurnAction {
    Move {
        #[serde(rename = "entityId")]
        entity_id: String,
        position: Position,
    },
    Attack {
        #[serde(rename = "entityId")]
        entity_id: String,
        target: String,
    },
    UseItem {
        #[serde(rename = "entityId")]
        entity_id: String,
        #[serde(rename = "itemId")]
        item_id: String,
    },
    Cast {
        #[serde(rename = "entityId")]
        entity_id: String,
        #[serde(rename = "spellId")]
        spell_id: String,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        position: Option<Position>,
    },
    Interact {
        #[serde(rename = "entityId")]
        entity_id: String,
        target: String,
    },
    End {
        #[serde(rename = "entityId")]
        entity_id: String,
    },
}

impl TurnAction {
    pub fn entity_id(&self) -> &str {
        match self {
            TurnAction::Move { entity_id, .. }
            | TurnAction::Attack { entity_id, .. }
            | TurnAction::UseItem { entity_id, .. }
            | TurnAction::Cast { entity_id, .. }
            | TurnAction::Interact { entity_id, .. }
            | TurnAction::End { entity_id } => entity_id,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            TurnAction::Move { .. } => "move",
            TurnAction::Attack { .. } => "attack",
            TurnAction::UseItem { .. } => "useItem",
            TurnAction::Cast { .. } => "cast",
            TurnAction::Interact { .. } => "interact",
            TurnAction::End { .. } => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnRecordStatus {
    Completed,
    Skipped,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(rename = "turnNumber")]
    pub turn_number: u32,
    #[serde(rename = "roundNumber")]
    pub round_number: u32,
    #[serde(default)]
    pub actions: Vec<TurnAction>,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime", default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: TurnRecordStatus,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageType {
    Party,
    Dm,
    Private,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "entityId", default)]
    pub entity_id: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: ChatMessageType,
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    pub status: GameStatus,
    #[serde(rename = "initiativeOrder", default)]
    pub initiative_order: Vec<InitiativeEntry>,
    #[serde(rename = "currentTurnIndex", default)]
    pub current_turn_index: usize,
    #[serde(rename = "roundNumber", default = "one")]
    pub round_number: u32,
    #[serde(default)]
    pub participants: HashMap<String, ParticipantState>,
    #[serde(rename = "mapState")]
    pub map_state: MapState,
    #[serde(rename = "turnHistory", default)]
    pub turn_history: Vec<TurnRecord>,
    #[serde(rename = "chatLog", default)]
    pub chat_log: Vec<ChatMessage>,
    pub timestamp: DateTime<Utc>,
}

fn one() -> u32 {
    1
}

impl GameState {
    pub fn new(interaction_id: impl Into<String>, map_state: MapState) -> Self {
        Self {
            interaction_id: interaction_id.into(),
            status: GameStatus::Waiting,
            initiative_order: Vec::new(),
            current_turn_index: 0,
            round_number: 1,
            participants: HashMap::new(),
            map_state,
            turn_history: Vec::new(),
            chat_log: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// The entity whose turn it currently is, if the initiative order is non-empty.
    pub fn active_entity_id(&self) -> Option<&str> {
        self.initiative_order
            .get(self.current_turn_index)
            .map(|e| e.entity_id.as_str())
    }

    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Idle,
    Live,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(rename = "connectionId")]
    pub connection_id: String,
    #[serde(rename = "isConnected")]
    pub is_connected: bool,
    #[serde(rename = "lastActivity")]
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(default)]
    pub participants: HashMap<String, Participant>,
    #[serde(rename = "gameState")]
    pub game_state: GameState,
    pub status: RoomStatus,
    #[serde(rename = "lastActivity")]
    pub last_activity: DateTime<Utc>,
    #[serde(rename = "currentTurnDeadline", default)]
    pub current_turn_deadline: Option<DateTime<Utc>>,
}

impl Room {
    pub fn new(interaction_id: impl Into<String>, map_state: MapState) -> Self {
        let interaction_id = interaction_id.into();
        let now = Utc::now();
        Self {
            room_id: uuid::Uuid::new_v4().to_string(),
            game_state: GameState::new(interaction_id.clone(), map_state),
            interaction_id,
            participants: HashMap::new(),
            status: RoomStatus::Idle,
            last_activity: now,
            current_turn_deadline: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_distances() {
        let a = Position::new(0, 0);
        let b = Position::new(3, 4);
        assert_eq!(a.manhattan_distance(&b), 7);
        assert_eq!(a.chebyshev_distance(&b), 4);
    }

    #[test]
    fn heal_clamps_to_max_hp() {
        let mut p = ParticipantState {
            entity_id: "e1".into(),
            entity_type: EntityType::PlayerCharacter,
            user_id: Some("u1".into()),
            current_hp: 95,
            max_hp: 100,
            position: Position::new(0, 0),
            conditions: Vec::new(),
            inventory: InventoryState::default(),
            available_actions: Vec::new(),
            turn_status: TurnStatus::Active,
        };
        p.heal(10);
        assert_eq!(p.current_hp, 100);
    }

    #[test]
    fn map_state_bounds_and_obstacles() {
        let map = MapState {
            width: 10,
            height: 10,
            entities: HashMap::new(),
            obstacles: vec![Position::new(5, 5)],
            terrain: Vec::new(),
        };
        assert!(map.in_bounds(&Position::new(9, 9)));
        assert!(!map.in_bounds(&Position::new(10, 0)));
        assert!(map.is_obstacle(&Position::new(5, 5)));
        assert!(!map.is_obstacle(&Position::new(5, 6)));
    }

    #[test]
    fn game_state_new_is_waiting_round_one() {
        let map = MapState {
            width: 5,
            height: 5,
            entities: HashMap::new(),
            obstacles: Vec::new(),
            terrain: Vec::new(),
        };
        let state = GameState::new("interaction-1", map);
        assert_eq!(state.status, GameStatus::Waiting);
        assert_eq!(state.round_number, 1);
        assert_eq!(state.current_turn_index, 0);
        assert!(state.active_entity_id().is_none());
    }
}
