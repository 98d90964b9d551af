//! Room lifecycle: join/leave/reattach, capacity enforcement, dirty
//! tracking for periodic snapshot persistence, and inactivity sweeps.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ia_domain::config::RoomConfig;
use ia_domain::model::{EntityType, GameState, MapState, Participant, Room, RoomStatus};
use ia_domain::persistence::{RoomSnapshot, SnapshotStore};
use ia_domain::trace::TraceEvent;
use ia_domain::{Error, Result};
use parking_lot::{Mutex, RwLock};

/// Outcome of a `joinRoom` call: whether this created a fresh room, or
/// reattached an existing (possibly disconnected) participant to one.
pub struct JoinOutcome {
    pub room_id: String,
    pub game_state: GameState,
    pub participant_count: usize,
    pub reattached: bool,
}

pub struct RoomManager {
    rooms: RwLock<HashMap<String, Room>>,
    config: RoomConfig,
    store: Option<Arc<dyn SnapshotStore>>,
    dirty: Mutex<HashSet<String>>,
}

impl RoomManager {
    pub fn new(config: RoomConfig, store: Option<Arc<dyn SnapshotStore>>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
            store,
            dirty: Mutex::new(HashSet::new()),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Snapshot of currently-tracked room keys, for background tasks that
    /// need to iterate every room (turn-timeout sweeps, batcher flushing).
    pub fn interaction_ids(&self) -> Vec<String> {
        self.rooms.read().keys().cloned().collect()
    }

    /// Create the room on first join, hydrating from a persisted snapshot
    /// when one exists; reattach an existing participant's connection
    /// otherwise. Mirrors §4.1's `joinRoom`.
    pub async fn join_room(
        &self,
        interaction_id: &str,
        user_id: &str,
        entity_id: &str,
        entity_type: EntityType,
        connection_id: &str,
    ) -> Result<JoinOutcome> {
        if !self.rooms.read().contains_key(interaction_id) {
            let room = self.hydrate_room(interaction_id).await?;
            let mut rooms = self.rooms.write();
            if !rooms.contains_key(interaction_id) {
                if rooms.len() >= self.config.max_rooms_per_server {
                    return Err(Error::CapacityExceeded(format!(
                        "max_rooms_per_server ({}) reached",
                        self.config.max_rooms_per_server
                    )));
                }
                let room_id = room.room_id.clone();
                rooms.insert(interaction_id.to_owned(), room);
                drop(rooms);
                TraceEvent::RoomCreated {
                    interaction_id: interaction_id.to_owned(),
                    room_id,
                }
                .emit();
            }
        }

        let mut rooms = self.rooms.write();
        let room = rooms.get_mut(interaction_id).expect("just inserted or pre-existing");

        let reattached = room.participants.contains_key(user_id);
        let now = Utc::now();
        room.participants
            .entry(user_id.to_owned())
            .and_modify(|p| {
                p.is_connected = true;
                p.connection_id = connection_id.to_owned();
                p.last_activity = now;
            })
            .or_insert_with(|| Participant {
                user_id: user_id.to_owned(),
                entity_id: entity_id.to_owned(),
                entity_type,
                connection_id: connection_id.to_owned(),
                is_connected: true,
                last_activity: now,
            });
        room.status = RoomStatus::Live;
        room.touch();

        let outcome = JoinOutcome {
            room_id: room.room_id.clone(),
            game_state: room.game_state.clone(),
            participant_count: room.participants.len(),
            reattached,
        };
        drop(rooms);
        self.mark_dirty(interaction_id);
        TraceEvent::ParticipantJoined {
            interaction_id: interaction_id.to_owned(),
            user_id: user_id.to_owned(),
            entity_id: entity_id.to_owned(),
            reconnect: reattached,
        }
        .emit();
        Ok(outcome)
    }

    async fn hydrate_room(&self, interaction_id: &str) -> Result<Room> {
        if let Some(store) = &self.store {
            if let Some(snapshot) = store.load_snapshot(interaction_id).await? {
                let map_state = snapshot.last_state_snapshot.map_state.clone();
                let mut room = Room::new(interaction_id, map_state);
                room.game_state = snapshot.last_state_snapshot;
                room.last_activity = snapshot.last_activity;
                return Ok(room);
            }
        }
        Ok(Room::new(interaction_id, MapState {
            width: 20,
            height: 20,
            entities: HashMap::new(),
            obstacles: Vec::new(),
            terrain: Vec::new(),
        }))
    }

    /// Mark `user_id` disconnected. The participant stays in the room for
    /// the reconnect grace window; `sweep` removes it afterward.
    pub fn leave_room(&self, interaction_id: &str, user_id: &str) -> Result<()> {
        let mut rooms = self.rooms.write();
        let room = rooms
            .get_mut(interaction_id)
            .ok_or_else(|| Error::RoomNotFound(interaction_id.to_owned()))?;
        if let Some(participant) = room.participants.get_mut(user_id) {
            participant.is_connected = false;
            participant.last_activity = Utc::now();
        }
        room.touch();
        drop(rooms);
        self.mark_dirty(interaction_id);
        TraceEvent::ParticipantLeft {
            interaction_id: interaction_id.to_owned(),
            user_id: user_id.to_owned(),
            grace_expired: false,
        }
        .emit();
        Ok(())
    }

    pub fn get_room_state(&self, interaction_id: &str) -> Option<(GameState, RoomStatus, usize)> {
        let rooms = self.rooms.read();
        let room = rooms.get(interaction_id)?;
        Some((room.game_state.clone(), room.status, room.participants.len()))
    }

    /// Run `f` against the room's mutable state under the registry's write
    /// lock. Callers performing turn-affecting mutations should additionally
    /// hold the room's [`crate::room_lock::RoomLockMap`] permit so that two
    /// concurrent RPCs for the same room can't interleave their
    /// validate-then-apply sequence out of arrival order.
    pub fn with_room<F, T>(&self, interaction_id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut Room) -> T,
    {
        let mut rooms = self.rooms.write();
        let room = rooms.get_mut(interaction_id)?;
        let result = f(room);
        drop(rooms);
        self.mark_dirty(interaction_id);
        Some(result)
    }

    pub fn mark_dirty(&self, interaction_id: &str) {
        self.dirty.lock().insert(interaction_id.to_owned());
    }

    /// Drain the set of rooms that changed since the last flush.
    pub fn take_dirty(&self) -> Vec<String> {
        std::mem::take(&mut *self.dirty.lock()).into_iter().collect()
    }

    pub fn snapshot_of(&self, interaction_id: &str) -> Option<RoomSnapshot> {
        let rooms = self.rooms.read();
        let room = rooms.get(interaction_id)?;
        Some(RoomSnapshot {
            interaction_id: interaction_id.to_owned(),
            last_state_snapshot: room.game_state.clone(),
            snapshot_timestamp: Utc::now(),
            connected_participants: room
                .participants
                .values()
                .filter(|p| p.is_connected)
                .map(|p| p.user_id.clone())
                .collect(),
            last_activity: room.last_activity,
        })
    }

    /// Persist every dirty room's current state. Called periodically by the
    /// gateway's background flush task.
    pub async fn flush_dirty(&self) -> Result<usize> {
        let Some(store) = &self.store else { return Ok(0) };
        let dirty = self.take_dirty();
        let mut flushed = 0;
        for interaction_id in dirty {
            if let Some(snapshot) = self.snapshot_of(&interaction_id) {
                let start = std::time::Instant::now();
                store.save_snapshot(&snapshot).await?;
                flushed += 1;
                TraceEvent::SnapshotPersisted {
                    interaction_id,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
                .emit();
            }
        }
        Ok(flushed)
    }

    /// Remove participants whose disconnect exceeded the reconnect grace
    /// window, and rooms that have been inactive past the configured
    /// timeout. Returns the interaction ids of rooms removed outright, so
    /// callers can clean up subscriptions/locks for them.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let grace = chrono::Duration::milliseconds(self.config.reconnect_grace_ms as i64);
        let inactivity = chrono::Duration::milliseconds(self.config.room_inactivity_timeout_ms as i64);
        let mut removed = Vec::new();

        let mut rooms = self.rooms.write();
        rooms.retain(|interaction_id, room| {
            room.participants
                .retain(|_, p| p.is_connected || now - p.last_activity < grace);

            let expired = now - room.last_activity >= inactivity;
            if expired {
                removed.push(interaction_id.clone());
            }
            !expired
        });
        drop(rooms);
        for interaction_id in &removed {
            self.dirty.lock().remove(interaction_id);
            TraceEvent::RoomDestroyed {
                interaction_id: interaction_id.clone(),
                reason: "inactivity timeout".into(),
            }
            .emit();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RoomManager {
        RoomManager::new(RoomConfig::default(), None)
    }

    #[tokio::test]
    async fn first_join_creates_room() {
        let manager = manager();
        let outcome = manager
            .join_room("i1", "u1", "p1", EntityType::PlayerCharacter, "c1")
            .await
            .unwrap();
        assert!(!outcome.reattached);
        assert_eq!(outcome.participant_count, 1);
        assert_eq!(manager.room_count(), 1);
    }

    #[tokio::test]
    async fn second_join_reattaches() {
        let manager = manager();
        manager.join_room("i1", "u1", "p1", EntityType::PlayerCharacter, "c1").await.unwrap();
        manager.leave_room("i1", "u1").unwrap();
        let outcome = manager
            .join_room("i1", "u1", "p1", EntityType::PlayerCharacter, "c2")
            .await
            .unwrap();
        assert!(outcome.reattached);
        assert_eq!(manager.room_count(), 1);
    }

    #[tokio::test]
    async fn capacity_exceeded_rejects_new_rooms() {
        let mut config = RoomConfig::default();
        config.max_rooms_per_server = 1;
        let manager = RoomManager::new(config, None);
        manager.join_room("i1", "u1", "p1", EntityType::PlayerCharacter, "c1").await.unwrap();
        let err = manager
            .join_room("i2", "u2", "p2", EntityType::PlayerCharacter, "c2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));
    }

    #[tokio::test]
    async fn sweep_removes_long_disconnected_participant() {
        let manager = manager();
        manager.join_room("i1", "u1", "p1", EntityType::PlayerCharacter, "c1").await.unwrap();
        manager.leave_room("i1", "u1").unwrap();

        let far_future = Utc::now() + chrono::Duration::milliseconds(RoomConfig::default().reconnect_grace_ms as i64 + 1000);
        manager.sweep(far_future);

        let (state, _, count) = manager.get_room_state("i1").unwrap();
        let _ = state;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn sweep_removes_inactive_room() {
        let manager = manager();
        manager.join_room("i1", "u1", "p1", EntityType::PlayerCharacter, "c1").await.unwrap();

        let far_future = Utc::now() + chrono::Duration::milliseconds(RoomConfig::default().room_inactivity_timeout_ms as i64 + 1000);
        let removed = manager.sweep(far_future);
        assert_eq!(removed, vec!["i1".to_string()]);
        assert_eq!(manager.room_count(), 0);
    }

    #[tokio::test]
    async fn with_room_mutation_marks_dirty() {
        let manager = manager();
        manager.join_room("i1", "u1", "p1", EntityType::PlayerCharacter, "c1").await.unwrap();
        manager.take_dirty();
        manager.with_room("i1", |room| room.game_state.round_number += 1);
        assert_eq!(manager.take_dirty(), vec!["i1".to_string()]);
    }

    #[tokio::test]
    async fn interaction_ids_lists_tracked_rooms() {
        let manager = manager();
        manager.join_room("i1", "u1", "p1", EntityType::PlayerCharacter, "c1").await.unwrap();
        manager.join_room("i2", "u2", "p2", EntityType::PlayerCharacter, "c2").await.unwrap();
        let mut ids = manager.interaction_ids();
        ids.sort();
        assert_eq!(ids, vec!["i1".to_string(), "i2".to_string()]);
    }
}
