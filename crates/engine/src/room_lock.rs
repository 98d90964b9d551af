//! Per-room concurrency control.
//!
//! Ensures only one turn-affecting operation runs per room at a time. A
//! second action arriving while one is in-flight waits (queue depth = 1)
//! or is rejected with a "busy" error.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-room run locks.
///
/// Each room key maps to a `Semaphore(1)`. Acquiring the permit ensures
/// exclusive access to the room's `GameState` for one validate-apply-advance
/// sequence at a time.
pub struct RoomLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for RoomLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the run lock for a room.
    ///
    /// Returns `Ok(permit)` when the lock is acquired (hold it for the
    /// duration of the action — it auto-releases on drop).
    pub async fn acquire(&self, interaction_id: &str) -> Result<OwnedSemaphorePermit, RoomBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(interaction_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned().await.map_err(|_| RoomBusy)
    }

    /// Number of tracked rooms (for monitoring).
    pub fn room_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Remove locks for rooms that aren't actively held (cleanup).
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }

    /// Drop the lock entry for a room entirely, e.g. after the room closes.
    pub fn remove(&self, interaction_id: &str) {
        self.locks.lock().remove(interaction_id);
    }
}

/// Error returned when a room's semaphore has been closed (e.g. during shutdown).
#[derive(Debug)]
pub struct RoomBusy;

impl std::fmt::Display for RoomBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room is busy — an action is already in progress")
    }
}

impl std::error::Error for RoomBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access() {
        let map = RoomLockMap::new();

        let permit1 = map.acquire("r1").await.unwrap();
        drop(permit1);

        let permit2 = map.acquire("r1").await.unwrap();
        drop(permit2);
    }

    #[tokio::test]
    async fn different_rooms_concurrent() {
        let map = Arc::new(RoomLockMap::new());

        let p1 = map.acquire("r1").await.unwrap();
        let p2 = map.acquire("r2").await.unwrap();

        assert_eq!(map.room_count(), 2);

        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn same_room_waits() {
        let map = Arc::new(RoomLockMap::new());
        let map2 = map.clone();

        let p1 = map.acquire("r1").await.unwrap();

        let handle = tokio::spawn(async move {
            let _p2 = map2.acquire("r1").await.unwrap();
            42
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        drop(p1);

        let result = handle.await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn remove_drops_entry() {
        let map = RoomLockMap::new();
        let permit = map.acquire("r1").await.unwrap();
        drop(permit);
        map.remove("r1");
        assert_eq!(map.room_count(), 0);
    }
}
