use std::sync::Arc;

use ia_broadcast::{EventBroadcaster, MessageBatcher};
use ia_domain::config::Config;
use ia_engine::{RoomLockMap, RoomManager, TurnEngine};

/// Shared application state passed to all API handlers and the WebSocket
/// upgrade route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Room Manager, Turn Engine ──────────────────────────────────────
    pub rooms: Arc<RoomManager>,
    pub room_locks: Arc<RoomLockMap>,
    pub turn_engine: Arc<TurnEngine>,

    // ── Event Broadcaster, Message Batcher ──────────────────────────────
    pub broadcaster: Arc<EventBroadcaster>,
    pub batcher: Arc<MessageBatcher>,

    // ── Security (startup-computed) ────────────────────────────────────
    /// SHA-256 hash of the bearer token. `None` disables auth (dev mode).
    pub api_token_hash: Option<Vec<u8>>,
}
