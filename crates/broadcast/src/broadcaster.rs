//! Subscription registry and event fan-out.
//!
//! Every `roomUpdates` subscriber gets an mpsc channel; broadcasting to a
//! room means sending to every channel registered under its
//! `interactionId`. A blocked or dropped subscriber never blocks delivery
//! to its neighbors — failures are isolated and counted, not propagated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ia_domain::config::SubscriptionConfig;
use ia_protocol::event::{DeltaBatch, GameEvent};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A subscriber requested `subscribe` after already holding
/// `maxSubscriptionsPerUser` live subscriptions.
#[derive(Debug)]
pub struct SubscriptionLimitExceeded;

struct Subscription {
    user_id: String,
    sender: mpsc::UnboundedSender<GameEvent>,
    /// Event types this subscription wants delivered; `"*"` matches every
    /// type.
    event_types: Vec<String>,
    expires_at: Instant,
}

impl Subscription {
    fn wants(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|t| t == "*" || t == event_type)
    }
}

#[derive(Debug, Default)]
pub struct BroadcastMetrics {
    pub events_sent: AtomicU64,
    pub events_failed: AtomicU64,
    /// Exponential moving average of per-broadcast fan-out latency, in
    /// microseconds (biased ~12% toward the newest sample).
    average_delivery_micros: AtomicU64,
}

impl BroadcastMetrics {
    fn record(&self, elapsed: std::time::Duration, delivered: usize, failed: usize) {
        self.events_sent.fetch_add(delivered as u64, Ordering::Relaxed);
        self.events_failed.fetch_add(failed as u64, Ordering::Relaxed);

        let sample = elapsed.as_micros() as u64;
        let prev = self.average_delivery_micros.load(Ordering::Relaxed);
        let updated = if prev == 0 { sample } else { (prev * 7 + sample) / 8 };
        self.average_delivery_micros.store(updated, Ordering::Relaxed);
    }

    pub fn average_delivery_micros(&self) -> u64 {
        self.average_delivery_micros.load(Ordering::Relaxed)
    }
}

pub struct EventBroadcaster {
    /// interactionId -> subscriptionId -> Subscription
    subscriptions: RwLock<HashMap<String, HashMap<String, Subscription>>>,
    metrics: BroadcastMetrics,
    config: SubscriptionConfig,
}

impl EventBroadcaster {
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            metrics: BroadcastMetrics::default(),
            config,
        }
    }

    /// Register a new subscriber for a room, filtered to `event_types`
    /// (`"*"` matches every type); returns the subscription id (for later
    /// `unsubscribe`) and the event receiver. Rejects once `user_id`
    /// already holds `config.max_per_user` live subscriptions across all
    /// rooms.
    pub fn subscribe(
        &self,
        interaction_id: &str,
        user_id: &str,
        event_types: Vec<String>,
    ) -> Result<(String, mpsc::UnboundedReceiver<GameEvent>), SubscriptionLimitExceeded> {
        let mut subs = self.subscriptions.write();

        let held_by_user = subs.values().flat_map(|room| room.values()).filter(|s| s.user_id == user_id).count();
        if held_by_user >= self.config.max_per_user {
            return Err(SubscriptionLimitExceeded);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription_id = Uuid::new_v4().to_string();
        subs.entry(interaction_id.to_owned()).or_default().insert(
            subscription_id.clone(),
            Subscription {
                user_id: user_id.to_owned(),
                sender: tx,
                event_types: if event_types.is_empty() { vec!["*".to_owned()] } else { event_types },
                expires_at: Instant::now() + Duration::from_millis(self.config.ttl_ms),
            },
        );
        Ok((subscription_id, rx))
    }

    pub fn unsubscribe(&self, interaction_id: &str, subscription_id: &str) {
        let mut subs = self.subscriptions.write();
        if let Some(room_subs) = subs.get_mut(interaction_id) {
            room_subs.remove(subscription_id);
            if room_subs.is_empty() {
                subs.remove(interaction_id);
            }
        }
    }

    pub fn subscription_count(&self, interaction_id: &str) -> usize {
        self.subscriptions
            .read()
            .get(interaction_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.read().values().map(|s| s.len()).sum()
    }

    /// Send `event` to every subscription of `interaction_id` whose
    /// `eventTypes` contains `event.type` or `*`. A closed channel is
    /// dropped from the registry; it does not count as a send failure
    /// worth retrying.
    pub fn broadcast(&self, interaction_id: &str, event: GameEvent) -> usize {
        let start = Instant::now();
        let event_type = event.type_str();
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let subs = self.subscriptions.read();
            if let Some(room_subs) = subs.get(interaction_id) {
                for (id, sub) in room_subs.iter().filter(|(_, s)| s.wants(event_type)) {
                    match sub.sender.send(event.clone()) {
                        Ok(()) => delivered += 1,
                        Err(_) => dead.push(id.clone()),
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut subs = self.subscriptions.write();
            if let Some(room_subs) = subs.get_mut(interaction_id) {
                for id in &dead {
                    room_subs.remove(id);
                }
            }
        }

        self.metrics.record(start.elapsed(), delivered, dead.len());
        delivered
    }

    /// Send `event` only to subscriptions owned by `user_id` (private chat,
    /// targeted errors), still filtered by `eventTypes`.
    pub fn broadcast_to_user(&self, interaction_id: &str, user_id: &str, event: GameEvent) -> usize {
        let start = Instant::now();
        let event_type = event.type_str();
        let mut delivered = 0;
        let mut failed = 0;

        let subs = self.subscriptions.read();
        if let Some(room_subs) = subs.get(interaction_id) {
            for sub in room_subs.values().filter(|s| s.user_id == user_id && s.wants(event_type)) {
                match sub.sender.send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => failed += 1,
                }
            }
        }
        drop(subs);

        self.metrics.record(start.elapsed(), delivered, failed);
        delivered
    }

    pub fn broadcast_delta(&self, interaction_id: &str, batch: DeltaBatch) -> usize {
        self.broadcast(
            interaction_id,
            GameEvent::StateDelta {
                interaction_id: interaction_id.to_owned(),
                timestamp: batch.timestamp,
                batch,
            },
        )
    }

    /// Drop every subscription for a room (the room was destroyed).
    pub fn remove_room(&self, interaction_id: &str) {
        self.subscriptions.write().remove(interaction_id);
    }

    /// Remove every subscription past its TTL, across all rooms.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut subs = self.subscriptions.write();
        subs.retain(|_, room_subs| {
            room_subs.retain(|_, sub| sub.expires_at > now);
            !room_subs.is_empty()
        });
    }

    /// Drop all subscriptions across every room (server shutdown).
    pub fn shutdown(&self) {
        self.subscriptions.write().clear();
    }

    pub fn metrics(&self) -> &BroadcastMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_event(interaction_id: &str) -> GameEvent {
        GameEvent::InteractionResumed {
            interaction_id: interaction_id.to_owned(),
            timestamp: Utc::now(),
        }
    }

    fn chat_event(interaction_id: &str) -> GameEvent {
        GameEvent::ChatMessage {
            interaction_id: interaction_id.to_owned(),
            timestamp: Utc::now(),
            message: ia_domain::model::ChatMessage {
                id: "m1".into(),
                user_id: "u1".into(),
                entity_id: None,
                content: "hi".into(),
                message_type: ia_domain::model::ChatMessageType::Party,
                recipients: None,
                timestamp: Utc::now(),
            },
        }
    }

    fn broadcaster_with(max_per_user: usize, ttl_ms: u64) -> EventBroadcaster {
        EventBroadcaster::new(SubscriptionConfig { max_per_user, ttl_ms })
    }

    fn broadcaster() -> EventBroadcaster {
        broadcaster_with(10, 1_800_000)
    }

    #[test]
    fn subscribe_and_broadcast_delivers_to_all() {
        let broadcaster = broadcaster();
        let (_id1, mut rx1) = broadcaster.subscribe("i1", "u1", vec!["*".into()]).unwrap();
        let (_id2, mut rx2) = broadcaster.subscribe("i1", "u2", vec!["*".into()]).unwrap();

        let delivered = broadcaster.broadcast("i1", sample_event("i1"));
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn broadcast_to_user_only_targets_that_user() {
        let broadcaster = broadcaster();
        let (_id1, mut rx1) = broadcaster.subscribe("i1", "u1", vec!["*".into()]).unwrap();
        let (_id2, mut rx2) = broadcaster.subscribe("i1", "u2", vec!["*".into()]).unwrap();

        broadcaster.broadcast_to_user("i1", "u1", sample_event("i1"));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn event_type_filter_excludes_uninterested_subscriptions() {
        let broadcaster = broadcaster();
        let (_id1, mut rx1) = broadcaster.subscribe("i1", "u1", vec!["CHAT_MESSAGE".into()]).unwrap();
        let (_id2, mut rx2) = broadcaster.subscribe("i1", "u2", vec!["TURN_STARTED".into()]).unwrap();

        let delivered = broadcaster.broadcast("i1", chat_event("i1"));
        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn wildcard_event_type_receives_everything() {
        let broadcaster = broadcaster();
        let (_id, mut rx) = broadcaster.subscribe("i1", "u1", vec!["*".into()]).unwrap();
        broadcaster.broadcast("i1", chat_event("i1"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn subscribe_rejects_once_user_limit_reached() {
        let broadcaster = broadcaster_with(2, 1_800_000);
        assert!(broadcaster.subscribe("i1", "u1", vec!["*".into()]).is_ok());
        assert!(broadcaster.subscribe("i2", "u1", vec!["*".into()]).is_ok());
        assert!(broadcaster.subscribe("i3", "u1", vec!["*".into()]).is_err());
        // A different user is unaffected by u1's cap.
        assert!(broadcaster.subscribe("i1", "u2", vec!["*".into()]).is_ok());
    }

    #[test]
    fn unsubscribe_removes_entry_and_empty_room() {
        let broadcaster = broadcaster();
        let (id, _rx) = broadcaster.subscribe("i1", "u1", vec!["*".into()]).unwrap();
        assert_eq!(broadcaster.subscription_count("i1"), 1);
        broadcaster.unsubscribe("i1", &id);
        assert_eq!(broadcaster.subscription_count("i1"), 0);
    }

    #[test]
    fn dropped_receiver_is_pruned_on_next_broadcast() {
        let broadcaster = broadcaster();
        let (_id, rx) = broadcaster.subscribe("i1", "u1", vec!["*".into()]).unwrap();
        drop(rx);

        let delivered = broadcaster.broadcast("i1", sample_event("i1"));
        assert_eq!(delivered, 0);
        assert_eq!(broadcaster.subscription_count("i1"), 0);
    }

    #[test]
    fn remove_room_drops_entire_room() {
        let broadcaster = broadcaster();
        broadcaster.subscribe("i1", "u1", vec!["*".into()]).unwrap();
        broadcaster.subscribe("i1", "u2", vec!["*".into()]).unwrap();
        broadcaster.remove_room("i1");
        assert_eq!(broadcaster.subscription_count("i1"), 0);
    }

    #[test]
    fn cleanup_prunes_only_expired_subscriptions() {
        let broadcaster = broadcaster_with(10, 5);
        let (expired_id, _rx1) = broadcaster.subscribe("i1", "u1", vec!["*".into()]).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let (fresh_id, _rx2) = broadcaster.subscribe("i1", "u2", vec!["*".into()]).unwrap();

        broadcaster.cleanup();

        assert_eq!(broadcaster.subscription_count("i1"), 1);
        let subs = broadcaster.subscriptions.read();
        let room = &subs["i1"];
        assert!(!room.contains_key(&expired_id));
        assert!(room.contains_key(&fresh_id));
    }

    #[test]
    fn metrics_track_sent_and_failed() {
        let broadcaster = broadcaster();
        let (_id, rx) = broadcaster.subscribe("i1", "u1", vec!["*".into()]).unwrap();
        broadcaster.broadcast("i1", sample_event("i1"));
        assert_eq!(broadcaster.metrics().events_sent.load(Ordering::Relaxed), 1);
        drop(rx);
    }
}
