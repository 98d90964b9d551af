//! Per-room delta queue with priority-ordered overflow eviction and
//! size/time/priority flush triggers. Priority is urgency: higher values
//! are flushed and retained first.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use ia_domain::config::BatcherConfig;
use ia_protocol::delta::StateDelta;
use parking_lot::Mutex;

struct QueuedDelta {
    delta: StateDelta,
    priority: i32,
    queued_at: Instant,
}

#[derive(Default)]
struct RoomQueue {
    items: VecDeque<QueuedDelta>,
    first_queued_at: Option<Instant>,
    processing: bool,
    evicted: u64,
}

pub struct MessageBatcher {
    queues: Mutex<HashMap<String, RoomQueue>>,
    config: BatcherConfig,
}

impl MessageBatcher {
    pub fn new(config: BatcherConfig) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Queue a delta for `interaction_id`. Higher `priority` values are
    /// considered more urgent; a delta at or above
    /// `config.priority_threshold` marks the room as due for immediate
    /// flush. Returns `true` if the queue is now due for a flush.
    pub fn enqueue(&self, interaction_id: &str, delta: StateDelta, priority: i32) -> bool {
        let mut queues = self.queues.lock();
        let queue = queues.entry(interaction_id.to_owned()).or_default();

        if queue.first_queued_at.is_none() {
            queue.first_queued_at = Some(Instant::now());
        }

        // Insert in priority order (higher = more urgent, dequeued first).
        let pos = queue.items.iter().position(|q| q.priority < priority).unwrap_or(queue.items.len());
        queue.items.insert(
            pos,
            QueuedDelta {
                delta,
                priority,
                queued_at: Instant::now(),
            },
        );

        if queue.items.len() > self.config.max_queue_size {
            // Evict the oldest entry below the priority threshold, so urgent
            // messages are never sacrificed to make room; fall back to the
            // oldest entry overall if everything queued is urgent.
            let below_threshold = queue
                .items
                .iter()
                .enumerate()
                .filter(|(_, q)| q.priority < self.config.priority_threshold)
                .min_by_key(|(_, q)| q.queued_at)
                .map(|(i, _)| i);
            let evict_at = below_threshold.unwrap_or_else(|| {
                queue
                    .items
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, q)| q.queued_at)
                    .map(|(i, _)| i)
                    .expect("just inserted, queue non-empty")
            });
            queue.items.remove(evict_at);
            queue.evicted += 1;
        }

        self.is_due_locked(queue)
    }

    fn is_due_locked(&self, queue: &RoomQueue) -> bool {
        if queue.processing || queue.items.is_empty() {
            return false;
        }
        if queue.items.len() >= self.config.max_batch_size {
            return true;
        }
        if queue.items.iter().any(|q| q.priority >= self.config.priority_threshold) {
            return true;
        }
        match queue.first_queued_at {
            Some(start) => start.elapsed() >= Duration::from_millis(self.config.batch_delay_ms),
            None => false,
        }
    }

    pub fn is_due(&self, interaction_id: &str) -> bool {
        let queues = self.queues.lock();
        queues.get(interaction_id).is_some_and(|q| self.is_due_locked(q))
    }

    /// Drain and coalesce the queue if it is due and not already being
    /// flushed by another caller. The returned batch excludes its own
    /// queue's future entries. Callers must call [`MessageBatcher::end_flush`]
    /// once the flush completes (success or failure) to clear the
    /// in-progress gate.
    pub fn begin_flush(&self, interaction_id: &str) -> Option<Vec<StateDelta>> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(interaction_id)?;
        if !self.is_due_locked(queue) {
            return None;
        }

        queue.processing = true;
        let drained: Vec<StateDelta> = queue.items.drain(..).map(|q| q.delta).collect();
        queue.first_queued_at = None;
        Some(StateDelta::coalesce(drained))
    }

    pub fn end_flush(&self, interaction_id: &str) {
        if let Some(queue) = self.queues.lock().get_mut(interaction_id) {
            queue.processing = false;
        }
    }

    pub fn queue_len(&self, interaction_id: &str) -> usize {
        self.queues.lock().get(interaction_id).map(|q| q.items.len()).unwrap_or(0)
    }

    pub fn evicted_count(&self, interaction_id: &str) -> u64 {
        self.queues.lock().get(interaction_id).map(|q| q.evicted).unwrap_or(0)
    }

    /// Rooms with non-empty queues, for a background flush loop to poll.
    pub fn active_rooms(&self) -> Vec<String> {
        self.queues
            .lock()
            .iter()
            .filter(|(_, q)| !q.items.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn cleanup(&self, interaction_id: &str) {
        self.queues.lock().remove(interaction_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ia_protocol::delta::DeltaType;
    use serde_json::json;

    fn delta(hp: i64) -> StateDelta {
        let mut changes = serde_json::Map::new();
        changes.insert("currentHP".into(), json!(hp));
        StateDelta::new(DeltaType::Participant, changes)
    }

    #[test]
    fn due_once_max_batch_size_reached() {
        let config = BatcherConfig {
            max_batch_size: 2,
            batch_delay_ms: 10_000,
            max_queue_size: 100,
            priority_threshold: 1000,
        };
        let batcher = MessageBatcher::new(config);
        assert!(!batcher.enqueue("i1", delta(1), 1));
        assert!(batcher.enqueue("i1", delta(2), 1));
    }

    #[test]
    fn due_when_priority_threshold_crossed() {
        let config = BatcherConfig {
            max_batch_size: 100,
            batch_delay_ms: 10_000,
            max_queue_size: 100,
            priority_threshold: 5,
        };
        let batcher = MessageBatcher::new(config);
        assert!(batcher.enqueue("i1", delta(1), 9));
    }

    /// Seed scenario: 24 priority-1 deltas accumulate below threshold 5,
    /// then one priority-9 delta crosses it and triggers an immediate flush.
    #[test]
    fn scenario_low_priority_accumulates_high_priority_flushes_immediately() {
        let config = BatcherConfig {
            max_batch_size: 1000,
            batch_delay_ms: 10_000,
            max_queue_size: 1000,
            priority_threshold: 5,
        };
        let batcher = MessageBatcher::new(config);
        for i in 0..24 {
            assert!(!batcher.enqueue("i1", delta(i), 1), "priority-1 delta {i} should not trigger a flush");
        }
        assert_eq!(batcher.queue_len("i1"), 24);
        assert!(batcher.enqueue("i1", delta(99), 9));
        assert!(batcher.is_due("i1"));
    }

    #[test]
    fn due_after_time_elapses() {
        let config = BatcherConfig {
            max_batch_size: 100,
            batch_delay_ms: 1,
            max_queue_size: 100,
            priority_threshold: 1000,
        };
        let batcher = MessageBatcher::new(config);
        batcher.enqueue("i1", delta(1), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(batcher.is_due("i1"));
    }

    #[test]
    fn begin_flush_drains_and_coalesces() {
        let config = BatcherConfig {
            max_batch_size: 2,
            batch_delay_ms: 10_000,
            max_queue_size: 100,
            priority_threshold: 1000,
        };
        let batcher = MessageBatcher::new(config);
        batcher.enqueue("i1", delta(1), 1);
        batcher.enqueue("i1", delta(2), 1);

        let batch = batcher.begin_flush("i1").unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].changes["currentHP"], json!(2));
        assert_eq!(batcher.queue_len("i1"), 0);
    }

    #[test]
    fn begin_flush_blocked_while_processing() {
        let config = BatcherConfig {
            max_batch_size: 1,
            batch_delay_ms: 10_000,
            max_queue_size: 100,
            priority_threshold: 1000,
        };
        let batcher = MessageBatcher::new(config);
        batcher.enqueue("i1", delta(1), 1);
        assert!(batcher.begin_flush("i1").is_some());

        batcher.enqueue("i1", delta(2), 1);
        assert!(batcher.begin_flush("i1").is_none());

        batcher.end_flush("i1");
        assert!(batcher.begin_flush("i1").is_some());
    }

    #[test]
    fn overflow_evicts_oldest_entry_below_threshold() {
        let config = BatcherConfig {
            max_batch_size: 100,
            batch_delay_ms: 10_000,
            max_queue_size: 2,
            priority_threshold: 5,
        };
        let batcher = MessageBatcher::new(config);
        batcher.enqueue("i1", delta(1), 1);
        batcher.enqueue("i1", delta(2), 9);
        batcher.enqueue("i1", delta(3), 9);

        // The only entry below the threshold (priority 1) is evicted, not
        // one of the two urgent priority-9 entries.
        assert_eq!(batcher.queue_len("i1"), 2);
        assert_eq!(batcher.evicted_count("i1"), 1);
        let remaining = batcher.begin_flush("i1").unwrap();
        assert!(remaining.iter().all(|d| d.changes["currentHP"] != json!(1)));
    }

    #[test]
    fn overflow_falls_back_to_oldest_overall_when_all_urgent() {
        let config = BatcherConfig {
            max_batch_size: 100,
            batch_delay_ms: 10_000,
            max_queue_size: 2,
            priority_threshold: 5,
        };
        let batcher = MessageBatcher::new(config);
        batcher.enqueue("i1", delta(1), 9);
        batcher.enqueue("i1", delta(2), 9);
        batcher.enqueue("i1", delta(3), 9);

        assert_eq!(batcher.queue_len("i1"), 2);
        assert_eq!(batcher.evicted_count("i1"), 1);
        let remaining = batcher.begin_flush("i1").unwrap();
        assert!(remaining.iter().all(|d| d.changes["currentHP"] != json!(1)));
    }
}
