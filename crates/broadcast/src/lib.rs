//! Event fan-out: the subscription registry plus the per-room message
//! batcher that coalesces state deltas before they're broadcast.

pub mod batcher;
pub mod broadcaster;

pub use batcher::MessageBatcher;
pub use broadcaster::{BroadcastMetrics, EventBroadcaster, SubscriptionLimitExceeded};
