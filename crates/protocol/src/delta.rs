//! StateDelta: a typed, minimal description of a change to `GameState`,
//! plus the coalescing rule the batcher applies before emission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeltaType {
    Participant,
    Turn,
    Map,
    Initiative,
    Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(rename = "type")]
    pub kind: DeltaType,
    #[serde(rename = "entityId", default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub changes: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl StateDelta {
    pub fn new(kind: DeltaType, changes: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            kind,
            entity_id: None,
            changes,
            timestamp: Utc::now(),
        }
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Group `deltas` by `type` (in order of first appearance) and merge
    /// each group into a single delta: later entries shallow-overlay
    /// earlier ones in `changes` (last-writer-wins per key, including
    /// `entityId`), and the merged timestamp is the maximum of the group.
    ///
    /// This yields at most one delta per distinct `type` — coalescing
    /// never inflates the input count.
    pub fn coalesce(deltas: Vec<StateDelta>) -> Vec<StateDelta> {
        let mut order: Vec<DeltaType> = Vec::new();
        let mut groups: std::collections::HashMap<DeltaType, StateDelta> =
            std::collections::HashMap::new();

        for delta in deltas {
            match groups.get_mut(&delta.kind) {
                Some(existing) => {
                    for (k, v) in delta.changes {
                        existing.changes.insert(k, v);
                    }
                    if let Some(eid) = delta.entity_id {
                        existing.entity_id = Some(eid);
                    }
                    if delta.timestamp > existing.timestamp {
                        existing.timestamp = delta.timestamp;
                    }
                }
                None => {
                    order.push(delta.kind);
                    groups.insert(delta.kind, delta);
                }
            }
        }

        order.into_iter().filter_map(|k| groups.remove(&k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(kind: DeltaType, entity_id: &str, hp: i64, ts_secs: i64) -> StateDelta {
        let mut changes = serde_json::Map::new();
        changes.insert("currentHP".into(), json!(hp));
        StateDelta::new(kind, changes)
            .with_entity(entity_id)
            .with_timestamp(Utc::now() + chrono::Duration::seconds(ts_secs))
    }

    #[test]
    fn coalesces_same_type_last_writer_wins() {
        let deltas = vec![
            delta(DeltaType::Participant, "e1", 40, 0),
            delta(DeltaType::Participant, "e1", 35, 1),
            delta(DeltaType::Participant, "e1", 30, 2),
        ];
        let out = StateDelta::coalesce(deltas);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].changes["currentHP"], json!(30));
    }

    #[test]
    fn keeps_max_timestamp() {
        let earlier = delta(DeltaType::Turn, "e1", 1, 0);
        let later = delta(DeltaType::Turn, "e1", 2, 5);
        let later_ts = later.timestamp;
        let out = StateDelta::coalesce(vec![earlier, later]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp, later_ts);
    }

    #[test]
    fn never_inflates_output_size() {
        let deltas = vec![
            delta(DeltaType::Participant, "e1", 1, 0),
            delta(DeltaType::Turn, "e1", 1, 0),
            delta(DeltaType::Participant, "e2", 1, 1),
        ];
        let input_len = deltas.len();
        let out = StateDelta::coalesce(deltas);
        assert!(out.len() <= input_len);
        assert_eq!(out.len(), 2); // one participant group, one turn group
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(StateDelta::coalesce(Vec::new()).is_empty());
    }
}
