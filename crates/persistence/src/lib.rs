//! JSON-file-backed implementation of `ia_domain::persistence::SnapshotStore`.

pub mod store;

pub use store::{read_log, JsonSnapshotStore};
