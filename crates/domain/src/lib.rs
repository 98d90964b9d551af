//! Core data model and ambient infrastructure shared by every
//! interaction-gateway crate: the authoritative game/room types, config,
//! the shared error type, and structured trace events.

pub mod config;
pub mod error;
pub mod model;
pub mod persistence;
pub mod trace;

pub use error::{Error, Result};
