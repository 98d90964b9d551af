/// Shared infrastructure error type used across the interaction-gateway crates.
///
/// Validation and state-machine failures are not modeled here — those are
/// carried as the stable error codes from [`ia_protocol::error`] on the RPC
/// surface. This type is for things that go wrong underneath the core:
/// I/O, (de)serialization, config, and auth-hook failures.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
