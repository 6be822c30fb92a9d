//! Error types for the engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Raised at manager setup: unknown deck/enum/constant, bad tag,
    /// duplicate move name, invalid variant config. Fatal; the manager
    /// fails to build.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A proposed move was not legal or failed to apply.
    #[error("Proposal rejected: {0}")]
    ProposalRejected(String),

    /// A move apply produced a state that fails validation. The new state
    /// is not committed.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Attempt to mutate through the wrong accessor.
    #[error("Property {0} is immutable")]
    ImmutableProperty(String),

    /// Wrapped from the storage provider; halts the worker for that game
    /// until cleared.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The fix-up loop exceeded its bound; fatal for the game.
    #[error("Fix-up chain exceeded maximum length of {0}")]
    FixUpChainExceeded(usize),

    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Property {0} has the wrong type")]
    WrongPropertyType(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Game is finished; no further moves apply")]
    GameFinished,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
