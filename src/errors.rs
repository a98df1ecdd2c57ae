//! Error types for the wagering engine.
//!
//! Every fallible operation surfaces an [`EngineError`]; transports map the
//! [`ErrorKind`] classes onto their own status codes.

use thiserror::Error;

/// Coarse error classes a transport layer can map to response codes.
///
/// `Validation`, `Funds` and `Conflict` are rejected before any state
/// mutation. `Admission` errors are transient and safe to retry after a
/// short delay. `Internal` is the only fatal class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Funds,
    Conflict,
    Admission,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("minimum wager is {min}$")]
    WagerTooSmall { min: f64 },

    #[error("maximum wager is {max}$")]
    WagerTooLarge { max: f64 },

    #[error("invalid game parameters: {0}")]
    InvalidParameters(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("insufficient house balance")]
    InsufficientHouseBalance,

    #[error("already playing")]
    AlreadyPlaying,

    #[error("game not found")]
    GameNotFound,

    #[error("invalid action: {0}")]
    InvalidAction(&'static str),

    #[error("seed not found")]
    SeedNotFound,

    #[error("another request for this game is in flight")]
    Busy,

    #[error("too many queued requests")]
    QueueFull,

    #[error("slow down: retry in {retry_in:.1}s")]
    CoolingDown { retry_in: f64 },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    /// Class of this error, for transport-level mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::WagerTooSmall { .. }
            | EngineError::WagerTooLarge { .. }
            | EngineError::InvalidParameters(_) => ErrorKind::Validation,

            EngineError::InsufficientBalance | EngineError::InsufficientHouseBalance => {
                ErrorKind::Funds
            }

            EngineError::AlreadyPlaying
            | EngineError::GameNotFound
            | EngineError::InvalidAction(_)
            | EngineError::SeedNotFound => ErrorKind::Conflict,

            EngineError::Busy | EngineError::QueueFull | EngineError::CoolingDown { .. } => {
                ErrorKind::Admission
            }

            EngineError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Whether a client can retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Admission
    }
}

impl From<crate::store::StoreError> for EngineError {
    fn from(e: crate::store::StoreError) -> Self {
        EngineError::Storage(e.to_string())
    }
}
