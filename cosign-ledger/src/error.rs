use std::fmt;
use thiserror::Error;
use super::{ResolveError, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Contract,
    Offer,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Entity::Contract => write!(f, "contract"),
            &Entity::Offer => write!(f, "offer"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {}", _0)]
    Validation(String),
    #[error("{} not found", _0)]
    NotFound(Entity),
    #[error("contract is {:?}, the operation needs a draft", _0)]
    WrongStage(Stage),
    // never tells which check failed
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("identity unavailable: {}", _0)]
    IdentityUnavailable(#[from] ResolveError),
    #[error("storage error: {}", _0)]
    Storage(#[from] sled::Error),
    #[error("record encoding error: {}", _0)]
    Codec(#[from] bincode::Error),
}

impl LedgerError {
    /// The caller's fault, as opposed to a failing dependency.
    pub fn is_rejection(&self) -> bool {
        match self {
            &LedgerError::Validation(_)
            | &LedgerError::NotFound(_)
            | &LedgerError::WrongStage(_)
            | &LedgerError::SignatureInvalid => true,
            &LedgerError::IdentityUnavailable(_) | &LedgerError::Storage(_) | &LedgerError::Codec(_) => false,
        }
    }
}
