use thiserror::Error;

use crate::models::ProfileKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Deliberately carries no detail: every denial reads the same.
    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("{0} profile not found")]
    ProfileNotFound(ProfileKind),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

pub type Result<T> = std::result::Result<T, AccessError>;
