use thiserror::Error;

/// Taxonomy of core-engine errors. Every public engine operation returns one
/// of these on failure, each carrying a user-safe message.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invariant violated on user input: bad amount, bad address,
    /// self-transfer, unknown coin, insufficient balance/fee.
    #[error("validation error: {0}")]
    Validation(String),

    /// Capacity or policy rejection: mempool full, minter not authorized,
    /// supply cap exceeded.
    #[error("admission rejected: {0}")]
    Admission(String),

    /// Uniqueness conflict on block commit (concurrent mining race).
    #[error("contention: {0}")]
    Contention(String),

    /// Proof-of-work exceeded the configured deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Store or cache operational error.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<crate::storage::StorageError> for CoreError {
    fn from(e: crate::storage::StorageError) -> Self {
        CoreError::Persistence(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
