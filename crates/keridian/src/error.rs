//! Error types for the kernel.

use keridian_core::{Aid, CoreError, ValidationError};
use keridian_store::StoreError;
use thiserror::Error;

/// Errors that can occur during kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Event or receipt failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Wire bytes could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Out-of-order buffer for this identifier is full.
    #[error("out-of-order escrow full for {aid} (limit {limit}), dropped event at seq {seq}")]
    OutOfOrderOverflow { aid: Aid, seq: u64, limit: usize },

    /// A verifiable conflicting event version was submitted. The log is
    /// now marked compromised.
    #[error("duplicity detected for {aid} at seq {seq}")]
    Duplicity { aid: Aid, seq: u64 },

    /// The log is compromised; nothing further is accepted.
    #[error("log for {0} is compromised")]
    Compromised(Aid),

    /// Stored data could not be replayed. Indicates corruption or
    /// tampering below the kernel.
    #[error("corrupt log: {0}")]
    Corrupt(String),
}

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
