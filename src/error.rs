// ============================================================================
// ERROR TAXONOMY
// ============================================================================
//
// Three layers, matching the three systems that can fail:
//
// - StoreError:    the ledger leg (ReDB / row encoding)
// - TransferError: the on-chain leg (RPC, signing, contract call)
// - BalanceError:  what the operation engine reports to callers
//
// Validation and business-rule failures carry a precise reason and are never
// retried. Store failures are retryable for Deposit/Bet/Win (no side effect
// committed yet); for Withdraw they are absorbed into the reconciliation
// path instead (see engine.rs).
//
// ============================================================================

use thiserror::Error;

/// Failures from the ledger store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No balance row for this (address, token). Read paths treat this as a
    /// zero balance; Withdraw/Win treat it as a hard failure.
    #[error("balance record not found")]
    NotFound,

    /// Guarded debit rejected: the row holds less than requested.
    #[error("insufficient funds: have {available:.2}, need {requested:.2}")]
    Insufficient { available: f64, requested: f64 },

    /// Underlying database failure (open, transaction, commit).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored row failed to decode. Indicates operator intervention.
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Failures from the treasury transfer gateway (the on-chain leg).
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("treasury gateway misconfigured: {0}")]
    Config(String),

    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("invalid token address: {0}")]
    InvalidToken(String),

    /// The token's decimal precision could not be resolved. Never silently
    /// defaulted: an amount scaled with the wrong precision is worse than a
    /// refused withdrawal.
    #[error("failed to resolve token decimals: {0}")]
    Decimals(String),

    /// The transfer submission itself failed (RPC unavailable, treasury out
    /// of funds, contract revert).
    #[error("transfer submission failed: {0}")]
    Submission(String),

    /// The chain node did not answer within the configured bound.
    #[error("transfer timed out after {0}s")]
    Timeout(u64),
}

/// What a balance operation reports to its caller.
#[derive(Debug, Error)]
pub enum BalanceError {
    /// Malformed address, non-positive amount, missing field. Rejected
    /// before any I/O.
    #[error("{0}")]
    Validation(String),

    /// Withdraw/Win require a pre-existing ledger relationship.
    #[error("balance record not found")]
    NotFound,

    #[error("insufficient house balance: have {available:.2}, need {requested:.2}")]
    InsufficientFunds { available: f64, requested: f64 },

    /// On-chain leg failed before any ledger mutation. The whole withdrawal
    /// is safe to retry from the start.
    #[error("withdrawal failed: {0}")]
    Transfer(#[from] TransferError),

    /// Ledger leg failed with no side effect committed.
    #[error("ledger store unavailable: {0}")]
    Store(String),
}

impl BalanceError {
    /// Map a store failure for operations where no on-chain side effect has
    /// occurred. NotFound/Insufficient keep their business meaning; the rest
    /// degrade to an infrastructure failure.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => BalanceError::NotFound,
            StoreError::Insufficient {
                available,
                requested,
            } => BalanceError::InsufficientFunds {
                available,
                requested,
            },
            other => BalanceError::Store(other.to_string()),
        }
    }
}
