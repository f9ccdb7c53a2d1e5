//! Ledger and storage error types.

use thiserror::Error;

use crate::types::{CampaignId, UserId};

/// Why a transfer was rejected. No variant leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("grant amount must be at least 1 (got {requested})")]
    InvalidAmount { requested: i64 },

    #[error("{0} not found")]
    UserNotFound(UserId),

    #[error("{0} not found")]
    CampaignNotFound(CampaignId),

    #[error("{0} has no maximum budget configured")]
    MissingBudgetConfiguration(CampaignId),

    #[error("{0} is already fully funded")]
    AlreadyFullyFunded(CampaignId),

    #[error("cannot send {requested} grants, only {available} available")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("transfer gave up after {attempts} contended attempts")]
    Busy { attempts: u32 },

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl TransferError {
    /// Short stable code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::UserNotFound(_) => "user_not_found",
            Self::CampaignNotFound(_) => "campaign_not_found",
            Self::MissingBudgetConfiguration(_) => "missing_budget_configuration",
            Self::AlreadyFullyFunded(_) => "already_fully_funded",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::Busy { .. } => "busy",
            Self::PersistenceFailure(_) => "persistence_failure",
        }
    }

    /// `true` when retrying the whole transfer may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Errors surfaced by a [`crate::storage::LedgerStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row changed between load and commit.
    #[error("concurrent modification of {0}")]
    Conflict(String),

    /// The store could not acquire its lock within the configured window.
    #[error("storage busy: {0}")]
    Busy(String),

    #[error("{0} not found")]
    UserNotFound(UserId),

    #[error("{0} not found")]
    CampaignNotFound(CampaignId),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, TransferError>;
