//! # Storage
//!
//! The contract the ledger holds with its persistence layer. The ledger never
//! reads or writes storage outside these calls.
//!
//! | Call              | Meaning                                                   |
//! |-------------------|-----------------------------------------------------------|
//! | `begin`           | Open a transaction scope                                  |
//! | `load_for_update` | Read actor and campaign, including their versions         |
//! | `commit`          | Write actor + campaign + new grant record as one unit     |
//! | `abort`           | Discard the scope without writing anything                |
//!
//! `commit` must be all-or-nothing. It must fail with
//! [`StoreError::Conflict`] when either row's version no longer matches the
//! one that was loaded, so that two transfers can never both pass the cap or
//! balance check against stale values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::types::{Campaign, CampaignId, FundingSnapshot, GrantRecord, UserAccount, UserId};

/// Everything a single transfer writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferWrite {
    pub actor_id: UserId,
    /// Version observed at load time.
    pub actor_version: i64,
    pub actor_balance: i64,
    pub campaign_id: CampaignId,
    /// Version observed at load time.
    pub campaign_version: i64,
    pub snapshot: FundingSnapshot,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
pub trait LedgerTx: Send {
    async fn load_for_update(
        &mut self,
        actor: UserId,
        campaign: CampaignId,
    ) -> Result<(UserAccount, Campaign), StoreError>;

    /// Apply `write` and return the appended grant record.
    async fn commit(self, write: TransferWrite) -> Result<GrantRecord, StoreError>;

    async fn abort(self) -> Result<(), StoreError>;
}
