//! # Grant Ledger
//!
//! Moves a user's grants into a campaign's funding total. Each user holds a
//! finite balance of grants; each campaign accepts grants up to its maximum
//! threshold and tracks whether it has crossed its minimum and maximum.
//!
//! | Concern            | Module                                   |
//! |--------------------|------------------------------------------|
//! | Data model         | [`types`]                                |
//! | Flag derivation    | [`funding::project`]                     |
//! | Validation         | [`transfer::plan_transfer`]              |
//! | Transaction driver | [`GrantLedger::transfer_grant`]          |
//! | Storage contract   | [`LedgerStore`], [`LedgerTx`]            |
//! | In-process storage | [`InMemoryStore`]                        |
//! | Audit              | [`invariants`]                           |
//!
//! ## Architecture
//!
//! Validation is pure and runs against rows loaded inside a storage
//! transaction. Concurrency control is optimistic: commits are guarded by the
//! version of both the actor and the campaign, and a lost race re-runs the
//! whole load → validate → commit sequence under a bounded [`RetryPolicy`].

mod errors;
pub mod funding;
pub mod invariants;
mod ledger;
mod memory;
mod storage;
pub mod transfer;
pub mod types;

#[cfg(test)]
mod test_concurrency;
#[cfg(test)]
mod test_transfer;

pub use errors::{Result, StoreError, TransferError};
pub use funding::FundingFlags;
pub use invariants::InvariantViolation;
pub use ledger::{GrantLedger, RetryPolicy};
pub use memory::{InMemoryStore, MemoryTx};
pub use storage::{LedgerStore, LedgerTx, TransferWrite};
pub use types::{
    Campaign, CampaignId, FundingSnapshot, GrantRecord, NewCampaign, TransferReceipt,
    UserAccount, UserId,
};
