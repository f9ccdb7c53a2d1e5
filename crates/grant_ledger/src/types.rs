//! # Types
//!
//! Shared data structures used across all modules of the grant ledger.
//!
//! ## Design decisions
//!
//! ### Cached funding total
//!
//! A [`Campaign`] carries `funding_total` and the two funding flags alongside
//! its thresholds. The append-only [`GrantRecord`] rows are the source of
//! truth; `funding_total` is a materialized sum over them that only the
//! ledger's commit path writes.
//!
//! ### Versions
//!
//! Both [`UserAccount`] and [`Campaign`] carry a `version` sequence number.
//! Every ledger commit bumps both and is rejected if either moved since it
//! was loaded:
//!
//! ```text
//! load (v=n) ──► validate ──► commit if still v=n ──► v=n+1
//!                                   └── moved ──► Conflict ──► retry
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Identifier of a campaign ("camp" / "dream").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "campaign#{}", self.0)
    }
}

/// A user's spendable grant balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    /// Grants the user currently holds. Never negative.
    pub balance: i64,
    pub version: i64,
}

/// A fundable campaign with optional minimum and maximum thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    /// Owner, used by the web layer for authorization only.
    pub creator_id: UserId,
    pub name: String,
    pub description: String,
    pub minimum_threshold: Option<i64>,
    /// Funding cap. A campaign without one does not accept grants.
    pub maximum_threshold: Option<i64>,
    /// Sum of all grant records for this campaign.
    pub funding_total: i64,
    pub minimum_funded: bool,
    pub fully_funded: bool,
    /// Display toggle owned by the web layer; the ledger does not consult it.
    pub granting_enabled: bool,
    pub drive_folder_path: Option<String>,
    pub drive_budget_file_path: Option<String>,
    pub version: i64,
}

impl Campaign {
    /// The cached funding state as currently stored.
    pub fn snapshot(&self) -> FundingSnapshot {
        FundingSnapshot {
            funding_total: self.funding_total,
            minimum_funded: self.minimum_funded,
            fully_funded: self.fully_funded,
        }
    }

    /// Grants still accepted before the cap is hit, or `None` when no cap is set.
    pub fn remaining_budget(&self) -> Option<i64> {
        self.maximum_threshold
            .map(|max| max.saturating_sub(self.funding_total))
    }
}

/// Immutable, append-only record of a single applied transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub id: i64,
    pub user_id: UserId,
    pub campaign_id: CampaignId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Funding total plus the two derived flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub funding_total: i64,
    pub minimum_funded: bool,
    pub fully_funded: bool,
}

/// Outcome of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub actor_id: UserId,
    pub campaign_id: CampaignId,
    pub requested_amount: i64,
    /// Amount actually applied after capping to the remaining budget.
    pub effective_amount: i64,
    /// The actor's balance after the transfer.
    pub actor_balance: i64,
    pub snapshot: FundingSnapshot,
    pub grant_id: i64,
}

/// Fields supplied when a campaign is created. Funding state starts empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub creator_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub minimum_threshold: Option<i64>,
    pub maximum_threshold: Option<i64>,
}
