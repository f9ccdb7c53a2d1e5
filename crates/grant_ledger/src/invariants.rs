//! Ledger invariants, checkable independently of any transfer.
//!
//! * INV-1: `funding_total` equals the sum of the campaign's grant records.
//! * INV-2: a user's balance is never negative.
//! * INV-3: `funding_total` never exceeds `maximum_threshold`.
//! * INV-4: the stored flags equal the projection of `funding_total`.

use serde::Serialize;
use thiserror::Error;

use crate::funding;
use crate::types::{Campaign, CampaignId, FundingSnapshot, GrantRecord, UserAccount, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    #[error("INV-1 violated: {campaign} caches {cached} but grants sum to {recorded}")]
    TotalMismatch {
        campaign: CampaignId,
        cached: i64,
        recorded: i64,
    },

    #[error("INV-2 violated: {user} has negative balance {balance}")]
    NegativeBalance { user: UserId, balance: i64 },

    #[error("INV-3 violated: {campaign} total {total} exceeds maximum {maximum}")]
    OverCap {
        campaign: CampaignId,
        total: i64,
        maximum: i64,
    },

    #[error("INV-4 violated: {campaign} stores {stored:?}, projection gives {expected:?}")]
    StaleFlags {
        campaign: CampaignId,
        stored: FundingSnapshot,
        expected: FundingSnapshot,
    },

    #[error("grant {grant} on {campaign} has non-positive amount {amount}")]
    NonPositiveGrant {
        campaign: CampaignId,
        grant: i64,
        amount: i64,
    },

    #[error("grant {grant} belongs to {actual}, not {campaign}")]
    ForeignGrant {
        campaign: CampaignId,
        grant: i64,
        actual: CampaignId,
    },
}

/// Check INV-1, INV-3 and INV-4 for `campaign` against its grant records.
pub fn check_campaign(campaign: &Campaign, grants: &[GrantRecord]) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for grant in grants {
        if grant.campaign_id != campaign.id {
            violations.push(InvariantViolation::ForeignGrant {
                campaign: campaign.id,
                grant: grant.id,
                actual: grant.campaign_id,
            });
        } else if grant.amount <= 0 {
            violations.push(InvariantViolation::NonPositiveGrant {
                campaign: campaign.id,
                grant: grant.id,
                amount: grant.amount,
            });
        }
    }

    let recorded: i64 = grants
        .iter()
        .filter(|g| g.campaign_id == campaign.id)
        .map(|g| g.amount)
        .sum();
    if recorded != campaign.funding_total {
        violations.push(InvariantViolation::TotalMismatch {
            campaign: campaign.id,
            cached: campaign.funding_total,
            recorded,
        });
    }

    if let Some(maximum) = campaign.maximum_threshold {
        if campaign.funding_total > maximum {
            violations.push(InvariantViolation::OverCap {
                campaign: campaign.id,
                total: campaign.funding_total,
                maximum,
            });
        }
    }

    let expected = funding::snapshot(
        campaign.funding_total,
        campaign.minimum_threshold,
        campaign.maximum_threshold,
    );
    if expected != campaign.snapshot() {
        violations.push(InvariantViolation::StaleFlags {
            campaign: campaign.id,
            stored: campaign.snapshot(),
            expected,
        });
    }

    violations
}

/// Check INV-2 for `account`.
pub fn check_account(account: &UserAccount) -> Option<InvariantViolation> {
    (account.balance < 0).then(|| InvariantViolation::NegativeBalance {
        user: account.id,
        balance: account.balance,
    })
}
