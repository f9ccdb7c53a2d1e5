//! Transfer validation.
//!
//! Everything here is pure: given the loaded actor and campaign, decide
//! whether a transfer is accepted and what state it leads to. Checks run in a
//! fixed order and the first failing one wins.

use crate::errors::{Result, TransferError};
use crate::funding;
use crate::types::{Campaign, FundingSnapshot, UserAccount};

/// The state a validated transfer will write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub requested_amount: i64,
    pub effective_amount: i64,
    pub actor_balance_after: i64,
    pub snapshot: FundingSnapshot,
}

/// Reject non-positive amounts before any storage is touched.
pub fn validate_amount(requested: i64) -> Result<()> {
    if requested < 1 {
        return Err(TransferError::InvalidAmount { requested });
    }
    Ok(())
}

/// Validate a transfer of `requested` grants from `actor` to `campaign`.
pub fn plan_transfer(
    actor: &UserAccount,
    campaign: &Campaign,
    requested: i64,
) -> Result<TransferPlan> {
    validate_amount(requested)?;

    let maximum = campaign
        .maximum_threshold
        .ok_or(TransferError::MissingBudgetConfiguration(campaign.id))?;

    let remaining = maximum.saturating_sub(campaign.funding_total);
    let effective = requested.min(remaining);
    if effective <= 0 {
        return Err(TransferError::AlreadyFullyFunded(campaign.id));
    }

    if actor.balance < effective {
        return Err(TransferError::InsufficientBalance {
            requested: effective,
            available: actor.balance,
        });
    }

    // effective <= maximum - funding_total, so the sum stays <= maximum.
    let funding_total = campaign.funding_total + effective;

    Ok(TransferPlan {
        requested_amount: requested,
        effective_amount: effective,
        actor_balance_after: actor.balance - effective,
        snapshot: funding::snapshot(
            funding_total,
            campaign.minimum_threshold,
            campaign.maximum_threshold,
        ),
    })
}
