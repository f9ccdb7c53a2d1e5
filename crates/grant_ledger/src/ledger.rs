//! The grant ledger: validates a transfer and applies it through a
//! [`LedgerStore`] transaction, retrying on contention.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::errors::{Result, StoreError, TransferError};
use crate::storage::{LedgerStore, LedgerTx, TransferWrite};
use crate::transfer::{plan_transfer, validate_amount};
use crate::types::{CampaignId, TransferReceipt, UserId};

/// How many times a contended transfer is re-run before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `n` sleeps `n * backoff` before the next try.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(20),
        }
    }
}

/// Outcome of a single attempt.
enum Attempt {
    /// Lost a race or timed out on a lock; the whole attempt may be re-run.
    Contended(StoreError),
    /// Final answer for this request.
    Rejected(TransferError),
}

impl From<StoreError> for Attempt {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) | StoreError::Busy(_) => Attempt::Contended(err),
            StoreError::UserNotFound(id) => Attempt::Rejected(TransferError::UserNotFound(id)),
            StoreError::CampaignNotFound(id) => {
                Attempt::Rejected(TransferError::CampaignNotFound(id))
            }
            StoreError::Backend(msg) => Attempt::Rejected(TransferError::PersistenceFailure(msg)),
        }
    }
}

pub struct GrantLedger<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: LedgerStore> GrantLedger<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Move up to `requested` grants from `actor` into `campaign`.
    ///
    /// The applied amount is capped to the campaign's remaining budget. A
    /// rejected transfer leaves every balance, total and flag untouched.
    #[instrument(skip_all, fields(actor = actor.0, campaign = campaign.0, requested = requested))]
    pub async fn transfer_grant(
        &self,
        actor: UserId,
        campaign: CampaignId,
        requested: i64,
    ) -> Result<TransferReceipt> {
        validate_amount(requested)?;

        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_transfer(actor, campaign, requested).await {
                Ok(receipt) => {
                    info!(
                        effective = receipt.effective_amount,
                        total = receipt.snapshot.funding_total,
                        fully_funded = receipt.snapshot.fully_funded,
                        "Grant transfer committed"
                    );
                    return Ok(receipt);
                }
                Err(Attempt::Rejected(err)) => {
                    debug!(code = err.code(), "Grant transfer rejected: {err}");
                    return Err(err);
                }
                Err(Attempt::Contended(err)) => {
                    warn!("Grant transfer attempt {attempt}/{attempts} contended: {err}");
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff * attempt).await;
                    }
                }
            }
        }

        Err(TransferError::Busy { attempts })
    }

    async fn try_transfer(
        &self,
        actor: UserId,
        campaign: CampaignId,
        requested: i64,
    ) -> std::result::Result<TransferReceipt, Attempt> {
        let mut tx = self.store.begin().await?;

        let (account, camp) = match tx.load_for_update(actor, campaign).await {
            Ok(loaded) => loaded,
            Err(err) => {
                abort_quietly(tx).await;
                return Err(err.into());
            }
        };

        let plan = match plan_transfer(&account, &camp, requested) {
            Ok(plan) => plan,
            Err(err) => {
                abort_quietly(tx).await;
                return Err(Attempt::Rejected(err));
            }
        };

        let record = tx
            .commit(TransferWrite {
                actor_id: account.id,
                actor_version: account.version,
                actor_balance: plan.actor_balance_after,
                campaign_id: camp.id,
                campaign_version: camp.version,
                snapshot: plan.snapshot,
                amount: plan.effective_amount,
                created_at: Utc::now(),
            })
            .await?;

        Ok(TransferReceipt {
            actor_id: account.id,
            campaign_id: camp.id,
            requested_amount: plan.requested_amount,
            effective_amount: plan.effective_amount,
            actor_balance: plan.actor_balance_after,
            snapshot: plan.snapshot,
            grant_id: record.id,
        })
    }
}

async fn abort_quietly<T: LedgerTx>(tx: T) {
    if let Err(err) = tx.abort().await {
        warn!("Failed to abort ledger transaction: {err}");
    }
}
