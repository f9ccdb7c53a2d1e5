//! In-process [`LedgerStore`] backed by a single mutex.
//!
//! A transaction holds the mutex from `begin` until `commit`/`abort`, which
//! serializes every transfer. `begin` waits at most `lock_timeout` for the
//! mutex and reports [`StoreError::Busy`] otherwise.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::errors::StoreError;
use crate::storage::{LedgerStore, LedgerTx, TransferWrite};
use crate::types::{Campaign, CampaignId, GrantRecord, NewCampaign, UserAccount, UserId};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, UserAccount>,
    campaigns: HashMap<CampaignId, Campaign>,
    grants: Vec<GrantRecord>,
    next_user_id: i64,
    next_campaign_id: i64,
}

#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
}

impl InMemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_timeout,
        }
    }

    pub async fn insert_user(&self, email: &str, balance: i64) -> UserAccount {
        let mut state = self.state.lock().await;
        state.next_user_id += 1;
        let user = UserAccount {
            id: UserId(state.next_user_id),
            email: email.to_string(),
            balance,
            version: 0,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    pub async fn insert_campaign(&self, new: NewCampaign) -> Campaign {
        let mut state = self.state.lock().await;
        state.next_campaign_id += 1;
        let campaign = Campaign {
            id: CampaignId(state.next_campaign_id),
            creator_id: new.creator_id,
            name: new.name,
            description: new.description,
            minimum_threshold: new.minimum_threshold,
            maximum_threshold: new.maximum_threshold,
            funding_total: 0,
            minimum_funded: false,
            fully_funded: false,
            granting_enabled: false,
            drive_folder_path: None,
            drive_budget_file_path: None,
            version: 0,
        };
        state.campaigns.insert(campaign.id, campaign.clone());
        campaign
    }

    pub async fn user(&self, id: UserId) -> Option<UserAccount> {
        self.state.lock().await.users.get(&id).cloned()
    }

    pub async fn campaign(&self, id: CampaignId) -> Option<Campaign> {
        self.state.lock().await.campaigns.get(&id).cloned()
    }

    pub async fn grants_for(&self, id: CampaignId) -> Vec<GrantRecord> {
        self.state
            .lock()
            .await
            .grants
            .iter()
            .filter(|g| g.campaign_id == id)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::Busy(format!(
                    "ledger lock not acquired within {:?}",
                    self.lock_timeout
                ))
            })?;
        Ok(MemoryTx { guard })
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn load_for_update(
        &mut self,
        actor: UserId,
        campaign: CampaignId,
    ) -> Result<(UserAccount, Campaign), StoreError> {
        let user = self
            .guard
            .users
            .get(&actor)
            .cloned()
            .ok_or(StoreError::UserNotFound(actor))?;
        let camp = self
            .guard
            .campaigns
            .get(&campaign)
            .cloned()
            .ok_or(StoreError::CampaignNotFound(campaign))?;
        Ok((user, camp))
    }

    async fn commit(mut self, write: TransferWrite) -> Result<GrantRecord, StoreError> {
        let state = &mut *self.guard;

        // Validate both rows before touching either.
        let user = state
            .users
            .get(&write.actor_id)
            .ok_or(StoreError::UserNotFound(write.actor_id))?;
        if user.version != write.actor_version {
            return Err(StoreError::Conflict(write.actor_id.to_string()));
        }
        let camp = state
            .campaigns
            .get(&write.campaign_id)
            .ok_or(StoreError::CampaignNotFound(write.campaign_id))?;
        if camp.version != write.campaign_version {
            return Err(StoreError::Conflict(write.campaign_id.to_string()));
        }

        if let Some(user) = state.users.get_mut(&write.actor_id) {
            user.balance = write.actor_balance;
            user.version += 1;
        }
        if let Some(camp) = state.campaigns.get_mut(&write.campaign_id) {
            camp.funding_total = write.snapshot.funding_total;
            camp.minimum_funded = write.snapshot.minimum_funded;
            camp.fully_funded = write.snapshot.fully_funded;
            camp.version += 1;
        }

        let record = GrantRecord {
            id: state.grants.len() as i64 + 1,
            user_id: write.actor_id,
            campaign_id: write.campaign_id,
            amount: write.amount,
            created_at: write.created_at,
        };
        state.grants.push(record.clone());
        Ok(record)
    }

    async fn abort(self) -> Result<(), StoreError> {
        Ok(())
    }
}
