//! SQLite implementation of the ledger's storage contract.
//!
//! Each attempt runs inside one `BEGIN IMMEDIATE` transaction, so transfers
//! queue on the write lock for at most the busy timeout before reading. The
//! commit writes are still guarded by the row versions read at load time: a
//! write that raced another one fails with `Conflict` instead of writing over
//! it. SQLite's own lock errors (`SQLITE_BUSY` / `SQLITE_LOCKED`) and pool
//! acquire timeouts are reported as `Busy`. Either way the transaction is
//! rolled back and the ledger retries.

use async_trait::async_trait;
use grant_ledger::{
    Campaign, CampaignId, GrantRecord, LedgerStore, LedgerTx, StoreError, TransferWrite,
    UserAccount, UserId,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, warn};

use crate::db;
use crate::records::{fetch_campaign, fetch_user};

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    type Tx = SqliteTx;

    async fn begin(&self) -> Result<SqliteTx, StoreError> {
        let tx = db::begin_immediate(&self.pool).await.map_err(store_error)?;
        Ok(SqliteTx { tx })
    }
}

#[async_trait]
impl LedgerTx for SqliteTx {
    async fn load_for_update(
        &mut self,
        actor: UserId,
        campaign: CampaignId,
    ) -> Result<(UserAccount, Campaign), StoreError> {
        let user = fetch_user(&mut *self.tx, actor)
            .await
            .map_err(store_error)?
            .ok_or(StoreError::UserNotFound(actor))?;
        let camp = fetch_campaign(&mut *self.tx, campaign)
            .await
            .map_err(store_error)?
            .ok_or(StoreError::CampaignNotFound(campaign))?;
        debug!(
            user_version = user.version,
            campaign_version = camp.version,
            "Loaded transfer parties"
        );
        Ok((user, camp))
    }

    async fn commit(mut self, write: TransferWrite) -> Result<GrantRecord, StoreError> {
        match apply(&mut self.tx, &write).await {
            Ok(id) => {
                self.tx.commit().await.map_err(store_error)?;
                Ok(GrantRecord {
                    id,
                    user_id: write.actor_id,
                    campaign_id: write.campaign_id,
                    amount: write.amount,
                    created_at: write.created_at,
                })
            }
            Err(err) => {
                if let Err(rollback) = self.tx.rollback().await {
                    warn!("Rollback after failed transfer write failed: {rollback}");
                }
                Err(err)
            }
        }
    }

    async fn abort(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(store_error)
    }
}

/// Write the actor, the campaign and the grant record. Returns the grant id.
async fn apply(
    tx: &mut Transaction<'static, Sqlite>,
    write: &TransferWrite,
) -> Result<i64, StoreError> {
    let updated = sqlx::query(
        "UPDATE users SET balance = ?1, version = version + 1 WHERE id = ?2 AND version = ?3",
    )
    .bind(write.actor_balance)
    .bind(write.actor_id.0)
    .bind(write.actor_version)
    .execute(&mut **tx)
    .await
    .map_err(store_error)?
    .rows_affected();
    if updated == 0 {
        return Err(StoreError::Conflict(write.actor_id.to_string()));
    }

    let updated = sqlx::query(
        r#"
        UPDATE campaigns
        SET    funding_total = ?1,
               minimum_funded = ?2,
               fully_funded = ?3,
               version = version + 1
        WHERE  id = ?4 AND version = ?5
        "#,
    )
    .bind(write.snapshot.funding_total)
    .bind(write.snapshot.minimum_funded)
    .bind(write.snapshot.fully_funded)
    .bind(write.campaign_id.0)
    .bind(write.campaign_version)
    .execute(&mut **tx)
    .await
    .map_err(store_error)?
    .rows_affected();
    if updated == 0 {
        return Err(StoreError::Conflict(write.campaign_id.to_string()));
    }

    let id = sqlx::query(
        "INSERT INTO grants (user_id, campaign_id, amount, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(write.actor_id.0)
    .bind(write.campaign_id.0)
    .bind(write.amount)
    .bind(write.created_at)
    .execute(&mut **tx)
    .await
    .map_err(store_error)?
    .last_insert_rowid();

    Ok(id)
}

/// Classify a sqlx error: lock contention is retryable, everything else is not.
fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut => StoreError::Busy(err.to_string()),
        sqlx::Error::Database(db) => {
            let primary = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            match primary {
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => StoreError::Busy(err.to_string()),
                _ => StoreError::Backend(err.to_string()),
            }
        }
        _ => StoreError::Backend(err.to_string()),
    }
}
