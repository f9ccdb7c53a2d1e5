//! Database layer: migrations and the non-ledger queries.
//!
//! Writes to `balance` and `funding_total` happen only in [`crate::store`].
//! The funding flags are also rewritten by [`update_campaign`], which
//! re-projects them from the edited thresholds.

use std::str::FromStr;
use std::time::Duration;

use grant_ledger::{funding, Campaign, CampaignId, GrantRecord, NewCampaign, UserAccount, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::errors::{ApiError, Result};
use crate::records::{fetch_campaign, fetch_user, GrantRow};

/// Establish a SQLite connection pool and run pending migrations.
///
/// `lock_timeout` bounds both the wait for a pooled connection and the SQLite
/// busy timeout: a writer waits at most this long for a competing writer
/// before failing with `SQLITE_BUSY`.
pub async fn init_pool(database_url: &str, lock_timeout: Duration) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(lock_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(lock_timeout)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

/// Open a transaction that takes the write lock before its first read.
///
/// A deferred transaction that reads and then writes cannot wait out a
/// competing writer in WAL mode: its snapshot is already stale, so the
/// upgrade fails with `SQLITE_BUSY_SNAPSHOT` without calling the busy
/// handler. `BEGIN IMMEDIATE` queues on the busy timeout instead.
pub async fn begin_immediate(pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

// ─────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────

/// Provision a user account with an initial grant balance.
pub async fn create_user(pool: &SqlitePool, email: &str, balance: i64) -> Result<UserAccount> {
    let id = sqlx::query("INSERT INTO users (email, balance) VALUES (?1, ?2)")
        .bind(email)
        .bind(balance)
        .execute(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ApiError::Validation(format!("email {email} is already registered"))
            }
            other => other.into(),
        })?
        .last_insert_rowid();

    get_user(pool, UserId(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(UserId(id).to_string()))
}

pub async fn get_user(pool: &SqlitePool, id: UserId) -> Result<Option<UserAccount>> {
    Ok(fetch_user(pool, id).await?)
}

// ─────────────────────────────────────────────────────────
// Campaigns
// ─────────────────────────────────────────────────────────

/// Insert a campaign with an empty funding total.
pub async fn create_campaign(pool: &SqlitePool, new: &NewCampaign) -> Result<Campaign> {
    let id = sqlx::query(
        r#"
        INSERT INTO campaigns
            (creator_id, name, description, minimum_threshold, maximum_threshold)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(new.creator_id.0)
    .bind(&new.name)
    .bind(&new.description)
    .bind(new.minimum_threshold)
    .bind(new.maximum_threshold)
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_campaign(pool, CampaignId(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(CampaignId(id).to_string()))
}

pub async fn get_campaign(pool: &SqlitePool, id: CampaignId) -> Result<Option<Campaign>> {
    Ok(fetch_campaign(pool, id).await?)
}

/// Edit a campaign's descriptive fields and thresholds.
///
/// `edit` sees the row as it is inside a write transaction and may reject the
/// change. The funding flags are re-projected from the edited thresholds and
/// written with the edit in one version-bumping statement, so a concurrent
/// transfer either sees the old thresholds or retries against the new ones.
/// Returns `None` for an unknown campaign.
pub async fn update_campaign<F>(pool: &SqlitePool, id: CampaignId, edit: F) -> Result<Option<Campaign>>
where
    F: FnOnce(&mut Campaign) -> Result<()>,
{
    let mut tx = begin_immediate(pool).await?;
    let Some(mut campaign) = fetch_campaign(&mut *tx, id).await? else {
        return Ok(None);
    };
    let version = campaign.version;

    edit(&mut campaign)?;
    let flags = funding::project(
        campaign.funding_total,
        campaign.minimum_threshold,
        campaign.maximum_threshold,
    );

    let updated = sqlx::query(
        r#"
        UPDATE campaigns
        SET    name = ?1,
               description = ?2,
               minimum_threshold = ?3,
               maximum_threshold = ?4,
               minimum_funded = ?5,
               fully_funded = ?6,
               version = version + 1
        WHERE  id = ?7 AND version = ?8
        "#,
    )
    .bind(&campaign.name)
    .bind(&campaign.description)
    .bind(campaign.minimum_threshold)
    .bind(campaign.maximum_threshold)
    .bind(flags.minimum_funded)
    .bind(flags.fully_funded)
    .bind(id.0)
    .bind(version)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if updated == 0 {
        return Err(ApiError::Validation(format!("{id} changed during the edit")));
    }
    tx.commit().await?;

    info!(
        "Updated {id}: thresholds {:?}..{:?}",
        campaign.minimum_threshold, campaign.maximum_threshold
    );
    get_campaign(pool, id).await
}

/// Record where the campaign's document folder and budget file live.
pub async fn set_drive_paths(
    pool: &SqlitePool,
    id: CampaignId,
    folder_path: &str,
    budget_file_path: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE campaigns SET drive_folder_path = ?1, drive_budget_file_path = ?2 WHERE id = ?3",
    )
    .bind(folder_path)
    .bind(budget_file_path)
    .bind(id.0)
    .execute(pool)
    .await?;
    Ok(())
}

/// Flip the granting display toggle. Returns `None` for an unknown campaign.
pub async fn toggle_granting(pool: &SqlitePool, id: CampaignId) -> Result<Option<Campaign>> {
    let affected = sqlx::query(
        "UPDATE campaigns SET granting_enabled = NOT granting_enabled WHERE id = ?1",
    )
    .bind(id.0)
    .execute(pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Ok(None);
    }
    get_campaign(pool, id).await
}

// ─────────────────────────────────────────────────────────
// Grant reads
// ─────────────────────────────────────────────────────────

/// Fetch all grant records for a campaign, oldest first.
pub async fn grants_for_campaign(pool: &SqlitePool, id: CampaignId) -> Result<Vec<GrantRecord>> {
    let rows = sqlx::query_as::<_, GrantRow>(
        r#"
        SELECT id, user_id, campaign_id, amount, created_at
        FROM   grants
        WHERE  campaign_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(id.0)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}
