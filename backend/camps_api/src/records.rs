//! Row shapes as stored in / read from SQLite, and their conversion into
//! ledger types.
//!
//! The fetch helpers are generic over the executor so that the same queries
//! run against the pool and inside a ledger transaction.

use chrono::{DateTime, Utc};
use grant_ledger::{Campaign, CampaignId, GrantRecord, UserAccount, UserId};
use sqlx::{Executor, Sqlite};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub balance: i64,
    pub version: i64,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        UserAccount {
            id: UserId(row.id),
            email: row.email,
            balance: row.balance,
            version: row.version,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub creator_id: i64,
    pub name: String,
    pub description: String,
    pub minimum_threshold: Option<i64>,
    pub maximum_threshold: Option<i64>,
    pub funding_total: i64,
    pub minimum_funded: bool,
    pub fully_funded: bool,
    pub granting_enabled: bool,
    pub drive_folder_path: Option<String>,
    pub drive_budget_file_path: Option<String>,
    pub version: i64,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Campaign {
            id: CampaignId(row.id),
            creator_id: UserId(row.creator_id),
            name: row.name,
            description: row.description,
            minimum_threshold: row.minimum_threshold,
            maximum_threshold: row.maximum_threshold,
            funding_total: row.funding_total,
            minimum_funded: row.minimum_funded,
            fully_funded: row.fully_funded,
            granting_enabled: row.granting_enabled,
            drive_folder_path: row.drive_folder_path,
            drive_budget_file_path: row.drive_budget_file_path,
            version: row.version,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GrantRow {
    pub id: i64,
    pub user_id: i64,
    pub campaign_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl From<GrantRow> for GrantRecord {
    fn from(row: GrantRow) -> Self {
        GrantRecord {
            id: row.id,
            user_id: UserId(row.user_id),
            campaign_id: CampaignId(row.campaign_id),
            amount: row.amount,
            created_at: row.created_at,
        }
    }
}

pub async fn fetch_user<'e, E>(executor: E, id: UserId) -> Result<Option<UserAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, balance, version FROM users WHERE id = ?1",
    )
    .bind(id.0)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn fetch_campaign<'e, E>(
    executor: E,
    id: CampaignId,
) -> Result<Option<Campaign>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, CampaignRow>(
        r#"
        SELECT id, creator_id, name, description, minimum_threshold, maximum_threshold,
               funding_total, minimum_funded, fully_funded, granting_enabled,
               drive_folder_path, drive_budget_file_path, version
        FROM   campaigns
        WHERE  id = ?1
        "#,
    )
    .bind(id.0)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Into::into))
}
