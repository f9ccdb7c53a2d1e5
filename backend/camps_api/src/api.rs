//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use grant_ledger::invariants::{check_account, check_campaign};
use grant_ledger::{
    funding, Campaign, CampaignId, FundingSnapshot, GrantLedger, GrantRecord, InvariantViolation,
    NewCampaign, TransferReceipt, UserAccount, UserId,
};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::DriveConfig;
use crate::db;
use crate::drive;
use crate::errors::{ApiError, Result};
use crate::store::SqliteLedgerStore;

pub struct ApiState {
    pub pool: SqlitePool,
    pub ledger: GrantLedger<SqliteLedgerStore>,
    pub default_grants: i64,
    pub drive: Option<DriveConfig>,
    pub client: Client,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user))
        .route("/campaigns", post(create_campaign))
        .route("/campaigns/:id", get(get_campaign).patch(update_campaign))
        .route("/campaigns/:id/toggle-granting", post(toggle_granting))
        .route(
            "/campaigns/:id/grants",
            get(get_campaign_grants).post(transfer_grants),
        )
        .route("/campaigns/:id/audit", get(audit_campaign))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
}

/// Partial campaign edit. An absent field is left alone; an explicit `null`
/// clears a threshold.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub minimum_threshold: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub maximum_threshold: Option<Option<i64>>,
}

fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub actor_id: i64,
    pub amount: i64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct CampaignResponse {
    #[serde(flatten)]
    pub campaign: Campaign,
    /// Grants still accepted before the cap; absent when no cap is set.
    pub remaining_budget: Option<i64>,
}

#[derive(Serialize)]
pub struct GrantsResponse {
    pub campaign_id: CampaignId,
    pub count: usize,
    pub total: i64,
    pub grants: Vec<GrantRecord>,
}

#[derive(Serialize)]
pub struct AuditResponse {
    pub campaign_id: CampaignId,
    pub consistent: bool,
    pub snapshot: FundingSnapshot,
    pub violations: Vec<InvariantViolation>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /users`
///
/// Provisions an account holding the configured default grant balance.
pub async fn create_user(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("a valid email is required".to_string()));
    }

    let user = db::create_user(&state.pool, &email, state.default_grants).await?;
    info!("Provisioned {} with {} grants", user.id, user.balance);
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/:id`
pub async fn get_user(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<UserAccount>> {
    let user = db::get_user(&state.pool, UserId(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(UserId(id).to_string()))?;
    Ok(Json(user))
}

/// `POST /campaigns`
///
/// Creates the campaign, then provisions its document folder when the
/// integration is enabled. A provisioning failure is logged and the
/// campaign is kept.
pub async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    Json(new): Json<NewCampaign>,
) -> Result<impl IntoResponse> {
    validate_new_campaign(&new)?;

    let creator = db::get_user(&state.pool, new.creator_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(new.creator_id.to_string()))?;

    let mut campaign = db::create_campaign(&state.pool, &new).await?;
    info!("Created {} for {}", campaign.id, creator.id);

    if let Some(drive_config) = &state.drive {
        match drive::create_campaign_folder(
            &state.client,
            drive_config,
            &creator.email,
            campaign.id.0,
            &campaign.name,
        )
        .await
        {
            Ok(folder) => {
                db::set_drive_paths(
                    &state.pool,
                    campaign.id,
                    &folder.folder_path,
                    folder.budget_file_path.as_deref(),
                )
                .await?;
                campaign.drive_folder_path = Some(folder.folder_path);
                campaign.drive_budget_file_path = folder.budget_file_path;
            }
            Err(e) => warn!("Folder provisioning for {} failed: {e}", campaign.id),
        }
    }

    Ok((StatusCode::CREATED, Json(campaign_response(campaign))))
}

/// `GET /campaigns/:id`
///
/// Flags are re-derived from the stored total and thresholds.
pub async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<CampaignResponse>> {
    let campaign = load_campaign(&state.pool, CampaignId(id)).await?;
    Ok(Json(campaign_response(campaign)))
}

/// `PATCH /campaigns/:id`
///
/// Edits the name, description or thresholds. The cap may not drop below
/// the grants already received; both funding flags follow the new
/// thresholds.
pub async fn update_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCampaignRequest>,
) -> Result<Json<CampaignResponse>> {
    let campaign = db::update_campaign(&state.pool, CampaignId(id), |campaign| {
        if let Some(name) = req.name {
            campaign.name = name;
        }
        if let Some(description) = req.description {
            campaign.description = description;
        }
        if let Some(min) = req.minimum_threshold {
            campaign.minimum_threshold = min;
        }
        if let Some(max) = req.maximum_threshold {
            campaign.maximum_threshold = max;
        }

        validate_campaign_fields(
            &campaign.name,
            campaign.minimum_threshold,
            campaign.maximum_threshold,
        )?;
        if let Some(max) = campaign.maximum_threshold {
            if max < campaign.funding_total {
                return Err(ApiError::Validation(format!(
                    "maximum threshold {max} is below the {} grants already received",
                    campaign.funding_total
                )));
            }
        }
        Ok(())
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(CampaignId(id).to_string()))?;
    Ok(Json(campaign_response(campaign)))
}

/// `POST /campaigns/:id/toggle-granting`
pub async fn toggle_granting(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<CampaignResponse>> {
    let campaign = db::toggle_granting(&state.pool, CampaignId(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(CampaignId(id).to_string()))?;
    Ok(Json(campaign_response(campaign)))
}

/// `POST /campaigns/:id/grants`
///
/// Sends grants from `actor_id` to the campaign.
pub async fn transfer_grants(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(req): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransferReceipt>)> {
    let receipt = state
        .ledger
        .transfer_grant(UserId(req.actor_id), CampaignId(id), req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /campaigns/:id/grants`
pub async fn get_campaign_grants(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<GrantsResponse>> {
    let campaign = load_campaign(&state.pool, CampaignId(id)).await?;
    let grants = db::grants_for_campaign(&state.pool, campaign.id).await?;
    Ok(Json(GrantsResponse {
        campaign_id: campaign.id,
        count: grants.len(),
        total: grants.iter().map(|g| g.amount).sum(),
        grants,
    }))
}

/// `GET /campaigns/:id/audit`
///
/// Checks the cached funding state against the grant records, and the
/// balances of every contributor.
pub async fn audit_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<AuditResponse>> {
    let campaign = load_campaign(&state.pool, CampaignId(id)).await?;
    let grants = db::grants_for_campaign(&state.pool, campaign.id).await?;

    let mut violations = check_campaign(&campaign, &grants);

    let mut contributors: Vec<UserId> = grants.iter().map(|g| g.user_id).collect();
    contributors.sort();
    contributors.dedup();
    for user_id in contributors {
        if let Some(user) = db::get_user(&state.pool, user_id).await? {
            violations.extend(check_account(&user));
        }
    }

    if !violations.is_empty() {
        warn!("{} failed audit: {violations:?}", campaign.id);
    }

    Ok(Json(AuditResponse {
        campaign_id: campaign.id,
        consistent: violations.is_empty(),
        snapshot: campaign.snapshot(),
        violations,
    }))
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

async fn load_campaign(pool: &SqlitePool, id: CampaignId) -> Result<Campaign> {
    db::get_campaign(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(id.to_string()))
}

fn campaign_response(mut campaign: Campaign) -> CampaignResponse {
    let flags = funding::project(
        campaign.funding_total,
        campaign.minimum_threshold,
        campaign.maximum_threshold,
    );
    campaign.minimum_funded = flags.minimum_funded;
    campaign.fully_funded = flags.fully_funded;
    CampaignResponse {
        remaining_budget: campaign.remaining_budget(),
        campaign,
    }
}

fn validate_new_campaign(new: &NewCampaign) -> Result<()> {
    validate_campaign_fields(&new.name, new.minimum_threshold, new.maximum_threshold)
}

fn validate_campaign_fields(name: &str, min: Option<i64>, max: Option<i64>) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation("campaign name is required".to_string()));
    }
    if min.is_some_and(|v| v < 0) || max.is_some_and(|v| v < 0) {
        return Err(ApiError::Validation(
            "thresholds must not be negative".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ApiError::Validation(format!(
                "minimum threshold {min} exceeds maximum threshold {max}"
            )));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
