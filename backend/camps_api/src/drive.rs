//! Document-storage client: asks the configured script endpoint to create
//! a folder and budget file for a newly created campaign.
//!
//! ## Resilience
//!
//! * Transport errors, rate limits and 5xx responses are retried with
//!   exponential back-off, up to [`MAX_ATTEMPTS`] tries.
//! * A script-level error (the script ran but threw) is not retried.
//!
//! The call is made after the campaign row is committed and never while a
//! database transaction is open.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::DriveConfig;
use crate::errors::{ApiError, Result};

const MAX_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 4_000;

// ─────────────────────────────────────────────────────────
// Script execution response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScriptResponse {
    pub response: Option<ScriptResult>,
    pub error: Option<ScriptError>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptResult {
    pub result: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptError {
    pub code: Option<i64>,
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<ScriptErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptErrorDetail {
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(rename = "errorType")]
    pub error_type: Option<String>,
    #[serde(rename = "scriptStackTraceElements", default)]
    pub stack: Vec<StackElement>,
}

#[derive(Debug, Deserialize)]
pub struct StackElement {
    pub function: Option<String>,
    #[serde(rename = "lineNumber")]
    pub line_number: Option<i64>,
}

/// Where the provisioned documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveFolder {
    pub folder_path: String,
    pub budget_file_path: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────

/// Create the document folder for a campaign.
///
/// The script receives `[creator_email, campaign_id, campaign_name]` and
/// answers with `{ "id": folder, "budget": budget_file }`.
pub async fn create_campaign_folder(
    client: &Client,
    config: &DriveConfig,
    creator_email: &str,
    campaign_id: i64,
    campaign_name: &str,
) -> Result<DriveFolder> {
    let body = json!({
        "function": config.function,
        "parameters": [creator_email, campaign_id, campaign_name],
    });

    let mut backoff = INITIAL_BACKOFF_MS;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let mut request = client.post(&config.script_url).json(&body);
        if let Some(token) = &config.token {
            request = request.bearer_auth(token);
        }

        let retry_reason = match request.send().await {
            Err(e) => format!("request failed: {e}"),
            Ok(resp) => {
                let status = resp.status();
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    format!("endpoint answered {status}")
                } else if !status.is_success() {
                    return Err(ApiError::Provisioning(format!(
                        "script endpoint rejected the call with {status}"
                    )));
                } else {
                    let parsed: ScriptResponse = resp.json().await?;
                    debug!("Script response for campaign {campaign_id}: {parsed:?}");
                    return decode_response(parsed);
                }
            }
        };

        if attempt >= MAX_ATTEMPTS {
            return Err(ApiError::Provisioning(format!(
                "giving up after {attempt} attempts: {retry_reason}"
            )));
        }
        warn!("Folder provisioning {retry_reason} (will retry in {backoff}ms)");
        tokio::time::sleep(Duration::from_millis(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_MS);
    }
}

// ─────────────────────────────────────────────────────────
// Response decoding
// ─────────────────────────────────────────────────────────

fn decode_response(body: ScriptResponse) -> Result<DriveFolder> {
    if let Some(err) = body.error {
        return Err(ApiError::Provisioning(describe_script_error(&err)));
    }

    let result = body
        .response
        .and_then(|r| r.result)
        .ok_or_else(|| ApiError::Provisioning("Empty result from script".to_string()))?;

    let folder_path = extract_field(&result, "id")
        .ok_or_else(|| ApiError::Provisioning("Script result has no folder id".to_string()))?;

    Ok(DriveFolder {
        folder_path,
        budget_file_path: extract_field(&result, "budget"),
    })
}

fn describe_script_error(err: &ScriptError) -> String {
    match err.details.first() {
        Some(detail) => {
            let mut msg = format!(
                "{}: {}",
                detail.error_type.as_deref().unwrap_or("ScriptError"),
                detail.error_message.as_deref().unwrap_or("unknown error")
            );
            for frame in &detail.stack {
                msg.push_str(&format!(
                    "\n\tat {}:{}",
                    frame.function.as_deref().unwrap_or("?"),
                    frame.line_number.unwrap_or_default()
                ));
            }
            msg
        }
        None => format!(
            "script error {}: {}",
            err.code.unwrap_or_default(),
            err.message.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn extract_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
