//! Account management routes
//!
//! Endpoints:
//! - GET  /accounts/status          pool stats plus a preview of the first accounts
//! - POST /accounts/reload          re-read accounts from the store
//! - POST /accounts/update-balance  probe every account, persist
//! - POST /accounts/reset-disabled  give zero-balance accounts a fresh balance
//! - GET  /config/status            account source, count, port, default balance
//!
//! Session credentials never appear in any response.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use freeplay_client::Account;
use freeplay_pool::EPSILON;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::state::AppState;

/// Accounts included in the status preview
const STATUS_PREVIEW: usize = 15;

/// Project id characters shown before truncation
const PROJECT_PREFIX: usize = 8;

/// One row of the status preview.
#[derive(Debug, Serialize)]
struct AccountSummary {
    email: String,
    balance: String,
    status: &'static str,
    project_id: String,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        let status = if account.balance > EPSILON {
            "available"
        } else if account.balance > 0.0 {
            "low_balance"
        } else {
            "disabled"
        };
        let prefix: String = account.project_id.chars().take(PROJECT_PREFIX).collect();
        Self {
            email: account.email.clone(),
            balance: format!("${:.4}", account.balance),
            status,
            project_id: format!("{prefix}..."),
        }
    }
}

/// GET /accounts/status
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.pool.stats().await;
    let accounts: Vec<AccountSummary> = state
        .pool
        .accounts()
        .await
        .iter()
        .take(STATUS_PREVIEW)
        .map(AccountSummary::from)
        .collect();

    Json(json!({
        "total_accounts": stats.total,
        "available_accounts": stats.available,
        "disabled_accounts": stats.disabled,
        "low_balance_accounts": stats.low_balance,
        "total_balance": format!("${:.4}", stats.total_balance),
        "current_index": state.pool.cursor().await,
        "accounts": accounts,
    }))
}

/// POST /accounts/reload
pub async fn reload(State(state): State<AppState>) -> Response {
    match state.pool.reload().await {
        Ok(total) => {
            info!(total, "accounts reloaded via admin route");
            Json(json!({ "message": "accounts reloaded", "total_accounts": total })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "account reload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": { "message": e.to_string(), "type": "internal_error", "code": e.code() } })),
            )
                .into_response()
        }
    }
}

/// POST /accounts/update-balance
pub async fn update_balance(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.pool.refresh_all().await;
    Json(json!({
        "message": "balances updated",
        "updated": summary.updated,
        "failed": summary.failed,
        "total": summary.updated + summary.failed,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ResetRequest {
    default_balance: Option<f64>,
}

/// POST /accounts/reset-disabled
///
/// The body is optional; an empty body uses the configured default balance.
pub async fn reset_disabled(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ResetRequest::default()
    } else {
        match serde_json::from_slice::<ResetRequest>(&body) {
            Ok(request) => request,
            Err(e) => return bad_request(format!("invalid request body: {e}")),
        }
    };

    let balance = request.default_balance.unwrap_or(state.default_balance);
    if !(balance >= 0.0) || !balance.is_finite() {
        return bad_request("default_balance must be a non-negative number".into());
    }

    let reset = state.pool.reset_disabled(balance).await;
    info!(reset, balance, "disabled accounts reset via admin route");
    Json(json!({
        "message": format!("reset {reset} disabled accounts"),
        "reset_count": reset,
        "default_balance": balance,
    }))
    .into_response()
}

/// GET /config/status
///
/// `config_source` is null when no source yielded accounts.
pub async fn config_status(State(state): State<AppState>) -> impl IntoResponse {
    let source = state.store.active_source().await.map(|s| s.label());
    Json(json!({
        "config_source": source,
        "accounts_count": state.pool.len().await,
        "port": state.port,
        "default_balance": state.default_balance,
    }))
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": { "message": message, "type": "invalid_request_error" } })),
    )
        .into_response()
}
