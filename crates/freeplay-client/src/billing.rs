//! Balance probe against the Freeplay billing endpoint
//!
//! The remaining balance is the `usage_limit - usage_value` pair of the
//! "Freeplay credits" entry in the billing document's `feature_usage` array.

use std::future::Future;
use std::pin::Pin;

use provider::BalanceProber;
use serde_json::Value;
use tracing::debug;

use crate::constants::{BILLING_PATH, CREDITS_FEATURE_NAME, FREEPLAY_BASE_URL, USER_AGENT, session_cookie};
use crate::error::{Error, Result};

/// Stateless billing client. Every probe is a fresh upstream request.
#[derive(Debug, Clone)]
pub struct BillingClient {
    client: reqwest::Client,
    base_url: String,
}

impl BillingClient {
    /// Point the probe at a different origin (tests, staging).
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the remaining credit balance for a session.
    pub async fn fetch_balance(&self, session_id: &str) -> Result<f64> {
        let url = format!("{}{BILLING_PATH}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("accept", "*/*")
            .header("origin", FREEPLAY_BASE_URL)
            .header("user-agent", USER_AGENT)
            .header("cookie", session_cookie(session_id))
            .send()
            .await
            .map_err(|e| Error::Http(format!("billing request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // 401/403 means the session expired or the account was banned
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::InvalidCredentials(format!(
                    "billing rejected session ({status})"
                )));
            }

            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let doc = response
            .json::<Value>()
            .await
            .map_err(|e| Error::AccountParse(format!("invalid billing response: {e}")))?;

        let balance = parse_balance(&doc)?;
        debug!(balance, "probed account balance");
        Ok(balance)
    }
}

/// Extract the remaining credits from a billing document.
///
/// Missing `usage_limit` / `usage_value` numbers read as zero; a missing
/// credits entry is `NotFound`.
pub fn parse_balance(doc: &Value) -> Result<f64> {
    let features = doc
        .get("feature_usage")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    features
        .iter()
        .find(|f| f.get("feature_name").and_then(Value::as_str) == Some(CREDITS_FEATURE_NAME))
        .map(|f| {
            let limit = f.get("usage_limit").and_then(Value::as_f64).unwrap_or(0.0);
            let used = f.get("usage_value").and_then(Value::as_f64).unwrap_or(0.0);
            limit - used
        })
        .ok_or_else(|| Error::NotFound(format!("no '{CREDITS_FEATURE_NAME}' usage entry")))
}

impl BalanceProber for BillingClient {
    fn id(&self) -> &str {
        "freeplay-billing"
    }

    fn probe<'a>(
        &'a self,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<f64>> + Send + 'a>> {
        Box::pin(async move { self.fetch_balance(session_id).await.map_err(Into::into) })
    }
}
