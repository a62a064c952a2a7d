//! Upstream completion call with account failover
//!
//! One external request runs at most `pool.len()` upstream attempts. Each
//! attempt asks the pool for the current account, sends the completion, and
//! classifies a non-200 outcome: disabling failures zero the account and are
//! persisted before the next attempt, transient ones leave it untouched.

use std::sync::Arc;

use freeplay_client::{Account, ChatMessage, CompletionClient, ModelConfig};
use freeplay_pool::{Error, Pool, Result, classify_status};
use provider::ErrorClassification;
use tracing::{info, instrument, warn};

use crate::metrics;

/// Longest upstream error body excerpt kept in logs
const BODY_LOG_LIMIT: usize = 200;

/// Retry driver over the shared pool.
#[derive(Clone)]
pub struct Upstream {
    pool: Arc<Pool>,
    client: CompletionClient,
}

impl Upstream {
    pub fn new(pool: Arc<Pool>, client: CompletionClient) -> Self {
        Self { pool, client }
    }

    /// Run the completion against the pool until one account answers 200.
    ///
    /// Returns the open response together with the account that served it.
    /// `NoUsableAccount` ends the loop immediately; running out of attempts
    /// yields `AttemptsExhausted`.
    #[instrument(skip_all, fields(model = model.name, messages = messages.len()))]
    pub async fn execute(
        &self,
        messages: &[ChatMessage],
        model: &ModelConfig,
    ) -> Result<(reqwest::Response, Account)> {
        // An empty pool still gets one pass so it reports NoUsableAccount
        let max_attempts = self.pool.len().await.max(1);

        for attempt in 1..=max_attempts {
            let Some(account) = self.pool.get_current_account().await else {
                warn!(attempt, "no usable account");
                return Err(Error::NoUsableAccount);
            };

            let response = match self.client.send(&account, messages, model).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, account = %account.email, error = %e, "upstream transport failure");
                    metrics::record_upstream_error("transport");
                    continue;
                }
            };

            let status = response.status().as_u16();
            if status == 200 {
                info!(attempt, account = %account.email, "upstream accepted completion");
                return Ok((response, account));
            }

            let body = response.text().await.unwrap_or_default();
            let classification = classify_status(status, &body);
            metrics::record_upstream_error(classification.label());
            let excerpt: String = body.chars().take(BODY_LOG_LIMIT).collect();

            match classification {
                ErrorClassification::Disabling => {
                    warn!(
                        attempt,
                        account = %account.email,
                        status,
                        body = %excerpt,
                        "upstream rejected account, disabling"
                    );
                    self.pool.mark_exhausted(&account).await;
                    self.pool.persist().await;
                }
                ErrorClassification::Transient => {
                    warn!(
                        attempt,
                        account = %account.email,
                        status,
                        body = %excerpt,
                        "transient upstream failure"
                    );
                }
            }
        }

        warn!(attempts = max_attempts, "all attempts failed");
        Err(Error::AttemptsExhausted {
            attempts: max_attempts,
        })
    }
}
