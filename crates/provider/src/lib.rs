//! Provider abstraction for the upstream billing collaborator
//!
//! Defines the seams between the account pool and the upstream provider:
//! how an upstream failure is classified, how a session's remaining balance
//! is probed, and how provider health is reported. The pool depends only on
//! these types; the Freeplay client crate implements them.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Classification of a failed upstream completion attempt.
///
/// Drives the retry loop's pool action:
/// - Disabling zeroes the account's balance and persists it
/// - Transient leaves the account untouched (the loop simply tries again)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Unexpected status or network failure, account stays usable
    Transient,
    /// Auth rejected or project resource missing, account must not be used again
    Disabling,
}

impl ErrorClassification {
    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClassification::Transient => "transient",
            ErrorClassification::Disabling => "disabling",
        }
    }
}

/// Health status reported for the /health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,
    /// Provider-specific details (pool account counts and balances)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<serde_json::Value>,
}

/// Errors from provider collaborator calls (balance probes).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream returned status {status}")]
    Status { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid upstream payload: {0}")]
    Parse(String),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Queries the upstream billing endpoint for a session's remaining balance.
///
/// Stateless: every call is a fresh upstream request. Any error means the
/// balance could not be established; the pool treats that as disabling.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn BalanceProber>`).
pub trait BalanceProber: Send + Sync {
    /// Identifier for logging (e.g. "freeplay-billing")
    fn id(&self) -> &str;

    /// Return the remaining balance for the given session credential.
    fn probe<'a>(
        &'a self,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<f64>> + Send + 'a>>;
}
