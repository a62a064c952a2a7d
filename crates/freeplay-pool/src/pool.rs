//! Pool state and cursor-based account selection
//!
//! The pool owns the ordered account list and a single rotation cursor. The
//! account at the cursor keeps serving requests while its balance clears
//! `EPSILON`; only when it drops does the cursor move forward, probing each
//! candidate's real balance before handing it out.
//!
//! All cursor movement and balance mutation happens under one `Mutex`, and
//! the lock is held across the probes of a selection scan, so at most one
//! selection decision is in flight at a time.

use std::sync::Arc;

use freeplay_client::{Account, AccountStore};
use provider::{BalanceProber, ProviderHealth};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Balance at or below which an account is not worth a request attempt.
pub const EPSILON: f64 = 0.01;

/// Aggregate account counts for the status and health endpoints.
///
/// `disabled` counts balances of exactly zero; `low_balance` counts the dust
/// range above zero up to and including `EPSILON`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub disabled: usize,
    pub low_balance: usize,
    pub total_balance: f64,
}

impl PoolStats {
    fn from_accounts(accounts: &[Account]) -> Self {
        let mut stats = PoolStats {
            total: accounts.len(),
            ..Default::default()
        };
        for a in accounts {
            if a.balance > EPSILON {
                stats.available += 1;
            }
            if a.balance == 0.0 {
                stats.disabled += 1;
            }
            if a.balance > 0.0 && a.balance <= EPSILON {
                stats.low_balance += 1;
            }
            stats.total_balance += a.balance;
        }
        stats
    }
}

/// Outcome of a refresh-all pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub updated: usize,
    pub failed: usize,
}

struct PoolState {
    accounts: Vec<Account>,
    cursor: usize,
}

/// Shared account pool.
///
/// The store is the durable copy; the pool's in-memory list is authoritative
/// while the process runs and is flushed back with `persist`.
pub struct Pool {
    state: Mutex<PoolState>,
    store: Arc<dyn AccountStore>,
    prober: Arc<dyn BalanceProber>,
}

impl Pool {
    /// Create a pool over an already-loaded account list. Cursor starts at 0.
    pub fn new(
        accounts: Vec<Account>,
        store: Arc<dyn AccountStore>,
        prober: Arc<dyn BalanceProber>,
    ) -> Self {
        info!(accounts = accounts.len(), prober = prober.id(), "pool initialized");
        record_available(&accounts);
        Self {
            state: Mutex::new(PoolState {
                accounts,
                cursor: 0,
            }),
            store,
            prober,
        }
    }

    /// Load accounts from the store and build a pool over them.
    pub async fn load(
        store: Arc<dyn AccountStore>,
        prober: Arc<dyn BalanceProber>,
    ) -> Result<Self> {
        let accounts = store.load().await?;
        Ok(Self::new(accounts, store, prober))
    }

    /// Return the account that should serve the next request.
    ///
    /// The cursor account is returned as-is, without a probe, while its
    /// balance is above `EPSILON`. Otherwise the cursor advances (wrapping)
    /// up to `len` times; each candidate above `EPSILON` is re-probed and the
    /// first whose fresh balance still clears it becomes current. Returns
    /// `None` when the pool is empty or the scan finds nothing.
    pub async fn get_current_account(&self) -> Option<Account> {
        let mut state = self.state.lock().await;
        let n = state.accounts.len();
        if n == 0 {
            return None;
        }

        let current = &state.accounts[state.cursor];
        if current.balance > EPSILON {
            return Some(current.clone());
        }
        debug!(
            account = %current.email,
            index = state.cursor,
            balance = current.balance,
            "current account below threshold, scanning"
        );

        for _ in 0..n {
            state.cursor = (state.cursor + 1) % n;
            let idx = state.cursor;
            let candidate = state.accounts[idx].clone();
            if candidate.balance <= EPSILON {
                debug!(account = %candidate.email, index = idx, "skipping low balance account");
                continue;
            }

            // Stored balances are stale once rotation starts; trust only a fresh probe
            let balance = self.probe(&candidate).await.unwrap_or(0.0);
            state.accounts[idx].balance = balance;
            if balance > EPSILON {
                info!(account = %candidate.email, index = idx, balance, "switched to account");
                record_available(&state.accounts);
                return Some(state.accounts[idx].clone());
            }
            debug!(account = %candidate.email, balance, "refreshed balance below threshold");
        }

        warn!(accounts = n, "no usable account in pool");
        record_available(&state.accounts);
        None
    }

    /// Unconditionally move the cursor to the next account, wrapping.
    pub async fn advance(&self) {
        let mut state = self.state.lock().await;
        let n = state.accounts.len();
        if n > 0 {
            state.cursor = (state.cursor + 1) % n;
            debug!(index = state.cursor, "cursor advanced");
        }
    }

    /// Zero the balance of the account with the same identity.
    ///
    /// Returns false when no such account is in the pool (e.g. after a reload).
    pub async fn mark_exhausted(&self, account: &Account) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.accounts.iter_mut().find(|a| a.same_identity(account)) else {
            warn!(account = %account.email, "cannot disable account no longer in pool");
            return false;
        };
        let old = entry.balance;
        entry.balance = 0.0;
        warn!(account = %entry.email, old_balance = old, "account disabled");
        metrics::counter!("pool_accounts_disabled_total", "reason" => "upstream_rejected")
            .increment(1);
        record_available(&state.accounts);
        true
    }

    /// Re-probe one account's balance.
    ///
    /// On success the fresh figure is stored; on any probe failure the
    /// balance is set to zero. The probe runs outside the pool lock.
    pub async fn refresh_balance(&self, account: &Account) -> bool {
        let probed = self.probe(account).await;
        let mut state = self.state.lock().await;
        if let Some(entry) = state.accounts.iter_mut().find(|a| a.same_identity(account)) {
            entry.balance = probed.unwrap_or(0.0);
        }
        record_available(&state.accounts);
        probed.is_some()
    }

    /// Flush the current account list to the store.
    ///
    /// Failures are logged and swallowed; in-memory balances stay correct.
    pub async fn persist(&self) {
        let snapshot = self.accounts().await;
        if let Err(e) = self.store.save(&snapshot).await {
            warn!(error = %e, "failed to persist accounts");
        }
    }

    /// Replace the account list with a fresh load from the store.
    ///
    /// The cursor is kept when still in range, otherwise reset to 0.
    pub async fn reload(&self) -> Result<usize> {
        let accounts = self.store.load().await?;
        let mut state = self.state.lock().await;
        state.accounts = accounts;
        if state.cursor >= state.accounts.len() {
            state.cursor = 0;
        }
        info!(accounts = state.accounts.len(), "accounts reloaded");
        record_available(&state.accounts);
        Ok(state.accounts.len())
    }

    /// Probe every account, then persist.
    pub async fn refresh_all(&self) -> RefreshSummary {
        let snapshot = self.accounts().await;
        let mut summary = RefreshSummary::default();
        for account in &snapshot {
            if self.refresh_balance(account).await {
                summary.updated += 1;
            } else {
                summary.failed += 1;
            }
        }
        self.persist().await;
        info!(updated = summary.updated, failed = summary.failed, "refreshed all balances");
        summary
    }

    /// Set every zero-balance account to `default_balance`, then persist.
    pub async fn reset_disabled(&self, default_balance: f64) -> usize {
        let reset = {
            let mut state = self.state.lock().await;
            let mut reset = 0usize;
            for a in state.accounts.iter_mut().filter(|a| a.balance == 0.0) {
                a.balance = default_balance;
                reset += 1;
                info!(account = %a.email, balance = default_balance, "reset disabled account");
            }
            record_available(&state.accounts);
            reset
        };
        self.persist().await;
        reset
    }

    pub async fn stats(&self) -> PoolStats {
        PoolStats::from_accounts(&self.state.lock().await.accounts)
    }

    /// Consistent snapshot of all accounts in pool order.
    pub async fn accounts(&self) -> Vec<Account> {
        self.state.lock().await.accounts.clone()
    }

    /// Current in-memory balance of the account with the same identity.
    pub async fn balance_of(&self, account: &Account) -> Option<f64> {
        self.state
            .lock()
            .await
            .accounts
            .iter()
            .find(|a| a.same_identity(account))
            .map(|a| a.balance)
    }

    /// Index of the current account.
    pub async fn cursor(&self) -> usize {
        self.state.lock().await.cursor
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.accounts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Pool health for the health endpoint.
    ///
    /// Every account available → healthy, some → degraded, none → unhealthy.
    pub async fn health(&self) -> ProviderHealth {
        let stats = self.stats().await;
        let status = if stats.total > 0 && stats.available == stats.total {
            "healthy"
        } else if stats.available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };
        ProviderHealth {
            status: status.into(),
            pool: serde_json::to_value(&stats).ok(),
        }
    }

    /// Probe an account's balance. Failures are logged and counted.
    async fn probe(&self, account: &Account) -> Option<f64> {
        match self.prober.probe(account.session_id.expose()).await {
            Ok(balance) => {
                let balance = balance.max(0.0);
                info!(
                    account = %account.email,
                    old_balance = account.balance,
                    new_balance = balance,
                    "balance refreshed"
                );
                Some(balance)
            }
            Err(e) => {
                warn!(account = %account.email, error = %e, "balance probe failed, disabling account");
                metrics::counter!("pool_accounts_disabled_total", "reason" => "probe_failed")
                    .increment(1);
                None
            }
        }
    }
}

fn record_available(accounts: &[Account]) {
    let available = accounts.iter().filter(|a| a.balance > EPSILON).count();
    metrics::gauge!("pool_accounts_available").set(available as f64);
}
