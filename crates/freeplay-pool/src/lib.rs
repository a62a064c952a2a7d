//! Account pool for Freeplay sessions
//!
//! Holds the ordered account list and the rotation cursor, decides which
//! account serves the next request, and keeps balances in sync with the
//! billing endpoint. Balance is the only disable signal: an account at
//! exactly zero is disabled, one above `EPSILON` is usable.
//!
//! Account lifecycle:
//! 1. Accounts loaded from the store (`Pool::load`) in file order
//! 2. `get_current_account` keeps serving the cursor account while its balance clears `EPSILON`
//! 3. Once it drops, the cursor scans forward, probing each candidate's real balance
//! 4. Upstream rejects an account (401/404/"Path Not Found") → `mark_exhausted` zeroes it
//! 5. A turn ends with a cost record → `refresh_balance` re-probes the account used
//! 6. Admin `reset_disabled` brings zeroed accounts back at a default balance

pub mod classify;
pub mod error;
pub mod pool;
pub mod refresh;

pub use classify::classify_status;
pub use error::{Error, Result};
pub use pool::{EPSILON, Pool, PoolStats, RefreshSummary};
pub use refresh::spawn_refresh_task;
