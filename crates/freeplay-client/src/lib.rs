//! Freeplay upstream client library
//!
//! Everything that talks to, or stores credentials for, the Freeplay web
//! application: the account store chain, the billing balance probe, the
//! model table, and the completion call. No dependency on the gateway
//! binary, so it can be tested on its own.
//!
//! Request flow:
//! 1. Accounts loaded via `accounts::ChainStore` (env JSON, JSON file, legacy text)
//! 2. Caller model name resolved via `models::lookup()`
//! 3. Completion sent via `completion::CompletionClient::send()`
//! 4. Remaining credits probed via `billing::BillingClient` (a `BalanceProber`)

pub mod accounts;
pub mod billing;
pub mod completion;
pub mod constants;
pub mod error;
pub mod models;

pub use accounts::{Account, AccountSource, AccountStore, AccountsDocument, ChainStore};
pub use billing::BillingClient;
pub use completion::{ChatMessage, CompletionClient, CompletionRequest};
pub use constants::*;
pub use error::{Error, Result};
pub use models::{DEFAULT_MODEL, InvalidModel, ModelConfig};
