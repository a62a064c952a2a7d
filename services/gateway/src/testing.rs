//! Shared fixtures for gateway tests

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::Secret;
use freeplay_client::{Account, AccountSource, ChainStore, CompletionClient};
use freeplay_pool::Pool;
use provider::{BalanceProber, ProviderError};
use tokio::net::TcpListener;

use crate::metrics;
use crate::state::{AppState, ServiceMetrics};
use crate::upstream::Upstream;

/// Prober answering from a session → balance map. Unknown sessions fail.
pub struct MapProber {
    balances: HashMap<String, f64>,
    calls: AtomicUsize,
}

impl MapProber {
    pub fn new(balances: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            balances: balances.iter().map(|(s, b)| (s.to_string(), *b)).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BalanceProber for MapProber {
    fn id(&self) -> &str {
        "map"
    }

    fn probe<'a>(
        &'a self,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<f64>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.balances
                .get(session_id)
                .copied()
                .ok_or_else(|| ProviderError::Auth(format!("{session_id} rejected")))
        })
    }
}

/// Account whose session is `sess-<name>` and project is `<name>`.
pub fn account(name: &str, balance: f64) -> Account {
    Account {
        email: format!("{name}@example.com"),
        password: Secret::default(),
        session_id: Secret::new(format!("sess-{name}")),
        project_id: name.to_string(),
        balance,
    }
}

/// Pool persisting to a legacy text file inside `dir`.
pub fn test_pool(dir: &tempfile::TempDir, accounts: Vec<Account>, prober: Arc<MapProber>) -> Arc<Pool> {
    let store = Arc::new(ChainStore::new(vec![AccountSource::LegacyText {
        path: dir.path().join("accounts.txt"),
    }]));
    Arc::new(Pool::new(accounts, store, prober))
}

/// Serve a router on an ephemeral local port and return its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Handler state over `pool`, sending completions to `base_url`.
pub fn app_state(pool: Arc<Pool>, base_url: &str) -> AppState {
    let client = CompletionClient::with_base_url(reqwest::Client::new(), base_url);
    AppState {
        upstream: Upstream::new(pool.clone(), client),
        pool,
        store: Arc::new(ChainStore::new(Vec::new())),
        port: 8000,
        default_balance: 5.0,
        metrics: ServiceMetrics::new(),
        prometheus: metrics::build_recorder().handle(),
    }
}
