//! Account model and persistence
//!
//! Accounts are loaded through an ordered chain of sources (environment JSON
//! blob, JSON files, legacy `----`-delimited text file). The first source that
//! yields a valid account list wins. Saving writes back to whichever source
//! was loaded; file writes use atomic temp-file + rename with 0600 permissions
//! since the files contain session credentials.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Field separator of the legacy text format
pub const LEGACY_SEPARATOR: &str = "----";

/// A credentialed upstream account.
///
/// `balance == 0.0` is the only disabled marker; there is no separate status
/// flag. Identity is the session credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub password: Secret<String>,
    pub session_id: Secret<String>,
    pub project_id: String,
    #[serde(default)]
    pub balance: f64,
}

impl Account {
    /// Whether two records refer to the same upstream account.
    pub fn same_identity(&self, other: &Account) -> bool {
        self.session_id == other.session_id
    }

    fn is_complete(&self) -> bool {
        !self.email.is_empty()
            && !self.session_id.expose().is_empty()
            && !self.project_id.is_empty()
    }
}

/// JSON account document (environment blob or file).
///
/// `port` and `default_balance` are carried through so a save does not drop them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsDocument {
    pub accounts: Vec<Account>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_balance: Option<f64>,
}

impl AccountsDocument {
    /// Parse and validate a JSON document.
    ///
    /// Every account must carry a non-empty email, session id and project id;
    /// one incomplete entry rejects the whole document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: AccountsDocument = serde_json::from_str(raw)
            .map_err(|e| Error::AccountParse(format!("parsing account document: {e}")))?;
        if let Some(bad) = doc.accounts.iter().find(|a| !a.is_complete()) {
            return Err(Error::AccountParse(format!(
                "account {:?} is missing email, session_id or project_id",
                bad.email
            )));
        }
        Ok(doc)
    }
}

/// One strategy in the account loading chain.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountSource {
    /// JSON document held in an environment variable
    Env { var: String },
    /// JSON document on disk
    JsonFile { path: PathBuf },
    /// `email----password----session_id----project_id----balance` lines
    LegacyText { path: PathBuf },
}

impl AccountSource {
    /// Short label for logs and the status endpoint.
    pub fn label(&self) -> String {
        match self {
            AccountSource::Env { var } => format!("env:{var}"),
            AccountSource::JsonFile { path } => format!("json:{}", path.display()),
            AccountSource::LegacyText { path } => format!("txt:{}", path.display()),
        }
    }

    /// Attempt to load accounts from this source.
    pub async fn load(&self) -> Result<AccountsDocument> {
        match self {
            AccountSource::Env { var } => {
                let raw = std::env::var(var)
                    .map_err(|_| Error::NotFound(format!("environment variable {var} not set")))?;
                AccountsDocument::from_json(&raw)
            }
            AccountSource::JsonFile { path } => {
                let raw = read_file(path).await?;
                AccountsDocument::from_json(&raw)
            }
            AccountSource::LegacyText { path } => {
                let raw = read_file(path).await?;
                let accounts = parse_legacy(&raw);
                if accounts.is_empty() {
                    return Err(Error::AccountParse(format!(
                        "{} contains no valid account lines",
                        path.display()
                    )));
                }
                Ok(AccountsDocument {
                    accounts,
                    ..Default::default()
                })
            }
        }
    }

    async fn save(&self, doc: &AccountsDocument) -> Result<()> {
        match self {
            AccountSource::Env { var } => {
                info!(var, "accounts loaded from environment, skipping save");
                Ok(())
            }
            AccountSource::JsonFile { path } => {
                let json = serde_json::to_string_pretty(doc)
                    .map_err(|e| Error::AccountParse(format!("serializing accounts: {e}")))?;
                write_atomic(path, json.as_bytes()).await
            }
            AccountSource::LegacyText { path } => {
                write_atomic(path, format_legacy(&doc.accounts).as_bytes()).await
            }
        }
    }
}

/// Persistence collaborator consumed by the pool.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn AccountStore>`).
pub trait AccountStore: Send + Sync {
    /// Load the ordered account list.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Account>>> + Send + '_>>;

    /// Overwrite the stored account list.
    fn save<'a>(
        &'a self,
        accounts: &'a [Account],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// What the chain store remembers about the last successful load.
#[derive(Debug, Default)]
struct Loaded {
    source: Option<AccountSource>,
    port: Option<u16>,
    default_balance: Option<f64>,
}

/// Account store trying each source in order, first success wins.
///
/// The Mutex serializes saves and records which source the accounts came
/// from so they are written back in the same format.
pub struct ChainStore {
    sources: Vec<AccountSource>,
    loaded: Mutex<Loaded>,
}

impl ChainStore {
    pub fn new(sources: Vec<AccountSource>) -> Self {
        Self {
            sources,
            loaded: Mutex::new(Loaded::default()),
        }
    }

    /// The source the current accounts were loaded from, if any.
    pub async fn active_source(&self) -> Option<AccountSource> {
        self.loaded.lock().await.source.clone()
    }

    /// Port carried by the loaded JSON document, if any.
    pub async fn document_port(&self) -> Option<u16> {
        self.loaded.lock().await.port
    }

    /// Default balance carried by the loaded JSON document, if any.
    pub async fn document_default_balance(&self) -> Option<f64> {
        self.loaded.lock().await.default_balance
    }

    async fn load_chain(&self) -> Result<Vec<Account>> {
        let mut loaded = self.loaded.lock().await;
        for source in &self.sources {
            match source.load().await {
                Ok(doc) => {
                    info!(
                        source = %source.label(),
                        accounts = doc.accounts.len(),
                        "loaded accounts"
                    );
                    *loaded = Loaded {
                        source: Some(source.clone()),
                        port: doc.port,
                        default_balance: doc.default_balance,
                    };
                    return Ok(doc.accounts);
                }
                Err(Error::NotFound(msg)) => {
                    debug!(source = %source.label(), reason = %msg, "account source not present");
                }
                Err(e) => {
                    warn!(source = %source.label(), error = %e, "account source rejected");
                }
            }
        }
        warn!("no valid account source found, starting with empty pool");
        *loaded = Loaded::default();
        Ok(Vec::new())
    }

    async fn save_chain(&self, accounts: &[Account]) -> Result<()> {
        let loaded = self.loaded.lock().await;
        let target = match &loaded.source {
            Some(source) => source.clone(),
            None => self
                .sources
                .iter()
                .find(|s| matches!(s, AccountSource::LegacyText { .. }))
                .cloned()
                .ok_or_else(|| Error::Io("no writable account source configured".into()))?,
        };
        let doc = AccountsDocument {
            accounts: accounts.to_vec(),
            port: loaded.port,
            default_balance: loaded.default_balance,
        };
        target.save(&doc).await?;
        debug!(target = %target.label(), accounts = accounts.len(), "persisted accounts");
        Ok(())
    }
}

impl AccountStore for ChainStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Account>>> + Send + '_>> {
        Box::pin(self.load_chain())
    }

    fn save<'a>(
        &'a self,
        accounts: &'a [Account],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.save_chain(accounts))
    }
}

/// Parse legacy text lines, skipping malformed ones.
pub fn parse_legacy(raw: &str) -> Vec<Account> {
    let mut accounts = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(LEGACY_SEPARATOR).collect();
        if parts.len() < 5 {
            warn!(line = idx + 1, "malformed account line, skipping");
            continue;
        }
        accounts.push(Account {
            email: parts[0].to_string(),
            password: Secret::new(parts[1].to_string()),
            session_id: Secret::new(parts[2].to_string()),
            project_id: parts[3].to_string(),
            balance: parts[4].trim().parse().unwrap_or(0.0),
        });
    }
    accounts
}

/// Render accounts in the legacy text format, balance at four decimals.
pub fn format_legacy(accounts: &[Account]) -> String {
    let mut out = String::new();
    for a in accounts {
        out.push_str(&format!(
            "{email}{sep}{password}{sep}{session}{sep}{project}{sep}{balance:.4}\n",
            email = a.email,
            password = a.password.expose(),
            session = a.session_id.expose(),
            project = a.project_id,
            balance = a.balance,
            sep = LEGACY_SEPARATOR,
        ));
    }
    out
}

async fn read_file(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(format!("{} does not exist", path.display())))
        }
        Err(e) => Err(Error::Io(format!("reading {}: {e}", path.display()))),
    }
}

/// Write a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets permissions to 0600 since the file holds session cookies.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "accounts".into());
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(|e| Error::Io(format!("writing temp account file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting account file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp account file: {e}")))?;

    debug!(path = %path.display(), "wrote account file");
    Ok(())
}
