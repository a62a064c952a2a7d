//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Account credentials are never stored in the TOML; the `[accounts]`
//! section only names where the account store looks for them.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use freeplay_client::AccountSource;
use serde::Deserialize;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "freeplay-gateway.toml";

/// Root configuration
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// HTTP server and upstream settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Where accounts are loaded from, in priority order
#[derive(Debug, Deserialize)]
pub struct AccountsConfig {
    #[serde(default = "default_env_var")]
    pub env_var: String,
    #[serde(default = "default_json_files")]
    pub json_files: Vec<PathBuf>,
    #[serde(default = "default_txt_file")]
    pub txt_file: PathBuf,
    /// Balance assigned by reset-disabled when the request omits one
    #[serde(default = "default_balance")]
    pub default_balance: f64,
}

/// Periodic balance refresh; 0 disables the task
#[derive(Debug, Deserialize, Default)]
pub struct RefreshConfig {
    #[serde(default)]
    pub interval_secs: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_upstream_url() -> String {
    freeplay_client::FREEPLAY_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

fn default_env_var() -> String {
    "ACCOUNTS_JSON".to_string()
}

fn default_json_files() -> Vec<PathBuf> {
    vec![PathBuf::from("accounts.json"), PathBuf::from("config.json")]
}

fn default_txt_file() -> PathBuf {
    PathBuf::from("accounts.txt")
}

fn default_balance() -> f64 {
    5.0
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream_url: default_upstream_url(),
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            env_var: default_env_var(),
            json_files: default_json_files(),
            txt_file: default_txt_file(),
            default_balance: default_balance(),
        }
    }
}

impl AccountsConfig {
    /// The account source chain: env blob, then each JSON file, then the text file.
    pub fn sources(&self) -> Vec<AccountSource> {
        let mut sources = vec![AccountSource::Env {
            var: self.env_var.clone(),
        }];
        sources.extend(
            self.json_files
                .iter()
                .map(|path| AccountSource::JsonFile { path: path.clone() }),
        );
        sources.push(AccountSource::LegacyText {
            path: self.txt_file.clone(),
        });
        sources
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file at the default path yields the built-in defaults; a
    /// missing file the operator named explicitly is an error.
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<Config>(&contents)?,
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    && path == Path::new(DEFAULT_CONFIG_PATH) =>
            {
                Config::default()
            }
            Err(e) => return Err(e.into()),
        };

        config.validate()?;

        // PORT overrides only the port, the bind address stays
        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| common::Error::Config(format!("PORT must be a port number, got: {port}")))?;
            config.server.listen_addr.set_port(port);
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        // Validate upstream_url is a valid URL with http(s) scheme
        if !self.server.upstream_url.starts_with("http://")
            && !self.server.upstream_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "upstream_url must start with http:// or https://, got: {}",
                self.server.upstream_url
            )));
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if !(self.accounts.default_balance >= 0.0) {
            return Err(common::Error::Config(
                "default_balance must be a non-negative number".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("PORT") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "127.0.0.1:9000"
upstream_url = "http://localhost:4000"
timeout_secs = 30
max_connections = 50

[accounts]
env_var = "MY_ACCOUNTS"
json_files = ["a.json"]
txt_file = "b.txt"
default_balance = 2.5

[refresh]
interval_secs = 300
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.server.upstream_url, "http://localhost:4000");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.server.max_connections, 50);
        assert_eq!(config.accounts.default_balance, 2.5);
        assert_eq!(config.refresh.interval_secs, 300);
        assert_eq!(
            config.accounts.sources(),
            vec![
                AccountSource::Env {
                    var: "MY_ACCOUNTS".into()
                },
                AccountSource::JsonFile {
                    path: PathBuf::from("a.json")
                },
                AccountSource::LegacyText {
                    path: PathBuf::from("b.txt")
                },
            ]
        );
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("PORT") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert_eq!(config.server.upstream_url, "https://app.freeplay.ai");
        assert_eq!(config.server.timeout_secs, 60);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.accounts.env_var, "ACCOUNTS_JSON");
        assert_eq!(config.accounts.sources().len(), 4);
        assert_eq!(config.refresh.interval_secs, 0);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_rejects_non_http_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[server]\nupstream_url = \"ftp://example.com\"\n");
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("upstream_url"), "{err}");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[server]\ntimeout_secs = 0\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_rejects_zero_max_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[server]\nmax_connections = 0\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_rejects_negative_default_balance() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[accounts]\ndefault_balance = -1.0\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_port_env_overrides_listen_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[server]\nlisten_addr = \"127.0.0.1:9000\"\n");

        unsafe { set_env("PORT", "8123") };
        let config = Config::load(&path);
        unsafe { remove_env("PORT") };

        let config = config.unwrap();
        assert_eq!(config.server.listen_addr.port(), 8123);
        assert!(config.server.listen_addr.ip().is_loopback());
    }

    #[test]
    fn test_invalid_port_env_is_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "");

        unsafe { set_env("PORT", "eighty") };
        let result = Config::load(&path);
        unsafe { remove_env("PORT") };

        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
