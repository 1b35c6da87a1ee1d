//! Configuration loader and validator for the notifier and admin server.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::report::ReportSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub stats: Stats,
    pub server: Server,
    #[serde(default)]
    pub standalone: Option<Standalone>,
}

/// App-level settings shared by every binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Name shown in error notifications posted to rooms.
    pub instance_name: String,
    pub poll_interval_secs: u64,
    /// Pause between two users' API queries.
    pub user_delay_ms: u64,
    /// A digest listing this many problems or more collapses to "(omitted...)".
    pub max_listed: usize,
}

/// Statistics API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub base_url: String,
    pub profile_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub bind: String,
}

/// Settings for the database-free `shoujin_once` notifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Standalone {
    pub webhook_url: String,
    pub cache_dir: String,
    /// Chat handle -> AtCoder user id.
    pub users: BTreeMap<String, String>,
}

impl App {
    /// `data_dir` with a leading `~/` expanded to `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        expand_home(&self.data_dir)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Database URL: `DATABASE_URL` wins, otherwise a file under `data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/shoujin.db", self.app.resolved_data_dir()))
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            instance_name: self.app.instance_name.clone(),
            user_delay: Duration::from_millis(self.app.user_delay_ms),
            max_listed: self.app.max_listed,
        }
    }
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path.to_string(),
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Like [`load`], but writes [`example()`] to `path` first when no file exists.
/// Returns the config and whether it was just created.
pub fn load_or_init(path: &Path) -> Result<(Config, bool), ConfigError> {
    let created = !path.exists();
    if created {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, example())?;
    }
    Ok((load(Some(path))?, created))
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.instance_name.trim().is_empty() {
        return Err(ConfigError::Invalid("app.instance_name must be non-empty"));
    }
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }
    if cfg.app.max_listed == 0 {
        return Err(ConfigError::Invalid("app.max_listed must be > 0"));
    }

    if reqwest::Url::parse(&cfg.stats.base_url).is_err() {
        return Err(ConfigError::Invalid("stats.base_url must be a valid URL"));
    }
    if reqwest::Url::parse(&cfg.stats.profile_base_url).is_err() {
        return Err(ConfigError::Invalid("stats.profile_base_url must be a valid URL"));
    }

    if cfg.server.bind.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("server.bind must be an address like 0.0.0.0:8080"));
    }

    if let Some(standalone) = &cfg.standalone {
        if standalone.cache_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("standalone.cache_dir must be non-empty"));
        }
        if standalone
            .users
            .values()
            .any(|id| !crate::model::is_service_user_id(id))
        {
            return Err(ConfigError::Invalid(
                "standalone.users values must be alphanumeric AtCoder ids",
            ));
        }
    }

    Ok(())
}

/// Returns the reference YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  instance_name: "shoujin"
  poll_interval_secs: 300
  user_delay_ms: 10000
  max_listed: 20

stats:
  base_url: "https://kenkoooo.com/atcoder/"
  profile_base_url: "https://atcoder.jp/"

server:
  bind: "0.0.0.0:8080"

standalone:
  webhook_url: "https://hooks.slack.com/services/XXXXXXXXX/XXXXXXXXX/XXXXXXXXXXXXXXXXXXXXXXXX"
  cache_dir: "~/.cache/shoujin-notifier"
  users:
    kimiyuki: "kimiyuki"
    tourist: "tourist"
"#
}
