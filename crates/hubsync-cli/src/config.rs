//! 設定の読み込み
//!
//! 優先順位（後勝ち）:
//! 1. 組み込みデフォルト
//! 2. `./hubsync.toml`（`--config <path>` 指定時はそのファイル、必須）
//! 3. 環境変数 `HUBSYNC_*`（ネストは `__`、例: `HUBSYNC_GITHUB__TOKEN`）

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use hubsync_core::domain::{DefaultDecider, RetryPolicy};
use hubsync_core::github::DEFAULT_BASE_URL;
use serde::Deserialize;
use thiserror::Error;

const LOCAL_CONFIG: &str = "hubsync.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no GitHub credential configured: set github.token or github.app_id + github.installation_id + github.private_key_path")]
    NoCredential,

    #[error("both github.token and GitHub App credentials are set; configure exactly one")]
    AmbiguousCredential,

    #[error("incomplete GitHub App credentials, missing: {0:?}")]
    IncompleteApp(Vec<&'static str>),

    #[error("invalid retry settings: {0}")]
    Retry(String),
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base_url: String,

    /// Personal access / installation token used as-is.
    pub token: Option<String>,

    pub app_id: Option<u64>,
    pub installation_id: Option<u64>,
    pub private_key_path: Option<PathBuf>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            app_id: None,
            installation_id: None,
            private_key_path: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts_per_step: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_rate_limit_waits: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_step: 5,
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
            max_rate_limit_waits: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".hubsync"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,hubsync_core=info".to_string(),
            json: false,
        }
    }
}

/// Which credential the token provider should be built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    App {
        app_id: u64,
        installation_id: u64,
        private_key_path: PathBuf,
    },
}

impl Config {
    /// Layered load. Credentials are not checked here; call
    /// [`Config::credential`] where one is needed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(
                    File::from(path.to_path_buf())
                        .format(FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                builder = builder.add_source(
                    File::from(PathBuf::from(LOCAL_CONFIG))
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("HUBSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate_retry()?;
        Ok(config)
    }

    fn validate_retry(&self) -> Result<(), ConfigError> {
        let r = &self.retry;
        if r.max_attempts_per_step == 0 {
            return Err(ConfigError::Retry(
                "max_attempts_per_step must be at least 1".into(),
            ));
        }
        if !r.multiplier.is_finite() || r.multiplier < 1.0 {
            return Err(ConfigError::Retry(format!(
                "multiplier must be >= 1.0, got {}",
                r.multiplier
            )));
        }
        if r.base_delay_ms > r.max_delay_ms {
            return Err(ConfigError::Retry(
                "base_delay_ms must not exceed max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Exactly one of `token` or the full App trio must be configured.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        let g = &self.github;
        let token = g.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let any_app =
            g.app_id.is_some() || g.installation_id.is_some() || g.private_key_path.is_some();

        match (token, any_app) {
            (Some(_), true) => Err(ConfigError::AmbiguousCredential),
            (Some(token), false) => Ok(Credential::Token(token.to_string())),
            (None, false) => Err(ConfigError::NoCredential),
            (None, true) => match (g.app_id, g.installation_id, g.private_key_path.clone()) {
                (Some(app_id), Some(installation_id), Some(private_key_path)) => {
                    Ok(Credential::App {
                        app_id,
                        installation_id,
                        private_key_path,
                    })
                }
                _ => {
                    let mut missing = Vec::new();
                    if g.app_id.is_none() {
                        missing.push("app_id");
                    }
                    if g.installation_id.is_none() {
                        missing.push("installation_id");
                    }
                    if g.private_key_path.is_none() {
                        missing.push("private_key_path");
                    }
                    Err(ConfigError::IncompleteApp(missing))
                }
            },
        }
    }

    pub fn decider(&self) -> DefaultDecider {
        let r = &self.retry;
        DefaultDecider::new(
            RetryPolicy::new(
                Duration::from_millis(r.base_delay_ms),
                r.multiplier,
                Duration::from_millis(r.max_delay_ms),
            ),
            r.max_attempts_per_step,
            r.max_rate_limit_waits,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config: Config = ConfigBuilder::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap_or_default();
        assert_eq!(config.github.api_base_url, "https://api.github.com");
        assert_eq!(config.retry.max_attempts_per_step, 5);
        assert_eq!(config.retry.max_rate_limit_waits, 50);
        assert_eq!(config.storage.state_dir, PathBuf::from(".hubsync"));
        assert!(!config.logging.json);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = from_toml(
            r#"
            [retry]
            base_delay_ms = 500

            [logging]
            json = true
            "#,
        );
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.multiplier, 2.0);
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "info,hubsync_core=info");
    }

    #[test]
    fn token_credential() {
        let config = from_toml(
            r#"
            [github]
            token = "ghp_test123"
            "#,
        );
        assert_eq!(
            config.credential().unwrap(),
            Credential::Token("ghp_test123".into())
        );
    }

    #[test]
    fn app_credential() {
        let config = from_toml(
            r#"
            [github]
            app_id = 12
            installation_id = 34
            private_key_path = "/etc/hubsync/key.pem"
            "#,
        );
        assert_eq!(
            config.credential().unwrap(),
            Credential::App {
                app_id: 12,
                installation_id: 34,
                private_key_path: PathBuf::from("/etc/hubsync/key.pem"),
            }
        );
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let config = from_toml(
            r#"
            [github]
            token = "   "
            "#,
        );
        assert!(matches!(config.credential(), Err(ConfigError::NoCredential)));
    }

    #[test]
    fn both_credentials_rejected() {
        let config = from_toml(
            r#"
            [github]
            token = "ghp_test123"
            app_id = 12
            "#,
        );
        assert!(matches!(
            config.credential(),
            Err(ConfigError::AmbiguousCredential)
        ));
    }

    #[test]
    fn incomplete_app_lists_missing_keys() {
        let config = from_toml(
            r#"
            [github]
            app_id = 12
            "#,
        );
        assert!(matches!(
            config.credential(),
            Err(ConfigError::IncompleteApp(missing)) if missing == vec!["installation_id", "private_key_path"]
        ));
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = Config::default();
        config.retry.max_attempts_per_step = 0;
        assert!(matches!(config.validate_retry(), Err(ConfigError::Retry(_))));
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[storage]\nstate_dir = \"/var/lib/hubsync\"\n[retry]\nmax_rate_limit_waits = 3\n",
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.state_dir, PathBuf::from("/var/lib/hubsync"));
        assert_eq!(config.retry.max_rate_limit_waits, 3);
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Load(_))));
    }
}
