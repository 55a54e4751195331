//! Configuration system (layered: defaults < config.toml < env).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::auth::{
    CredentialStoreConfig, DeviceAuthClient, FileCredentialStore, RateGuard, RatePolicy,
    DEFAULT_SLOW_DOWN_STEP,
};
use crate::auth::client::{DEFAULT_AUTH_URL, DEFAULT_CLIENT_ID};
use crate::error::{Result, WorkdeskError};

pub const ENV_TOKEN: &str = "WORKDESK_TOKEN";
pub const ENV_CONFIG_DIR: &str = "WORKDESK_CONFIG_DIR";
pub const ENV_AUTH_URL: &str = "WORKDESK_AUTH_URL";
pub const ENV_CLIENT_ID: &str = "WORKDESK_CLIENT_ID";

const APP_DIR_NAME: &str = "workdesk";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Optional `config.toml` contents. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    auth_url: Option<String>,
    client_id: Option<String>,
    scope: Option<String>,
    slow_down_step_secs: Option<u64>,
    rate_guard: Option<RatePolicy>,
}

/// Resolved process configuration.
///
/// Resolution order, later layers winning:
/// 1. Built-in defaults
/// 2. `<config_dir>/config.toml`
/// 3. `WORKDESK_*` environment variables (a `.env` file is loaded first)
#[derive(Clone)]
pub struct WorkdeskConfig {
    pub config_dir: PathBuf,
    pub auth_url: String,
    pub client_id: String,
    pub scope: Option<String>,
    pub slow_down_step: Duration,
    pub rate_policy: RatePolicy,
    token_override: Option<String>,
}

impl fmt::Debug for WorkdeskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkdeskConfig")
            .field("config_dir", &self.config_dir)
            .field("auth_url", &self.auth_url)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("slow_down_step", &self.slow_down_step)
            .field("rate_policy", &self.rate_policy)
            .field("token_override", &self.token_override.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl WorkdeskConfig {
    /// Defaults rooted at `config_dir`, ignoring files and environment.
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: None,
            slow_down_step: DEFAULT_SLOW_DOWN_STEP,
            rate_policy: RatePolicy::default(),
            token_override: None,
        }
    }

    /// Load from `.env`, the process environment and `config.toml`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration using `lookup` in place of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config_dir = match env(ENV_CONFIG_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => default_config_dir().ok_or_else(|| {
                WorkdeskError::Configuration(format!(
                    "could not determine a configuration directory; set {ENV_CONFIG_DIR}"
                ))
            })?,
        };

        let mut config = Self::with_dir(config_dir);
        config.apply_file()?;

        if let Some(url) = env(ENV_AUTH_URL) {
            config.auth_url = url;
        }
        if let Some(client_id) = env(ENV_CLIENT_ID) {
            config.client_id = client_id;
        }
        config.token_override = env(ENV_TOKEN);

        debug!(
            config_dir = %config.config_dir.display(),
            auth_url = %config.auth_url,
            token_override = config.token_override.is_some(),
            "configuration resolved"
        );
        Ok(config)
    }

    fn apply_file(&mut self) -> Result<()> {
        let path = self.config_file_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let file: FileConfig = toml::from_str(&raw).map_err(|err| {
            WorkdeskError::Configuration(format!("{}: {err}", path.display()))
        })?;

        if let Some(url) = file.auth_url {
            self.auth_url = url;
        }
        if let Some(client_id) = file.client_id {
            self.client_id = client_id;
        }
        if file.scope.is_some() {
            self.scope = file.scope;
        }
        if let Some(secs) = file.slow_down_step_secs {
            if secs == 0 {
                return Err(WorkdeskError::Configuration(
                    "slow_down_step_secs must be at least 1".to_string(),
                ));
            }
            self.slow_down_step = Duration::from_secs(secs);
        }
        if let Some(policy) = file.rate_guard {
            if policy.max_attempts == 0 {
                return Err(WorkdeskError::Configuration(
                    "rate_guard.max_attempts must be at least 1".to_string(),
                ));
            }
            self.rate_policy = policy;
        }
        Ok(())
    }

    /// Set the credential override directly.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        self.token_override = token.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn has_token_override(&self) -> bool {
        self.token_override.is_some()
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn credentials_path(&self) -> PathBuf {
        CredentialStoreConfig::in_dir(&self.config_dir).path
    }

    pub fn device_client(&self) -> DeviceAuthClient {
        DeviceAuthClient::new(self.client_id.clone())
            .with_base_url(&self.auth_url)
            .with_scope(self.scope.clone())
    }

    pub fn credential_store(&self) -> FileCredentialStore {
        FileCredentialStore::new(CredentialStoreConfig::in_dir(&self.config_dir))
            .with_override(self.token_override.clone())
    }

    pub fn rate_guard(&self) -> RateGuard {
        RateGuard::new(self.rate_policy)
    }
}

/// `<platform config dir>/workdesk`, e.g. `~/.config/workdesk` on Linux.
pub fn default_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialSource, CredentialStore};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let config = WorkdeskConfig::from_lookup(lookup(&[(ENV_CONFIG_DIR, dir_str)])).unwrap();

        assert_eq!(config.config_dir, dir.path());
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.slow_down_step, DEFAULT_SLOW_DOWN_STEP);
        assert_eq!(config.rate_policy, RatePolicy::default());
        assert!(!config.has_token_override());
        assert_eq!(config.credentials_path(), dir.path().join("credentials.json"));
    }

    #[test]
    fn file_values_apply_and_env_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
auth_url = "https://file.example"
client_id = "from-file"
scope = "projects"
slow_down_step_secs = 7

[rate_guard]
max_attempts = 3
lockout_secs = 60
"#,
        )
        .unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let config = WorkdeskConfig::from_lookup(lookup(&[
            (ENV_CONFIG_DIR, dir_str),
            (ENV_CLIENT_ID, "from-env"),
        ]))
        .unwrap();

        assert_eq!(config.auth_url, "https://file.example");
        assert_eq!(config.client_id, "from-env");
        assert_eq!(config.scope.as_deref(), Some("projects"));
        assert_eq!(config.slow_down_step, Duration::from_secs(7));
        assert_eq!(config.rate_policy.max_attempts, 3);
        assert_eq!(config.rate_policy.lockout, Duration::from_secs(60));
        assert_eq!(config.rate_policy.window, RatePolicy::default().window);
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "auth_url = [").unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let err = WorkdeskConfig::from_lookup(lookup(&[(ENV_CONFIG_DIR, dir_str)])).unwrap_err();
        assert!(matches!(err, WorkdeskError::Configuration(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "auth_uri = \"typo\"").unwrap();
        let dir_str = dir.path().to_str().unwrap();
        assert!(WorkdeskConfig::from_lookup(lookup(&[(ENV_CONFIG_DIR, dir_str)])).is_err());
    }

    #[test]
    fn blank_env_values_count_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let config = WorkdeskConfig::from_lookup(lookup(&[
            (ENV_CONFIG_DIR, dir_str),
            (ENV_TOKEN, "   "),
            (ENV_AUTH_URL, ""),
        ]))
        .unwrap();
        assert!(!config.has_token_override());
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
    }

    #[test]
    fn token_override_flows_into_store_and_is_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let config = WorkdeskConfig::from_lookup(lookup(&[
            (ENV_CONFIG_DIR, dir_str),
            (ENV_TOKEN, "wd_override_secret"),
        ]))
        .unwrap();

        let resolved = config.credential_store().resolve().unwrap().unwrap();
        assert_eq!(resolved.source, CredentialSource::Override);
        assert_eq!(resolved.credential.access_token(), "wd_override_secret");

        let debug = format!("{config:?}");
        assert!(!debug.contains("wd_override_secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
