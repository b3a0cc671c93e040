use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::api::ApiConfig;
use crate::application::ConflictPolicy;
use crate::engine::Aria2Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read from `SCD_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub download_dir: PathBuf,
    pub conflict_policy: ConflictPolicy,
    /// Suffix of the engine's partial-download sidecar.
    pub partial_suffix: String,
    pub fetch_timeout: Duration,
    pub poll_interval: Duration,
    pub aria2: Aria2Config,
    pub api: ApiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            conflict_policy: ConflictPolicy::Ask,
            partial_suffix: ".aria2".to_string(),
            fetch_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(200),
            aria2: Aria2Config::default(),
            api: ApiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read the process environment. Bad values are logged and left at their default.
    pub fn from_env() -> Self {
        let (config, errors) = Self::from_lookup(|name| std::env::var(name).ok());
        for e in errors {
            warn!(error = %e, "ignoring configuration value");
        }
        config
    }

    /// Build a config from any variable source, collecting every rejected value.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut errors = Vec::new();
        let mut config = Self::default();

        if let Some(dir) = var("SCD_DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        if let Some(policy) = parse(&var, "SCD_CONFLICT_POLICY", &mut errors) {
            config.conflict_policy = policy;
        }
        if let Some(suffix) = var("SCD_PARTIAL_SUFFIX") {
            config.partial_suffix = suffix;
        }
        if let Some(secs) = parse::<u64, _>(&var, "SCD_FETCH_TIMEOUT_SECS", &mut errors) {
            match secs {
                0 => errors.push(ConfigError::Invalid {
                    name: "SCD_FETCH_TIMEOUT_SECS",
                    value: secs.to_string(),
                    reason: "must be positive".to_string(),
                }),
                secs => config.fetch_timeout = Duration::from_secs(secs),
            }
        }
        if let Some(ms) = parse::<u64, _>(&var, "SCD_POLL_INTERVAL_MS", &mut errors) {
            match ms {
                0 => errors.push(ConfigError::Invalid {
                    name: "SCD_POLL_INTERVAL_MS",
                    value: ms.to_string(),
                    reason: "must be positive".to_string(),
                }),
                ms => config.poll_interval = Duration::from_millis(ms),
            }
        }

        if let Some(rpc_url) = var("SCD_ARIA2_RPC_URL") {
            match url::Url::parse(&rpc_url) {
                Ok(_) => config.aria2.rpc_url = rpc_url,
                Err(e) => errors.push(ConfigError::Invalid {
                    name: "SCD_ARIA2_RPC_URL",
                    value: rpc_url,
                    reason: e.to_string(),
                }),
            }
        }
        config.aria2.secret = var("SCD_ARIA2_SECRET");
        if let Some(binary) = var("SCD_ARIA2_BIN") {
            config.aria2.binary = PathBuf::from(binary);
        }
        config.aria2.download_dir = config.download_dir.clone();

        for (name, slot) in [
            ("SCD_MCSL_BASE", &mut config.api.mcsl_base),
            ("SCD_FASTMIRROR_BASE", &mut config.api.fastmirror_base),
            ("SCD_POLARS_BASE", &mut config.api.polars_base),
            ("SCD_AKIRA_BASE", &mut config.api.akira_base),
        ] {
            let Some(base) = var(name) else { continue };
            match url::Url::parse(&base) {
                Ok(_) => *slot = base,
                Err(e) => errors.push(ConfigError::Invalid {
                    name,
                    value: base,
                    reason: e.to_string(),
                }),
            }
        }

        (config, errors)
    }
}

fn parse<T, F>(var: &F, name: &'static str, errors: &mut Vec<ConfigError>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let value = var(name)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            errors.push(ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            });
            None
        }
    }
}
