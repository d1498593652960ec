//! config-rs/lib.rs
//! Shared configuration utilities for consistent assistant configuration.
//! Provides typed environment lookups and the aggregated [`AssistantConfig`].

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Load a `.env` file from the working directory (or a parent) if one exists.
///
/// Returns `true` when a file was found and applied.
pub fn load_dotenv() -> bool {
    match dotenv::dotenv() {
        Ok(path) => {
            log::debug!("Loaded environment from {}", path.display());
            true
        }
        Err(_) => false,
    }
}

/// Read an environment variable and parse it, falling back to `default` when
/// the variable is unset or unparsable.
///
/// # Arguments
/// * `name` - The environment variable name (e.g., "NOVA_MAX_CONCURRENT_REQUESTS")
/// * `default` - The value to use when the variable is missing or invalid
pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value in {}, using default", name);
            default
        }),
        Err(_) => default,
    }
}

/// Read a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => parse_bool(&raw).unwrap_or_else(|| {
            log::warn!("Invalid boolean in {}, using default {}", name, default);
            default
        }),
        Err(_) => default,
    }
}

/// Parse the boolean spellings accepted by [`env_bool`].
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a duration given in milliseconds.
pub fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or(name, default_ms))
}

/// Read a duration given in seconds.
pub fn env_duration_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_or(name, default_secs))
}

/// Read an optional string; empty values count as unset.
pub fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Process-wide assistant settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Upper bound on the classification call
    pub classify_timeout: Duration,
    /// Upper bound on the summarization call
    pub summary_timeout: Duration,
    /// Upper bound on a foreground command
    pub execution_timeout: Duration,
    /// How long an operator may leave a confirmation unanswered.
    /// `None` waits indefinitely.
    pub confirmation_timeout: Option<Duration>,
    /// Size of the request worker pool
    pub max_concurrent_requests: usize,
    /// Optional TOML file holding the action/path whitelists
    pub policy_path: Option<PathBuf>,
    /// Append-only interaction ledger
    pub ledger_path: PathBuf,
    /// Overrides the detected operating system name given to the model
    pub os_distro: Option<String>,
    /// Log the execution plan instead of spawning anything
    pub dry_run: bool,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_millis(30_000),
            summary_timeout: Duration::from_millis(30_000),
            execution_timeout: Duration::from_secs(60),
            confirmation_timeout: Some(Duration::from_secs(120)),
            max_concurrent_requests: 4,
            policy_path: None,
            ledger_path: PathBuf::from("data/interactions/ledger.jsonl"),
            os_distro: None,
            dry_run: false,
            log_level: "info".to_string(),
            log_json: false,
            log_dir: None,
        }
    }
}

impl AssistantConfig {
    /// Build the configuration from `NOVA_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // 0 disables the confirmation timeout
        let confirmation_secs = env_or("NOVA_CONFIRMATION_TIMEOUT_SECS", 120u64);
        let confirmation_timeout =
            (confirmation_secs > 0).then(|| Duration::from_secs(confirmation_secs));

        Self {
            classify_timeout: env_duration_ms("NOVA_CLASSIFY_TIMEOUT_MS", 30_000),
            summary_timeout: env_duration_ms("NOVA_SUMMARY_TIMEOUT_MS", 30_000),
            execution_timeout: env_duration_secs("NOVA_EXECUTION_TIMEOUT_SECS", 60),
            confirmation_timeout,
            max_concurrent_requests: env_or(
                "NOVA_MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            ),
            policy_path: env_opt("NOVA_POLICY_PATH").map(PathBuf::from),
            ledger_path: env_opt("NOVA_LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ledger_path),
            os_distro: env_opt("NOVA_OS_DISTRO"),
            dry_run: env_bool("NOVA_DRY_RUN", false),
            log_level: env_opt("NOVA_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env_bool("NOVA_LOG_JSON", false),
            log_dir: env_opt("NOVA_LOG_DIR").map(PathBuf::from),
        }
    }

    /// Reject settings that would leave workers stuck or unable to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_requests == 0 {
            return Err(invalid(
                "NOVA_MAX_CONCURRENT_REQUESTS",
                "at least one worker is required",
            ));
        }
        if self.classify_timeout.is_zero() {
            return Err(invalid("NOVA_CLASSIFY_TIMEOUT_MS", "must be greater than 0"));
        }
        if self.summary_timeout.is_zero() {
            return Err(invalid("NOVA_SUMMARY_TIMEOUT_MS", "must be greater than 0"));
        }
        if self.execution_timeout.is_zero() {
            return Err(invalid("NOVA_EXECUTION_TIMEOUT_SECS", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
