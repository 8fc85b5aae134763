//! Configuration module for the FMU settings client.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default header carrying the API credential.
pub const DEFAULT_TOKEN_HEADER: &str = "x-fmu-settings-api";

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the FMU settings API
    pub api_url: String,
    /// Header name carrying the credential
    pub token_header: String,
    /// URL the client was launched with, possibly carrying `#token=...`
    pub launch_url: Option<String>,
    /// File the credential is persisted to
    pub token_path: PathBuf,
    /// Remaining lock time at which the expiry warning is raised
    pub lock_warning_threshold: Duration,
    /// Interval between lock status polls
    pub lock_poll_interval: Duration,
    /// Delay after a lock refresh before the status is re-read
    pub lock_refresh_settle: Duration,
    /// Per-request timeout handed to the transport
    pub request_timeout: Duration,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8001".to_string(),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            launch_url: None,
            token_path: PathBuf::from("./.fmu-settings/api-token"),
            lock_warning_threshold: Duration::from_millis(60_000),
            lock_poll_interval: Duration::from_millis(15_000),
            lock_refresh_settle: Duration::from_millis(100),
            request_timeout: Duration::from_millis(30_000),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let api_url = env::var("FMU_SETTINGS_API_URL").unwrap_or(defaults.api_url);

        let token_header =
            env::var("FMU_SETTINGS_API_TOKEN_HEADER").unwrap_or(defaults.token_header);

        let launch_url = env::var("FMU_SETTINGS_LAUNCH_URL")
            .ok()
            .filter(|url| !url.is_empty());

        let token_path = env::var("FMU_SETTINGS_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.token_path);

        let lock_warning_threshold = millis_var(
            "FMU_SETTINGS_LOCK_WARNING_THRESHOLD_MS",
            defaults.lock_warning_threshold,
        );
        let lock_poll_interval =
            millis_var("FMU_SETTINGS_LOCK_POLL_INTERVAL_MS", defaults.lock_poll_interval);
        let lock_refresh_settle =
            millis_var("FMU_SETTINGS_LOCK_REFRESH_SETTLE_MS", defaults.lock_refresh_settle);
        let request_timeout =
            millis_var("FMU_SETTINGS_REQUEST_TIMEOUT_MS", defaults.request_timeout);

        let log_level = env::var("FMU_SETTINGS_LOG_LEVEL").unwrap_or(defaults.log_level);

        let log_json = env::var("FMU_SETTINGS_LOG_JSON")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            api_url,
            token_header,
            launch_url,
            token_path,
            lock_warning_threshold,
            lock_poll_interval,
            lock_refresh_settle,
            request_timeout,
            log_level,
            log_json,
        }
    }
}

/// Read a millisecond duration, falling back to `default` when unset or invalid.
fn millis_var(name: &str, default: Duration) -> Duration {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                tracing::warn!("Ignoring invalid {}={:?}, using {:?}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
