use crate::error::ConfigError;
use crate::paginate::DEFAULT_PER_PAGE;
use crate::retry::{
    RetryPolicy, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_ATTEMPTS, DEFAULT_RESERVED_THRESHOLD,
};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for the GitHub client.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub api_url: String,
    pub api_version: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

/// Knobs for the retry and depagination layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub reserved_threshold: u32,
    pub grace_secs: u64,
    pub per_page: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            reserved_threshold: DEFAULT_RESERVED_THRESHOLD,
            grace_secs: DEFAULT_GRACE_PERIOD.as_secs(),
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            reserved_threshold: self.reserved_threshold,
            grace_period: Duration::from_secs(self.grace_secs),
        }
    }
}

fn default_user_agent() -> String {
    format!("ghutil/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    /// Configuration with every default applied, for the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: "https://api.github.com".to_string(),
            api_version: "2022-11-28".to_string(),
            user_agent: default_user_agent(),
            timeout_secs: 30,
            retry: RetrySettings::default(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - GITHUB_TOKEN (or GH_TOKEN, or a file named by GITHUB_TOKEN_FILE) [required]
    /// - GITHUB_API_URL (default: https://api.github.com)
    /// - GITHUB_API_VERSION (default: 2022-11-28)
    /// - GITHUB_HTTP_TIMEOUT_SECS (default: 30)
    /// - GITHUB_USER_AGENT (default: ghutil/<version>)
    /// - GHUTIL_MAX_ATTEMPTS (default: 5, at least 1)
    /// - GHUTIL_RESERVED_THRESHOLD (default: 50)
    /// - GHUTIL_GRACE_SECS (default: 10)
    /// - GHUTIL_PER_PAGE (default: 100, 1..=100)
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = match env::var("GITHUB_TOKEN").or_else(|_| env::var("GH_TOKEN")) {
            Ok(t) => t,
            Err(_) => {
                let path = env::var("GITHUB_TOKEN_FILE").map_err(|_| ConfigError::MissingToken)?;
                read_token_file(&path)?
            }
        };

        let mut cfg = Config::new(token);
        if let Ok(url) = env::var("GITHUB_API_URL") {
            cfg = cfg.with_api_url(url);
        }
        if let Ok(v) = env::var("GITHUB_API_VERSION") {
            cfg.api_version = v;
        }
        if let Ok(ua) = env::var("GITHUB_USER_AGENT") {
            cfg.user_agent = ua;
        }
        cfg.timeout_secs = parse_setting(
            "GITHUB_HTTP_TIMEOUT_SECS",
            env::var("GITHUB_HTTP_TIMEOUT_SECS").ok(),
            30,
        )?;

        let retry = &mut cfg.retry;
        retry.max_attempts = parse_setting(
            "GHUTIL_MAX_ATTEMPTS",
            env::var("GHUTIL_MAX_ATTEMPTS").ok(),
            DEFAULT_MAX_ATTEMPTS,
        )?;
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "GHUTIL_MAX_ATTEMPTS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        retry.reserved_threshold = parse_setting(
            "GHUTIL_RESERVED_THRESHOLD",
            env::var("GHUTIL_RESERVED_THRESHOLD").ok(),
            DEFAULT_RESERVED_THRESHOLD,
        )?;
        retry.grace_secs = parse_setting(
            "GHUTIL_GRACE_SECS",
            env::var("GHUTIL_GRACE_SECS").ok(),
            DEFAULT_GRACE_PERIOD.as_secs(),
        )?;
        retry.per_page = parse_setting(
            "GHUTIL_PER_PAGE",
            env::var("GHUTIL_PER_PAGE").ok(),
            DEFAULT_PER_PAGE,
        )?
        .clamp(1, 100);

        Ok(cfg)
    }
}

fn read_token_file(path: &str) -> Result<String, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::TokenFile {
        path: path.to_string(),
        source,
    })?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(ConfigError::MissingToken);
    }
    Ok(token.to_string())
}

/// Parse an optional setting, falling back to `default` when unset or blank.
pub fn parse_setting<T>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value: v,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_setting_defaults_and_errors() {
        assert_eq!(parse_setting::<u32>("X", None, 5).unwrap(), 5);
        assert_eq!(parse_setting::<u32>("X", Some("  ".into()), 5).unwrap(), 5);
        assert_eq!(parse_setting::<u32>("X", Some(" 7 ".into()), 5).unwrap(), 7);
        let err = parse_setting::<u32>("GHUTIL_PER_PAGE", Some("lots".into()), 100).unwrap_err();
        assert!(err.to_string().contains("GHUTIL_PER_PAGE"));
    }

    #[test]
    fn defaults_match_retry_constants() {
        let cfg = Config::new("t").with_api_url("http://localhost:1234/");
        assert_eq!(cfg.api_url, "http://localhost:1234");
        let policy = cfg.retry.policy();
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(cfg.retry.per_page, 100);
    }

    #[test]
    fn token_file_is_trimmed() {
        let path = std::env::temp_dir().join(format!("ghutil-token-{}", std::process::id()));
        std::fs::write(&path, "  secret\n").unwrap();
        let token = read_token_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(token, "secret");
    }
}
