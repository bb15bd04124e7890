// Application configuration, read from the environment

use crate::types::Millis;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Which execution sandbox the judge talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Local Docker daemon, one container per submission.
    Docker,
    /// Judge0-compatible HTTP sandbox at `SANDBOX_URL`.
    Remote,
}

impl FromStr for EngineKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(EngineKind::Docker),
            "remote" => Ok(EngineKind::Remote),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub bind_addr: String,
    pub languages_path: PathBuf,
    pub engine: EngineKind,
    pub sandbox_url: String,
    pub sandbox_token: Option<String>,
    pub default_timeout: Millis,
    pub timeout_grace: Millis,
    /// Budget for preparing a submission's sandbox: image pull, container start, compile.
    pub setup_timeout: Millis,
    pub run_preview_count: usize,
    pub max_parallel_tests: usize,
    pub submission_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            languages_path: PathBuf::from("config/languages.json"),
            engine: EngineKind::Docker,
            sandbox_url: "http://127.0.0.1:2358".to_string(),
            sandbox_token: None,
            default_timeout: Millis(5000),
            timeout_grace: Millis(1000),
            setup_timeout: Millis(300_000),
            run_preview_count: 3,
            max_parallel_tests: 4,
            submission_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset keys keep their defaults;
    /// set but unparseable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let engine = match lookup("ARBITER_ENGINE") {
            Some(value) => value.parse().map_err(|_| ConfigError {
                key: "ARBITER_ENGINE",
                value,
            })?,
            None => defaults.engine,
        };

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            languages_path: lookup("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.languages_path),
            engine,
            sandbox_url: lookup("SANDBOX_URL").unwrap_or(defaults.sandbox_url),
            sandbox_token: lookup("SANDBOX_TOKEN").filter(|t| !t.is_empty()),
            default_timeout: Millis(parse_or(&lookup, "DEFAULT_TIMEOUT_MS", defaults.default_timeout.0)?),
            timeout_grace: Millis(parse_or(&lookup, "TIMEOUT_GRACE_MS", defaults.timeout_grace.0)?),
            setup_timeout: Millis(parse_or(&lookup, "SETUP_TIMEOUT_MS", defaults.setup_timeout.0)?),
            run_preview_count: parse_or(&lookup, "RUN_PREVIEW_COUNT", defaults.run_preview_count)?,
            max_parallel_tests: parse_or(&lookup, "MAX_PARALLEL_TESTS", defaults.max_parallel_tests)?
                .max(1),
            submission_ttl_secs: parse_or(&lookup, "SUBMISSION_TTL_SECS", defaults.submission_ttl_secs)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError { key, value }),
        None => Ok(default),
    }
}
