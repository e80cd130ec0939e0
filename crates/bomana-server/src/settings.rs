use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bomana_core::{FallbackPolicy, RemoteProject, ResolverConfig, ServingMode};
use simplelog::LevelFilter;
use thiserror::Error;

const DEFAULT_DB_PATH: &str = "/data/stats.db";
const DEFAULT_MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;
const MIN_CACHE_TTL_SECS: i64 = 30;
const MIN_HTTP_TIMEOUT_SECS: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {key} value {value:?}: {reason}")]
pub struct SettingsError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
    pub max_log_size: u64,
    pub resolver: ResolverConfig,
}

impl ServiceSettings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    /// Returns an error when a variable is set to a value that cannot be parsed.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    /// Returns an error when a variable is set to a value that cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = ResolverConfig::default();

        let download_base_url = env
            .text("DOWNLOAD_BASE_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        let serving_mode = if stats_only(env.text("STATS_ONLY_MODE").as_deref()) {
            ServingMode::StatsOnly
        } else {
            ServingMode::Compatibility { download_base_url }
        };

        let cache_ttl_secs = env
            .parse::<i64>("GITHUB_CACHE_TTL_SEC")?
            .map_or(defaults.cache_ttl, |secs| {
                Duration::from_secs(secs.max(MIN_CACHE_TTL_SECS).unsigned_abs())
            });

        let http_timeout = match env.parse::<f64>("HTTP_TIMEOUT_SEC")? {
            // clamp keeps NaN, so it is rejected below rather than floored
            Some(secs) => Duration::try_from_secs_f64(secs.clamp(MIN_HTTP_TIMEOUT_SECS, f64::MAX))
                .map_err(|error| SettingsError {
                    key: "HTTP_TIMEOUT_SEC",
                    value: secs.to_string(),
                    reason: error.to_string(),
                })?,
            None => defaults.http_timeout,
        };

        let resolver = ResolverConfig {
            manifest_dir: env
                .text("MANIFEST_DIR")
                .map_or(defaults.manifest_dir, PathBuf::from),
            source_name: env.text("SOURCE_NAME").unwrap_or(defaults.source_name),
            serving_mode,
            policy: env
                .text("MANIFEST_MODE")
                .map_or(defaults.policy, |mode| FallbackPolicy::parse(&mode)),
            project: RemoteProject {
                api_base: env
                    .text("GITHUB_API_BASE")
                    .unwrap_or(defaults.project.api_base),
                owner: env
                    .text("GITHUB_REPO_OWNER")
                    .unwrap_or(defaults.project.owner),
                repo: env.text("GITHUB_REPO_NAME").unwrap_or(defaults.project.repo),
            },
            token: env.text("GITHUB_TOKEN"),
            cache_ttl: cache_ttl_secs,
            http_timeout,
        };

        Ok(Self {
            bind_addr: env
                .parse("BIND_ADDR")?
                .unwrap_or_else(default_bind_addr),
            db_path: env
                .text("DB_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from),
            log_level: env.parse("LOG_LEVEL")?.unwrap_or(LevelFilter::Info),
            log_file: env.text("LOG_FILE").map(PathBuf::from),
            max_log_size: env.parse("LOG_MAX_BYTES")?.unwrap_or(DEFAULT_MAX_LOG_SIZE),
            resolver,
        })
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn stats_only(value: Option<&str>) -> bool {
    value.is_none_or(|value| {
        !matches!(
            value.to_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        )
    })
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value of `key`; unset and blank are both `None`.
    fn text(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, SettingsError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(key)
            .map(|value| {
                value.parse::<T>().map_err(|error| SettingsError {
                    key,
                    value: value.clone(),
                    reason: error.to_string(),
                })
            })
            .transpose()
    }
}
