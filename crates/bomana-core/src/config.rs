use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::cache::{DEFAULT_CACHE_TTL, MIN_CACHE_TTL};
use crate::manifest::ServingMode;
use crate::remote::{DEFAULT_API_BASE, DEFAULT_HTTP_TIMEOUT, MIN_HTTP_TIMEOUT, RemoteProject};

/// Order in which manifest sources are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    Local,
    Remote,
    LocalThenRemote,
    #[default]
    RemoteThenLocal,
}

impl FallbackPolicy {
    /// Parse a `MANIFEST_MODE` value.
    ///
    /// Unrecognized values select [`FallbackPolicy::RemoteThenLocal`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "local" => Self::Local,
            "github" => Self::Remote,
            "local_then_github" => Self::LocalThenRemote,
            "github_then_local" => Self::RemoteThenLocal,
            other => {
                warn!("Unknown manifest mode '{other}', using github_then_local");
                Self::RemoteThenLocal
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "github",
            Self::LocalThenRemote => "local_then_github",
            Self::RemoteThenLocal => "github_then_local",
        }
    }

    #[must_use]
    pub fn uses_remote(self) -> bool {
        !matches!(self, Self::Local)
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub manifest_dir: PathBuf,
    pub source_name: String,
    pub serving_mode: ServingMode,
    pub policy: FallbackPolicy,
    pub project: RemoteProject,
    pub token: Option<String>,
    pub cache_ttl: Duration,
    pub http_timeout: Duration,
}

impl ResolverConfig {
    /// Raise the cache TTL and HTTP timeout to their minimums.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.cache_ttl = self.cache_ttl.max(MIN_CACHE_TTL);
        self.http_timeout = self.http_timeout.max(MIN_HTTP_TIMEOUT);
        self
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from("/data/manifests"),
            source_name: "TencentCloud".to_string(),
            serving_mode: ServingMode::StatsOnly,
            policy: FallbackPolicy::default(),
            project: RemoteProject {
                api_base: DEFAULT_API_BASE.to_string(),
                owner: "Thankyou-Cheems".to_string(),
                repo: "Bomana".to_string(),
            },
            token: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}
