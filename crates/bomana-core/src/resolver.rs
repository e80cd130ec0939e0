use std::sync::Arc;

use log::{debug, warn};

use crate::cache::ResolutionCache;
use crate::channel::Channel;
use crate::config::{FallbackPolicy, ResolverConfig};
use crate::error::ManifestError;
use crate::local::LocalSource;
use crate::manifest::{CanonicalManifest, Normalizer};
use crate::remote::{HttpFetcher, RemoteSource};
use crate::source::ManifestSource;

#[derive(Debug, Clone, Copy)]
enum Attempt {
    Local,
    Remote,
}

/// Resolves the current manifest for a channel under a [`FallbackPolicy`].
///
/// Remote results are memoized in a [`ResolutionCache`]; local reads never are.
/// When the first source of a two-source policy fails for any reason the second
/// is tried once, and its error (if any) is what the caller sees.
pub struct ManifestResolver {
    policy: FallbackPolicy,
    local: Arc<dyn ManifestSource>,
    remote: Arc<dyn ManifestSource>,
    cache: Arc<ResolutionCache>,
}

impl ManifestResolver {
    pub fn new(
        policy: FallbackPolicy,
        local: Arc<dyn ManifestSource>,
        remote: Arc<dyn ManifestSource>,
        cache: Arc<ResolutionCache>,
    ) -> Self {
        Self {
            policy,
            local,
            remote,
            cache,
        }
    }

    /// Wire the disk and GitHub sources described by `config`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &ResolverConfig) -> Result<Self, ManifestError> {
        let config = config.clone().clamped();
        let normalizer = Normalizer::new(config.serving_mode);
        let fetcher = HttpFetcher::new(config.http_timeout, config.token)?;

        let local = LocalSource::new(config.manifest_dir, config.source_name.clone(), normalizer.clone());
        let remote = RemoteSource::new(
            Arc::new(fetcher),
            config.project,
            config.source_name,
            normalizer,
        );

        Ok(Self::new(
            config.policy,
            Arc::new(local),
            Arc::new(remote),
            Arc::new(ResolutionCache::new(config.cache_ttl)),
        ))
    }

    #[must_use]
    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Resolve the manifest for a channel name.
    ///
    /// # Errors
    /// Returns [`ManifestError::UnsupportedChannel`] before any I/O when the
    /// channel is unknown, otherwise the error of the last source attempted.
    pub async fn resolve(&self, channel: &str) -> Result<CanonicalManifest, ManifestError> {
        let channel: Channel = channel.parse()?;

        match self.policy {
            FallbackPolicy::Local => self.attempt(Attempt::Local, channel).await,
            FallbackPolicy::Remote => self.attempt(Attempt::Remote, channel).await,
            FallbackPolicy::LocalThenRemote => {
                self.attempt_with_fallback(Attempt::Local, Attempt::Remote, channel)
                    .await
            }
            FallbackPolicy::RemoteThenLocal => {
                self.attempt_with_fallback(Attempt::Remote, Attempt::Local, channel)
                    .await
            }
        }
    }

    async fn attempt_with_fallback(
        &self,
        first: Attempt,
        second: Attempt,
        channel: Channel,
    ) -> Result<CanonicalManifest, ManifestError> {
        match self.attempt(first, channel).await {
            Ok(manifest) => Ok(manifest),
            Err(error) => {
                warn!(
                    "{} manifest source failed for {channel}: {error}; trying {}",
                    self.source(first).name(),
                    self.source(second).name()
                );
                self.attempt(second, channel).await
            }
        }
    }

    async fn attempt(
        &self,
        attempt: Attempt,
        channel: Channel,
    ) -> Result<CanonicalManifest, ManifestError> {
        match attempt {
            Attempt::Local => self.local.load(channel).await,
            Attempt::Remote => self.load_remote(channel).await,
        }
    }

    async fn load_remote(&self, channel: Channel) -> Result<CanonicalManifest, ManifestError> {
        if let Some(cached) = self.cache.get(channel) {
            debug!("Serving cached {} manifest for {channel}", self.remote.name());
            return Ok(cached);
        }

        let fetch_started = self.cache.now();
        let manifest = self.remote.load(channel).await?;
        self.cache.put_at(channel, manifest.clone(), fetch_started);
        Ok(manifest)
    }

    fn source(&self, attempt: Attempt) -> &dyn ManifestSource {
        match attempt {
            Attempt::Local => self.local.as_ref(),
            Attempt::Remote => self.remote.as_ref(),
        }
    }
}
