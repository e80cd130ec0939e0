//! Manifest resolution for the Bomana update service.
//!
//! This crate turns a channel name into the canonical update manifest served
//! to launchers:
//! - Channel validation.
//! - Local (directory) and remote (GitHub latest release) manifest sources.
//! - Normalization of raw manifest documents, including download URL
//!   resolution under the configured serving mode.
//! - A TTL cache around remote lookups and the fallback policy between sources.

mod assets;
mod cache;
mod channel;
mod config;
mod error;
mod local;
mod manifest;
mod remote;
mod resolver;
mod source;

/// Release asset model and case-insensitive lookup.
pub use assets::{ReleaseAsset, find_asset};
/// Per-channel memo of remote resolutions.
pub use cache::{Clock, DEFAULT_CACHE_TTL, MIN_CACHE_TTL, ResolutionCache, SystemClock};
pub use channel::Channel;
/// Resolver wiring and fallback policy.
pub use config::{FallbackPolicy, ResolverConfig};
pub use error::{ManifestError, Origin};
pub use local::LocalSource;
/// Raw and canonical manifest models and the normalizer between them.
pub use manifest::{CanonicalManifest, DEFAULT_ENTRYPOINT, Normalizer, RawManifest, ServingMode};
/// GitHub release source and the JSON fetch seam it runs on.
pub use remote::{
    DEFAULT_API_BASE, DEFAULT_HTTP_TIMEOUT, HttpFetcher, JsonFetcher, MIN_HTTP_TIMEOUT,
    RemoteProject, RemoteSource,
};
pub use resolver::ManifestResolver;
pub use source::ManifestSource;
