use async_trait::async_trait;

use crate::channel::Channel;
use crate::error::ManifestError;
use crate::manifest::CanonicalManifest;

/// A place a channel's manifest can be loaded from.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn load(&self, channel: Channel) -> Result<CanonicalManifest, ManifestError>;
}
