use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;

use crate::channel::Channel;
use crate::error::ManifestError;
use crate::manifest::{CanonicalManifest, Normalizer, RawManifest};
use crate::source::ManifestSource;

/// Reads `manifest_<channel>.json` from a directory on disk.
pub struct LocalSource {
    manifest_dir: PathBuf,
    source_name: String,
    normalizer: Normalizer,
}

impl LocalSource {
    pub fn new(
        manifest_dir: impl Into<PathBuf>,
        source_name: impl Into<String>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            manifest_dir: manifest_dir.into(),
            source_name: source_name.into(),
            normalizer,
        }
    }

    /// Read the raw manifest document for a channel.
    ///
    /// # Errors
    /// Returns [`ManifestError::NotFound`] when the channel has no manifest
    /// file and [`ManifestError::Parse`] when the file is not a JSON object.
    pub async fn read(&self, channel: Channel) -> Result<RawManifest, ManifestError> {
        let file_name = channel.manifest_file_name();
        let path = self.manifest_dir.join(&file_name);

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(format!(
                    "manifest not found: {file_name}"
                )));
            }
            Err(error) => return Err(ManifestError::local_parse("manifest", error)),
        };

        debug!("Read local manifest {}", path.display());
        RawManifest::from_json(&text).map_err(|error| ManifestError::local_parse("manifest", error))
    }
}

#[async_trait]
impl ManifestSource for LocalSource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn load(&self, channel: Channel) -> Result<CanonicalManifest, ManifestError> {
        let doc = self.read(channel).await?;
        self.normalizer.normalize(&doc, &self.source_name, None)
    }
}
