use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::assets::{ReleaseAsset, find_asset};
use crate::error::ManifestError;

pub const DEFAULT_ENTRYPOINT: &str = "Bomana.pyw";

/// Manifest document as stored on disk or attached to a release.
///
/// Every field is optional here; [`Normalizer::normalize`] decides what is
/// required. Strings are trimmed and empty strings count as absent. Numbers
/// and booleans are accepted and rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawManifest {
    #[serde(deserialize_with = "lenient_string")]
    pub app_version: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub package_url: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub package_asset: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub package_sha256: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub entrypoint: Option<String>,
}

impl RawManifest {
    /// Interpret a parsed JSON value as a manifest document.
    ///
    /// # Errors
    /// Returns an error when the value is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if !value.is_object() {
            return Err(serde::de::Error::custom("manifest must be a JSON object"));
        }
        serde_json::from_value(value)
    }

    /// Parse manifest text.
    ///
    /// # Errors
    /// Returns an error when the text is not a JSON object.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => return Ok(None),
    };
    Ok(Some(text).filter(|text| !text.is_empty()))
}

/// The manifest returned to update clients.
///
/// Only [`Normalizer::normalize`] builds one, so `app_version` and
/// `package_url` are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalManifest {
    app_version: String,
    package_url: String,
    package_sha256: String,
    entrypoint: String,
    source_name: String,
}

impl CanonicalManifest {
    #[must_use]
    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    #[must_use]
    pub fn package_url(&self) -> &str {
        &self.package_url
    }

    #[must_use]
    pub fn package_sha256(&self) -> &str {
        &self.package_sha256
    }

    #[must_use]
    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

/// How download links may be produced when a manifest has no explicit URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServingMode {
    /// Only relay URLs found in the manifest or its release assets.
    StatsOnly,
    /// Additionally build `{download_base_url}/downloads/{package_asset}`.
    Compatibility { download_base_url: String },
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    mode: ServingMode,
}

impl Normalizer {
    #[must_use]
    pub fn new(mode: ServingMode) -> Self {
        let mode = match mode {
            ServingMode::Compatibility { download_base_url } => ServingMode::Compatibility {
                download_base_url: download_base_url.trim().trim_end_matches('/').to_string(),
            },
            ServingMode::StatsOnly => ServingMode::StatsOnly,
        };
        Self { mode }
    }

    /// Validate a raw document and resolve its download URL.
    ///
    /// # Errors
    /// Returns [`ManifestError::Validation`] when `app_version` is missing and
    /// [`ManifestError::Configuration`] when no download URL can be resolved
    /// under the current serving mode.
    pub fn normalize(
        &self,
        doc: &RawManifest,
        source_name: &str,
        assets: Option<&[ReleaseAsset]>,
    ) -> Result<CanonicalManifest, ManifestError> {
        let Some(app_version) = doc.app_version.clone() else {
            return Err(ManifestError::Validation(
                "manifest missing required fields".to_string(),
            ));
        };

        let package_url = match explicit_package_url(doc, assets) {
            Some(url) => url,
            None => self.fallback_package_url(doc)?,
        };

        Ok(CanonicalManifest {
            app_version,
            package_url,
            package_sha256: doc.package_sha256.clone().unwrap_or_default(),
            entrypoint: doc
                .entrypoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENTRYPOINT.to_string()),
            source_name: source_name.to_string(),
        })
    }

    fn fallback_package_url(&self, doc: &RawManifest) -> Result<String, ManifestError> {
        match &self.mode {
            ServingMode::StatsOnly => Err(ManifestError::Configuration(
                "STATS_ONLY_MODE requires manifest.package_url".to_string(),
            )),
            ServingMode::Compatibility { download_base_url } => {
                let Some(asset) = doc.package_asset.as_deref() else {
                    return Err(ManifestError::Configuration(
                        "manifest missing package_url/package_asset".to_string(),
                    ));
                };
                if download_base_url.is_empty() {
                    return Err(ManifestError::Configuration(
                        "DOWNLOAD_BASE_URL is empty and manifest.package_url is not set"
                            .to_string(),
                    ));
                }
                Ok(format!("{download_base_url}/downloads/{asset}"))
            }
        }
    }
}

fn explicit_package_url(doc: &RawManifest, assets: Option<&[ReleaseAsset]>) -> Option<String> {
    if let Some(url) = &doc.package_url {
        return Some(url.clone());
    }

    let name = doc.package_asset.as_deref()?;
    let assets = assets.filter(|assets| !assets.is_empty())?;
    find_asset(assets, name)
        .map(|asset| asset.download_url.trim().to_string())
        .filter(|url| !url.is_empty())
}
