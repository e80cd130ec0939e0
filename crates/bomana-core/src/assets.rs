use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::manifest::lenient_string;

/// One attachment of a release.
///
/// Fields that are missing, `null` or not text-like read as empty, so a
/// malformed asset never matches a lookup instead of failing the release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, rename = "browser_download_url", deserialize_with = "lenient_text")]
    pub download_url: String,
}

impl ReleaseAsset {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
        }
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

/// Read a release's `assets` value.
///
/// Anything but an array is an empty list; entries that are not objects are
/// skipped.
pub(crate) fn lenient_assets<'de, D>(deserializer: D) -> Result<Vec<ReleaseAsset>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(entries)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

/// Find an asset by name, ignoring case and surrounding whitespace.
///
/// The first match in list order wins.
#[must_use]
pub fn find_asset<'a>(assets: &'a [ReleaseAsset], name: &str) -> Option<&'a ReleaseAsset> {
    let wanted = name.trim().to_lowercase();
    assets
        .iter()
        .find(|asset| asset.name.trim().to_lowercase() == wanted)
}
