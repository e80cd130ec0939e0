use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ManifestError;

/// Update track a client is subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Enhanced,
    Standard,
    Lite,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Enhanced, Channel::Standard, Channel::Lite];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Enhanced => "Enhanced",
            Channel::Standard => "Standard",
            Channel::Lite => "Lite",
        }
    }

    /// File name of this channel's manifest, both on disk and as a release asset.
    #[must_use]
    pub fn manifest_file_name(self) -> String {
        format!("manifest_{}.json", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ManifestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str() == value)
            .ok_or_else(|| ManifestError::UnsupportedChannel(value.to_string()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
