use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("unsupported channel: {0}")]
    UnsupportedChannel(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{context} unavailable: {details}")]
    Transport {
        context: &'static str,
        details: String,
    },

    #[error("{context} http error: {status}")]
    Upstream { context: &'static str, status: u16 },

    #[error("{context} parse error: {details}")]
    Parse {
        origin: Origin,
        context: &'static str,
        details: String,
    },
}

/// Which kind of source produced a malformed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

impl ManifestError {
    pub fn transport<E>(context: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Transport {
            context,
            details: error.to_string(),
        }
    }

    pub fn local_parse<E>(context: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Parse {
            origin: Origin::Local,
            context,
            details: error.to_string(),
        }
    }

    pub fn remote_parse<E>(context: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Parse {
            origin: Origin::Remote,
            context,
            details: error.to_string(),
        }
    }

    /// True for failures caused by the caller's input rather than a source.
    #[must_use]
    pub fn is_rejected_input(&self) -> bool {
        matches!(self, Self::UnsupportedChannel(_))
    }
}
