//! Error kinds raised by the version manager.
//!
//! Components return `anyhow::Result` and raise these typed errors inside it.
//! Callers that need to branch on the kind use `downcast_ref::<VermanError>()`,
//! everything else just propagates with `?` and gets reported by `main`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VermanError {
    /// Index host or artifact URL unreachable, invalid or timed out.
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    /// The version index document is not well-formed.
    #[error("failed to parse version index from {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// No package for the requested version on this platform.
    #[error("invalid or unsupported {runtime} version {version} for {platform}")]
    NotFound {
        runtime: String,
        version: String,
        platform: String,
    },

    /// Downloaded bytes do not hash to the declared digest.
    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Corrupt or unrecognized archive, or no binary root inside it.
    #[error("failed to install {path:?}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// The active-version link could not be removed or created.
    #[error("failed to update active-version link {path:?}: {message}")]
    Link { path: PathBuf, message: String },

    /// The requested transition is not allowed in the current state.
    #[error("{message}")]
    State { message: String },
}

impl VermanError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn link(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Link {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Find a `VermanError` anywhere in an anyhow chain.
    pub fn find(error: &anyhow::Error) -> Option<&VermanError> {
        error.chain().find_map(|e| e.downcast_ref::<VermanError>())
    }
}
