//! Delivery: turning resolved artifacts into files on the user's disk.
//!
//! [`orchestrator`] schedules per-item deliveries on a staggered timeline;
//! [`transport`] picks between the folder-aware native transport and the
//! sandboxed fallback; [`filename`] owns sanitization and collision policy.

mod filename;
mod orchestrator;
mod transport;

pub use filename::{
    PLACEHOLDER_FILENAME, filename_from_url, resolve_unique_path, sanitize_path_segment,
};
pub use orchestrator::{DEFAULT_STAGGER, DeliveryStats, Orchestrator};
pub use transport::{
    NativeTransport, SandboxTransport, Transport, TransportCapabilities, TransportSelector,
};

use std::path::PathBuf;

use thiserror::Error;

use crate::resolver::ResolvedArtifact;

/// What an artifact's bytes are: a remote location to fetch, or content
/// generated in-process (a synthetic artifact, e.g. the serialized case
/// summary) that bypasses resolution entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactPayload {
    /// Bytes live at a remote URL.
    Remote {
        /// Location to fetch.
        url: String,
    },
    /// Bytes are generated content carried inline.
    Inline {
        /// The generated content.
        content: String,
        /// MIME type of the content.
        mime: String,
    },
}

/// One unit of content to be saved to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Where the bytes come from.
    pub payload: ArtifactPayload,
    /// Destination filename (folder handling is the transport's concern).
    pub filename: String,
}

impl Artifact {
    /// Creates an artifact fetched from a remote URL.
    #[must_use]
    pub fn remote(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            payload: ArtifactPayload::Remote { url: url.into() },
            filename: filename.into(),
        }
    }

    /// Creates a synthetic artifact from generated content.
    #[must_use]
    pub fn inline(
        content: impl Into<String>,
        mime: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            payload: ArtifactPayload::Inline {
                content: content.into(),
                mime: mime.into(),
            },
            filename: filename.into(),
        }
    }
}

impl From<ResolvedArtifact> for Artifact {
    fn from(resolved: ResolvedArtifact) -> Self {
        Self::remote(resolved.location_url, resolved.suggested_filename)
    }
}

/// Errors from artifact delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The delivery request could not be handed to the native transport.
    /// This is a dispatch failure, not a failed download; it triggers the
    /// synchronous fallback to the sandbox transport.
    #[error("dispatch to native transport failed: {message}")]
    Dispatch {
        /// Why dispatch failed.
        message: String,
    },

    /// Network-level error fetching artifact bytes.
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The artifact location answered with a non-success status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that failed.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Filesystem error writing the artifact.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
