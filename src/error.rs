//! Error types for the image cache-and-load pipeline.

use std::path::PathBuf;

/// Result type alias for cache and load operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while caching, loading, or cleaning images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Reference Errors
    // =========================================================================
    /// Failed to parse image reference.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// A single image source could not provide the image.
    #[error("{source_name} could not provide '{reference}': {reason}")]
    SourceFailed {
        source_name: String,
        reference: String,
        reason: String,
    },

    /// Every image source failed. Wraps the last source's error.
    #[error("failed to resolve image '{reference}'")]
    ResolutionFailed {
        reference: String,
        #[source]
        last: Box<Error>,
    },

    /// Image exceeds a configured bound.
    #[error("image exceeds size limit: {size} > {limit} bytes")]
    ImageTooLarge { size: u64, limit: u64 },

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Writing an archive into the cache failed.
    #[error("failed to write cache entry {path}: {reason}")]
    CacheWriteFailed { path: PathBuf, reason: String },

    /// Cache entry does not exist.
    #[error("cache entry not found: {path}")]
    EntryNotFound { path: PathBuf },

    /// Walking the cache directory failed.
    #[error("failed to walk cache directory {path}: {reason}")]
    WalkFailed { path: PathBuf, reason: String },

    /// Archive encoding or decoding failed.
    #[error("invalid image archive: {0}")]
    InvalidArchive(String),

    // =========================================================================
    // Platform Errors
    // =========================================================================
    /// Drive letter could not be translated to a volume identifier.
    #[error("failed to resolve volume for drive {drive}: {reason}")]
    VolumeResolutionFailed { drive: char, reason: String },

    // =========================================================================
    // Target Errors
    // =========================================================================
    /// Copying a file onto the target failed.
    #[error("failed to transfer {path} to {destination}: {reason}")]
    TransferFailed {
        path: PathBuf,
        destination: String,
        reason: String,
    },

    /// Command on the target exited unsuccessfully.
    #[error("command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// Container runtime rejected an archive.
    #[error("{runtime} load {path}: {reason}")]
    LoadFailed {
        runtime: String,
        path: String,
        reason: String,
    },

    /// Unknown container runtime selector.
    #[error("unknown container runtime: {0}")]
    UnknownRuntime(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Cluster configuration file does not exist.
    #[error("cluster config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Cluster configuration exists but could not be read.
    #[error("invalid cluster config at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // =========================================================================
    // Batch Errors
    // =========================================================================
    /// Failure of a single image within a batch.
    ///
    /// `path` is the image's cache path, or the cache root when the
    /// reference is invalid.
    #[error("{operation} {reference} ({path})")]
    Image {
        operation: &'static str,
        reference: String,
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// First failure observed across a batch.
    #[error("{operation}")]
    Batch {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Walks the `Image`/`Batch` wrappers down to the underlying failure.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Image { source, .. } | Self::Batch { source, .. } => source.root_cause(),
            Self::ResolutionFailed { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
