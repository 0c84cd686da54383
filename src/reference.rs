//! Image reference parsing and validation.
//!
//! Wraps the `oci-distribution` parser with the length and character checks
//! applied to every reference before it reaches a registry or the
//! filesystem.

use crate::constants::{DEFAULT_TAG, IMAGE_REF_VALID_CHARS, MAX_IMAGE_REF_LEN};
use crate::error::{Error, Result};
use oci_distribution::Reference;
use std::fmt;
use std::str::FromStr;

/// A validated image reference such as `registry.example.com/team/app:v1.2`.
///
/// Keeps the caller's spelling alongside the canonical parse so the cache
/// path and archive tag match what the caller asked for.
#[derive(Debug, Clone)]
pub struct ImageReference {
    original: String,
    inner: Reference,
}

impl ImageReference {
    /// Parses and validates an image reference.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidImageReference`] if the reference is empty, longer
    /// than [`MAX_IMAGE_REF_LEN`], contains characters outside
    /// [`IMAGE_REF_VALID_CHARS`], or is rejected by the parser.
    pub fn parse(image: &str) -> Result<Self> {
        validate(image)?;
        let inner: Reference = image.parse().map_err(|e| Error::InvalidImageReference {
            reference: image.to_string(),
            reason: format!("{}", e),
        })?;
        Ok(Self {
            original: image.to_string(),
            inner,
        })
    }

    /// Returns the reference as given by the caller.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Registry host, e.g. `docker.io`.
    pub fn registry(&self) -> &str {
        self.inner.registry()
    }

    /// Repository path within the registry, e.g. `library/nginx`.
    pub fn repository(&self) -> &str {
        self.inner.repository()
    }

    /// Tag, defaulting to [`DEFAULT_TAG`].
    pub fn tag(&self) -> &str {
        self.inner.tag().unwrap_or(DEFAULT_TAG)
    }

    /// Digest, if the reference pins one.
    pub fn digest(&self) -> Option<&str> {
        self.inner.digest()
    }

    /// Canonical `(repository, tag)` pair with the registry folded in.
    pub fn canonical(&self) -> (String, String) {
        (
            format!("{}/{}", self.registry(), self.repository()),
            self.tag().to_string(),
        )
    }

    /// Name used to tag the image inside an archive.
    ///
    /// The caller's spelling is kept; an untagged reference gets
    /// [`DEFAULT_TAG`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidImageReference`] for digest-only references, which
    /// cannot carry a tag.
    pub fn repo_tag(&self) -> Result<String> {
        let (name, pinned) = match self.original.split_once('@') {
            Some((name, _)) => (name, true),
            None => (self.original.as_str(), false),
        };
        let last = name.rsplit('/').next().unwrap_or(name);
        if last.contains(':') {
            return Ok(name.to_string());
        }
        if pinned {
            return Err(Error::InvalidImageReference {
                reference: self.original.clone(),
                reason: "digest references cannot be tagged".to_string(),
            });
        }
        Ok(format!("{}:{}", name, DEFAULT_TAG))
    }

    /// Underlying `oci-distribution` reference.
    pub fn oci(&self) -> &Reference {
        &self.inner
    }

    /// Reference to the same repository pinned to `digest`.
    pub fn with_digest(&self, digest: &str) -> Reference {
        Reference::with_digest(
            self.registry().to_string(),
            self.repository().to_string(),
            digest.to_string(),
        )
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Checks length and characters of a raw reference.
fn validate(image: &str) -> Result<()> {
    if image.is_empty() {
        return Err(Error::InvalidImageReference {
            reference: image.to_string(),
            reason: "empty image reference".to_string(),
        });
    }
    if image.len() > MAX_IMAGE_REF_LEN {
        return Err(Error::InvalidImageReference {
            reference: image.chars().take(50).collect::<String>() + "...",
            reason: format!("exceeds maximum length of {} bytes", MAX_IMAGE_REF_LEN),
        });
    }
    if !image.chars().all(|c| IMAGE_REF_VALID_CHARS.contains(c)) {
        return Err(Error::InvalidImageReference {
            reference: image.to_string(),
            reason: "contains invalid characters".to_string(),
        });
    }
    Ok(())
}
