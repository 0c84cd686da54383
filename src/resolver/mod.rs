//! # Image Resolution
//!
//! Turns an [`ImageReference`] into an in-memory [`ResolvedImage`] by asking
//! a fixed chain of sources:
//!
//! ```text
//! 1. local daemon         (no network, reuses anything already pulled)
//! 2. registry, keychain   (credentials from the Docker client config)
//! 3. registry, anonymous  (public images when credentials are absent or wrong)
//! ```
//!
//! Sources are tried strictly in order, never raced. Every failure is
//! logged; only the last source's error reaches the caller, wrapped in
//! [`Error::ResolutionFailed`]. There are no retries within a source.

mod daemon;
mod keychain;
mod registry;

pub use daemon::DaemonSource;
pub use keychain::DockerKeychain;
pub use registry::{Credentials, RegistrySource};

use crate::error::{Error, Result};
use crate::reference::ImageReference;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

/// A content blob (config or layer) held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Content digest, `sha256:<hex>`.
    pub digest: String,
    /// Media type.
    pub media_type: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

impl Blob {
    /// Creates a blob, computing its SHA-256 digest.
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&data)));
        Self {
            digest,
            media_type: media_type.into(),
            data,
        }
    }

    /// Digest without its algorithm prefix.
    pub fn hex(&self) -> &str {
        self.digest
            .split_once(':')
            .map(|(_, h)| h)
            .unwrap_or(&self.digest)
    }

    /// Returns true if the blob is gzip compressed.
    pub fn is_gzip(&self) -> bool {
        self.media_type.ends_with("gzip") || crate::archive::is_gzip(&self.data)
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Where a resolved image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Local image daemon.
    Daemon,
    /// Registry with discovered credentials.
    Registry,
    /// Registry without credentials.
    AnonymousRegistry,
}

/// An image fetched into memory, ready to be written as an archive.
///
/// Owned by the cache write that requested it; never shared between
/// writes.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    /// Reference as requested.
    pub reference: String,
    /// Source that produced the image.
    pub source: SourceKind,
    /// Manifest digest, when the source reports one.
    pub digest: Option<String>,
    /// Image config blob.
    pub config: Blob,
    /// Layers, bottom to top.
    pub layers: Vec<Blob>,
}

impl ResolvedImage {
    /// Total size of config and layers.
    pub fn size(&self) -> u64 {
        self.config.size() + self.layers.iter().map(Blob::size).sum::<u64>()
    }
}

/// A place images can be fetched from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetches `reference` into memory.
    async fn fetch(&self, reference: &ImageReference) -> Result<ResolvedImage>;
}

/// Three-tier image resolver.
#[derive(Clone)]
pub struct ImageResolver {
    daemon: Arc<dyn ImageSource>,
    authenticated: Arc<dyn ImageSource>,
    anonymous: Arc<dyn ImageSource>,
}

impl ImageResolver {
    /// Creates a resolver over explicit sources.
    pub fn new(
        daemon: Arc<dyn ImageSource>,
        authenticated: Arc<dyn ImageSource>,
        anonymous: Arc<dyn ImageSource>,
    ) -> Self {
        Self {
            daemon,
            authenticated,
            anonymous,
        }
    }

    /// Creates a resolver over the local Docker daemon and the registry.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(DaemonSource::new()),
            Arc::new(RegistrySource::new(Credentials::Keychain(
                DockerKeychain::from_env(),
            ))),
            Arc::new(RegistrySource::new(Credentials::Anonymous)),
        )
    }

    /// Resolves `reference`, trying each source in turn.
    ///
    /// # Errors
    ///
    /// [`Error::ResolutionFailed`] wrapping the anonymous source's error
    /// when all three sources fail.
    pub async fn resolve(&self, reference: &ImageReference) -> Result<ResolvedImage> {
        info!("retrieving image: {}", reference);

        match self.daemon.fetch(reference).await {
            Ok(image) => {
                info!("found {} locally; caching", reference);
                return Ok(image);
            }
            Err(e) => info!("{} image for {}: {}", self.daemon.name(), reference, e),
        }

        match self.authenticated.fetch(reference).await {
            Ok(image) => return Ok(image),
            Err(e) => warn!(
                "failed {} download for {} (trying anon): {}",
                self.authenticated.name(),
                reference,
                e
            ),
        }

        self.anonymous.fetch(reference).await.map_err(|e| {
            warn!(
                "failed {} download for {}: {}",
                self.anonymous.name(),
                reference,
                e
            );
            Error::ResolutionFailed {
                reference: reference.to_string(),
                last: Box::new(e),
            }
        })
    }
}

impl Default for ImageResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub {
        name: &'static str,
        ok: bool,
        calls: AtomicUsize,
    }

    impl Stub {
        fn new(name: &'static str, ok: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                ok,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageSource for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, reference: &ImageReference) -> Result<ResolvedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.ok {
                return Err(Error::SourceFailed {
                    source_name: self.name.to_string(),
                    reference: reference.to_string(),
                    reason: "unavailable".to_string(),
                });
            }
            Ok(ResolvedImage {
                reference: reference.to_string(),
                source: SourceKind::Daemon,
                digest: None,
                config: Blob::new("application/json", b"{}".to_vec()),
                layers: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn daemon_hit_skips_registry() {
        let (d, a, n) = (Stub::new("daemon", true), Stub::new("authn", true), Stub::new("anon", true));
        let resolver = ImageResolver::new(d.clone(), a.clone(), n.clone());
        let r = ImageReference::parse("repo/x:1").unwrap();

        resolver.resolve(&r).await.unwrap();
        assert_eq!(d.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(n.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_sources_failing_surfaces_last_error() {
        let (d, a, n) = (Stub::new("daemon", false), Stub::new("authn", false), Stub::new("anon", false));
        let resolver = ImageResolver::new(d, a, n);
        let r = ImageReference::parse("repo/x:1").unwrap();

        let err = resolver.resolve(&r).await.unwrap_err();
        match err {
            Error::ResolutionFailed { last, .. } => match *last {
                Error::SourceFailed { source_name, .. } => assert_eq!(source_name, "anon"),
                other => panic!("unexpected inner error: {other}"),
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blob_digest_and_hex() {
        let blob = Blob::new("application/json", b"hello world".to_vec());
        assert_eq!(
            blob.hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(blob.digest.starts_with("sha256:"));
        assert!(!blob.is_gzip());
    }
}
