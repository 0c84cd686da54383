//! # Image Archive Cache
//!
//! Persists images as docker-archive files under a cache root, one file per
//! image reference:
//!
//! ```text
//! <cache>/
//! ├── k8s.gcr.io/
//! │   ├── kube-addon-manager_v6.5
//! │   └── pause_3.1
//! └── registry.example.com/team/
//!     └── app_v1.2
//! ```
//!
//! ## Entry Lifecycle
//!
//! - **Created** by [`ImageCache::cache_image`] on the first successful
//!   fetch, via temp file and atomic rename.
//! - **Never refreshed**: an existing file is taken as valid, with no
//!   staleness check.
//! - **Deleted** only by [`ImageCache::delete_images`].
//!
//! Existence of the file is the only state; there is no index or sidecar.
//!
//! ## Concurrency
//!
//! [`ImageCache::cache_images`] runs one task per image. Each task writes a
//! distinct path, so the shared root needs no lock. All tasks run to
//! completion and the first failure is reported afterwards; nothing is
//! rolled back.

mod janitor;
mod writer;

pub use janitor::prune_empty_dirs;

use crate::batch::for_each_image;
use crate::error::{Error, Result};
use crate::reference::ImageReference;
use crate::resolver::ImageResolver;
use crate::sanitize::PathNormalizer;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// On-disk cache of image archives keyed by sanitized reference.
#[derive(Clone)]
pub struct ImageCache {
    root: PathBuf,
    resolver: Arc<ImageResolver>,
    normalizer: PathNormalizer,
    max_parallel: Option<usize>,
}

impl ImageCache {
    /// Creates a cache rooted at `root` using `resolver` for misses.
    pub fn new(root: impl Into<PathBuf>, resolver: Arc<ImageResolver>) -> Self {
        Self {
            root: root.into(),
            resolver,
            normalizer: PathNormalizer::detect(),
            max_parallel: None,
        }
    }

    /// Overrides host path handling.
    pub fn with_normalizer(mut self, normalizer: PathNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Bounds how many images are fetched at once (`None` for unbounded).
    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Returns the cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path normalizer.
    pub fn normalizer(&self) -> &PathNormalizer {
        &self.normalizer
    }

    /// Cache path of `image`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidImageReference`] unless `image` parses as an image
    /// reference that stays under the cache root.
    pub fn entry_path(&self, image: &str) -> Result<PathBuf> {
        ImageReference::parse(image)?;
        self.normalizer.cache_path(&self.root, image)
    }

    /// Returns true if `image` has a cache entry.
    pub fn contains(&self, image: &str) -> bool {
        self.entry_path(image).is_ok_and(|path| path.is_file())
    }

    /// Ensures a cache entry for `image` exists at `dst`.
    ///
    /// Does nothing if a file is already there. Otherwise resolves the
    /// image and writes it atomically.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidImageReference`] for malformed or untaggable references
    /// - [`Error::VolumeResolutionFailed`] if `dst` cannot be translated
    /// - [`Error::ResolutionFailed`] if no source provides the image
    /// - [`Error::CacheWriteFailed`] if the archive cannot be written
    pub async fn cache_image(&self, image: &str, dst: &Path) -> Result<()> {
        let start = Instant::now();
        info!("CacheImage: {} -> {}", image, dst.display());

        let reference = ImageReference::parse(image)?;
        let repo_tag = reference.repo_tag()?;

        match tokio::fs::metadata(dst).await {
            Ok(meta) if meta.is_file() => {
                info!("{} exists", dst.display());
                return Ok(());
            }
            Ok(_) => {
                return Err(Error::CacheWriteFailed {
                    path: dst.to_path_buf(),
                    reason: "path exists and is not a file".to_string(),
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("checking {}: {}", dst.display(), e);
                return Err(Error::CacheWriteFailed {
                    path: dst.to_path_buf(),
                    reason: format!("checking existing entry: {}", e),
                });
            }
        }

        let dst_path = self.normalizer.archive_path(dst)?;
        if let Some(dir) = dst_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::CacheWriteFailed {
                    path: dir.to_path_buf(),
                    reason: format!("making cache image directory: {}", e),
                })?;
        }

        let resolved = self.resolver.resolve(&reference).await?;

        let target = dst_path.clone();
        tokio::task::spawn_blocking(move || writer::write_entry(&resolved, &repo_tag, &target))
            .await
            .map_err(|e| Error::Internal(format!("archive writer: {}", e)))??;

        info!(
            image,
            path = %dst.display(),
            elapsed = ?start.elapsed(),
            "CacheImage completed"
        );
        Ok(())
    }

    /// Caches every image concurrently.
    ///
    /// # Errors
    ///
    /// [`Error::Batch`] carrying the first per-image failure once all
    /// images have been attempted.
    pub async fn cache_images(&self, images: &[String]) -> Result<()> {
        for_each_image("caching images", images, self.max_parallel, |image| {
            let cache = self.clone();
            async move {
                let dst = match cache.entry_path(&image) {
                    Ok(dst) => dst,
                    Err(e) => {
                        error!("CacheImage {} failed: {}", image, e);
                        return Err(Error::Image {
                            operation: "caching image",
                            reference: image,
                            path: cache.root.clone(),
                            source: Box::new(e),
                        });
                    }
                };
                match cache.cache_image(&image, &dst).await {
                    Ok(()) => {
                        info!("CacheImage {} -> {} succeeded", image, dst.display());
                        Ok(())
                    }
                    Err(e) => {
                        error!("CacheImage {} -> {} failed: {}", image, dst.display(), e);
                        Err(Error::Image {
                            operation: "caching image",
                            reference: image,
                            path: dst,
                            source: Box::new(e),
                        })
                    }
                }
            }
        })
        .await?;

        info!("Successfully cached all images.");
        Ok(())
    }

    /// Deletes the entries of `images`, then prunes empty directories.
    ///
    /// Stops at the first missing entry.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidImageReference`] if an image is not a reference;
    ///   nothing is deleted for it
    /// - [`Error::EntryNotFound`] if an image is not cached
    /// - [`Error::WalkFailed`] if pruning cannot traverse the cache
    pub fn delete_images(&self, images: &[String]) -> Result<()> {
        for image in images {
            janitor::remove_entry(&self.entry_path(image)?)?;
        }
        self.prune()
    }

    /// Removes empty directories under the cache root.
    pub fn prune(&self) -> Result<()> {
        let removed = prune_empty_dirs(&self.root)?;
        info!("pruned {} empty directories under {}", removed, self.root.display());
        Ok(())
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("root", &self.root)
            .field("normalizer", &self.normalizer)
            .field("max_parallel", &self.max_parallel)
            .finish()
    }
}
