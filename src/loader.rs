//! # Transfer and Load
//!
//! Moves cached archives onto the target and imports them into its
//! container runtime.
//!
//! ```text
//!   image A ── stat ── copy ──┐                ┌── load A ──┐
//!   image B ── stat ── copy ──┼─► LoadSerializer ─┼── load B ──┼─► done
//!   image C ── stat ── copy ──┘   (one at a time) └── load C ──┘
//! ```
//!
//! Copies overlap freely. Imports are heavy on a constrained target, so the
//! [`LoadSerializer`] lets exactly one run at a time while other images keep
//! copying. The serializer belongs to the [`ImageLoader`]; loaders that
//! should contend for the same target share one explicitly.
//!
//! This stage never fetches: an image missing from the cache fails.

use crate::batch::for_each_image;
use crate::config::{ConfigSource, lookup_config};
use crate::constants::{ARCHIVE_FILE_MODE, GUEST_IMAGE_DIR};
use crate::error::{Error, Result};
use crate::reference::ImageReference;
use crate::runtime::{RuntimeKind, new_runtime};
use crate::sanitize::PathNormalizer;
use crate::transfer::{CommandRunner, FileAsset};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Admits one runtime import at a time.
#[derive(Debug, Default)]
pub struct LoadSerializer {
    lock: Mutex<()>,
}

impl LoadSerializer {
    /// Creates an idle serializer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `load` once no other load holds the serializer.
    pub async fn run<F, T>(&self, load: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock.lock().await;
        load.await
    }
}

/// Transfers cached archives to a target and loads them.
#[derive(Clone)]
pub struct ImageLoader {
    cache_root: PathBuf,
    load_root: String,
    runner: Arc<dyn CommandRunner>,
    config: Arc<dyn ConfigSource>,
    serializer: Arc<LoadSerializer>,
    normalizer: PathNormalizer,
    max_parallel: Option<usize>,
}

impl ImageLoader {
    /// Creates a loader reading from `cache_root` and reaching the target
    /// through `runner`.
    pub fn new(
        cache_root: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            cache_root: cache_root.into(),
            load_root: GUEST_IMAGE_DIR.to_string(),
            runner,
            config,
            serializer: Arc::new(LoadSerializer::new()),
            normalizer: PathNormalizer::detect(),
            max_parallel: None,
        }
    }

    /// Shares `serializer` with other loaders targeting the same runtime.
    pub fn with_serializer(mut self, serializer: Arc<LoadSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Sets the target directory receiving archives.
    pub fn with_load_root(mut self, load_root: impl Into<String>) -> Self {
        self.load_root = load_root.into();
        self
    }

    /// Overrides host path handling.
    pub fn with_normalizer(mut self, normalizer: PathNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Bounds how many images are transferred at once.
    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Serializer guarding runtime imports.
    pub fn serializer(&self) -> &Arc<LoadSerializer> {
        &self.serializer
    }

    /// Loads every cached image into the target runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownRuntime`] if the cluster config names an unknown runtime
    /// - [`Error::Batch`] with [`Error::InvalidImageReference`] for an image
    ///   that is not a reference; nothing is transferred for it
    /// - [`Error::Batch`] carrying the first per-image failure once all
    ///   images have been attempted
    pub async fn load_images(&self, images: &[String]) -> Result<()> {
        info!("LoadImages start: {:?}", images);

        let source = self.config.clone();
        let lookup = tokio::task::spawn_blocking(move || lookup_config(source.as_ref()))
            .await
            .map_err(|e| Error::Internal(format!("config lookup: {}", e)))?;
        let kind = lookup.config_or_default().runtime()?;

        let result = for_each_image("loading cached images", images, self.max_parallel, |image| {
            let loader = self.clone();
            async move {
                let src = match loader.entry_path(&image) {
                    Ok(src) => src,
                    Err(e) => {
                        warn!("Failed to load {}: {}", image, e);
                        return Err(Error::Image {
                            operation: "loading image",
                            reference: image,
                            path: loader.cache_root.clone(),
                            source: Box::new(e),
                        });
                    }
                };
                match loader.transfer_and_load(&src, kind).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        warn!("Failed to load {}: {}", src.display(), e);
                        Err(Error::Image {
                            operation: "loading image",
                            reference: image,
                            path: src,
                            source: Box::new(e),
                        })
                    }
                }
            }
        })
        .await;

        info!("LoadImages end");
        result?;
        info!("Successfully loaded all cached images.");
        Ok(())
    }

    /// Cache path of `image`, validated as a reference first.
    fn entry_path(&self, image: &str) -> Result<PathBuf> {
        ImageReference::parse(image)?;
        self.normalizer.cache_path(&self.cache_root, image)
    }

    /// Copies the archive at `src` to the target and imports it.
    ///
    /// # Errors
    ///
    /// - [`Error::EntryNotFound`] if `src` is not cached
    /// - [`Error::TransferFailed`] if the copy fails
    /// - [`Error::LoadFailed`] if the runtime rejects the archive
    pub async fn transfer_and_load(&self, src: &Path, kind: RuntimeKind) -> Result<()> {
        info!("Loading image from cache: {}", src.display());

        let filename = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::EntryNotFound {
                path: src.to_path_buf(),
            })?;

        match tokio::fs::metadata(src).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(Error::EntryNotFound {
                    path: src.to_path_buf(),
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::EntryNotFound {
                    path: src.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let asset = FileAsset::new(src, &self.load_root, filename, ARCHIVE_FILE_MODE);
        let dst = asset.target_path();
        self.runner.copy(&asset).await?;

        let runtime = new_runtime(kind, self.runner.clone());
        self.serializer.run(runtime.load_image(&dst)).await?;

        info!("Successfully loaded image {} from cache", src.display());
        Ok(())
    }
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("cache_root", &self.cache_root)
            .field("load_root", &self.load_root)
            .field("max_parallel", &self.max_parallel)
            .finish()
    }
}
