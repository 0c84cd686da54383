//! Cache-then-load in one call.

use crate::cache::ImageCache;
use crate::config::{CacheSettings, ConfigSource, FileConfigSource};
use crate::error::Result;
use crate::loader::ImageLoader;
use crate::resolver::ImageResolver;
use crate::transfer::CommandRunner;
use std::sync::Arc;

/// An [`ImageCache`] and an [`ImageLoader`] sharing one cache root.
#[derive(Debug, Clone)]
pub struct Pipeline {
    cache: ImageCache,
    loader: ImageLoader,
}

impl Pipeline {
    /// Assembles a pipeline from its parts.
    pub fn new(cache: ImageCache, loader: ImageLoader) -> Self {
        Self { cache, loader }
    }

    /// Builds the default pipeline for `settings`, loading through `runner`
    /// and reading the active cluster profile.
    pub fn from_settings(settings: &CacheSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let config: Arc<dyn ConfigSource> =
            Arc::new(FileConfigSource::new(settings.active_profile_config()));
        Self::with_config(settings, runner, config)
    }

    /// Like [`Pipeline::from_settings`] with an explicit config source.
    pub fn with_config(
        settings: &CacheSettings,
        runner: Arc<dyn CommandRunner>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        let cache = ImageCache::new(&settings.cache_dir, Arc::new(ImageResolver::with_defaults()))
            .with_max_parallel(settings.max_parallel);
        let loader = ImageLoader::new(&settings.cache_dir, runner, config)
            .with_load_root(settings.load_root.clone())
            .with_max_parallel(settings.max_parallel);
        Self { cache, loader }
    }

    /// The cache half.
    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// The load half.
    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    /// Caches `images`, then loads them into the target.
    pub async fn cache_and_load(&self, images: &[String]) -> Result<()> {
        self.cache.cache_images(images).await?;
        self.loader.load_images(images).await
    }
}
