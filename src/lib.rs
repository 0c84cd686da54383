//! # magikcache
//!
//! **Image Cache-and-Load Pipeline**
//!
//! Fetches container images from the local daemon or a registry, keeps them
//! as docker-archive files in an on-disk cache keyed by image reference, and
//! later copies and imports those archives into a target's container
//! runtime.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           magikcache                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ImageCache::cache_images           ImageLoader::load_images        │
//! │   one task per image                 one task per image             │
//! │   │                                  │                              │
//! │   ├─ PathNormalizer (cache path)     ├─ PathNormalizer (cache path) │
//! │   ├─ ImageResolver                   ├─ CommandRunner::copy         │
//! │   │   daemon → authn → anon          │   (parallel)                 │
//! │   └─ temp file + atomic rename       └─ LoadSerializer              │
//! │                                          └─ ContainerRuntime::load  │
//! │                                             (one at a time)         │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ImageCache::delete_images: remove entries, prune empty directories │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Cache Layout
//!
//! `registry.example.com/team/app:v1.2` is stored at
//! `<cache>/registry.example.com/team/app_v1.2`. Colons are replaced so the
//! path is valid on every host; on drive-letter hosts the `C:` prefix is
//! preserved (see [`sanitize`]).
//!
//! # Failure Model
//!
//! Batches never cancel: every image is attempted, and the first failure
//! observed is returned once all have finished. A batch error does not say
//! how many images failed; inspect the cache or target to find out.
//! Nothing is retried.
//!
//! # Example
//!
//! ```rust,ignore
//! use magikcache::{CacheSettings, LocalRunner, Pipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> magikcache::Result<()> {
//!     let settings = CacheSettings::from_env();
//!     let pipeline = Pipeline::from_settings(&settings, Arc::new(LocalRunner::new()));
//!
//!     let images = vec!["registry.k8s.io/pause:3.9".to_string()];
//!     pipeline.cache_and_load(&images).await
//! }
//! ```

pub mod archive;
mod batch;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod platform;
pub mod reference;
pub mod resolver;
pub mod runtime;
pub mod sanitize;
pub mod transfer;

// Re-exports
pub use cache::{ImageCache, prune_empty_dirs};
pub use config::{
    CacheSettings, ClusterConfig, ConfigLookup, ConfigSource, FileConfigSource,
    KubernetesConfig, StaticConfigSource, lookup_config,
};
pub use error::{Error, Result};
pub use loader::{ImageLoader, LoadSerializer};
pub use pipeline::Pipeline;
pub use platform::{Arch, Os, PathStyle, Platform, VolumeQuery, WmicVolumeQuery};
pub use reference::ImageReference;
pub use resolver::{
    Blob, Credentials, DaemonSource, DockerKeychain, ImageResolver, ImageSource, RegistrySource,
    ResolvedImage, SourceKind,
};
pub use runtime::{ContainerRuntime, RuntimeKind, new_runtime};
pub use sanitize::{PathNormalizer, has_drive_letter};
pub use transfer::{CommandOutput, CommandRunner, FileAsset, LocalRunner};
