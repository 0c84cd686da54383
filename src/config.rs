//! Pipeline settings and cluster configuration.
//!
//! [`CacheSettings`] locates the cache and the target load directory.
//! [`ClusterConfig`] is the profile file that selects the container
//! runtime. It is optional: a missing profile means defaults.

use crate::constants::{
    DEFAULT_PROFILE, ENV_CACHE_DIR, ENV_HOME, ENV_PROFILE, GUEST_IMAGE_DIR, IMAGE_CACHE_DIR,
    MAGIK_DIR, PROFILE_CONFIG_FILE, PROFILES_DIR,
};
use crate::error::{Error, Result};
use crate::runtime::RuntimeKind;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// =============================================================================
// Settings
// =============================================================================

/// Where the pipeline keeps and sends archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// State directory (`~/.magik` unless overridden).
    pub home: PathBuf,
    /// Cache root on the host.
    pub cache_dir: PathBuf,
    /// Directory on the target receiving archives.
    pub load_root: String,
    /// Maximum concurrent images per batch; `None` is unbounded.
    pub max_parallel: Option<usize>,
}

impl CacheSettings {
    /// Settings rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            cache_dir: home.join(IMAGE_CACHE_DIR),
            home,
            load_root: GUEST_IMAGE_DIR.to_string(),
            max_parallel: None,
        }
    }

    /// Settings from `MAGIK_HOME` / `MAGIK_CACHE_DIR`, falling back to
    /// `~/.magik`.
    pub fn from_env() -> Self {
        let home = std::env::var_os(ENV_HOME)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_home);
        let mut settings = Self::with_home(home);
        if let Some(dir) = std::env::var_os(ENV_CACHE_DIR) {
            settings.cache_dir = PathBuf::from(dir);
        }
        settings
    }

    /// Returns the default state directory.
    fn default_home() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(MAGIK_DIR)
        } else {
            PathBuf::from(MAGIK_DIR)
        }
    }

    /// Profile config path for `profile`.
    pub fn profile_config(&self, profile: &str) -> PathBuf {
        self.home
            .join(PROFILES_DIR)
            .join(profile)
            .join(PROFILE_CONFIG_FILE)
    }

    /// Profile config path for the profile named by `MAGIK_PROFILE`.
    pub fn active_profile_config(&self) -> PathBuf {
        let profile = std::env::var(ENV_PROFILE).unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
        self.profile_config(&profile)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

// =============================================================================
// Cluster Configuration
// =============================================================================

/// Cluster profile, restricted to what the loader consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterConfig {
    /// Profile name.
    #[serde(default)]
    pub name: String,
    /// Kubernetes settings.
    #[serde(default)]
    pub kubernetes_config: KubernetesConfig,
}

/// Kubernetes settings of a cluster profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KubernetesConfig {
    /// Runtime selector (`docker`, `containerd`, `crio`); empty means docker.
    #[serde(default)]
    pub container_runtime: String,
}

impl ClusterConfig {
    /// Runtime selected by this profile.
    pub fn runtime(&self) -> Result<RuntimeKind> {
        self.kubernetes_config.container_runtime.parse()
    }
}

/// Provides the cluster configuration.
///
/// `load` may block; async callers run it on the blocking pool.
pub trait ConfigSource: Send + Sync {
    /// Loads the configuration.
    ///
    /// Returns [`Error::ConfigNotFound`] when there is none, and any other
    /// error when it exists but cannot be used.
    fn load(&self) -> Result<ClusterConfig>;
}

/// Reads a JSON profile from disk.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Reads from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path consulted.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<ClusterConfig> {
        let bytes = std::fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::ConfigNotFound {
                path: self.path.clone(),
            },
            _ => Error::ConfigInvalid {
                path: self.path.clone(),
                reason: e.to_string(),
            },
        })?;
        serde_json::from_slice(&bytes).map_err(|e| Error::ConfigInvalid {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

/// A fixed configuration, e.g. from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource(pub ClusterConfig);

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<ClusterConfig> {
        Ok(self.0.clone())
    }
}

/// Outcome of a best-effort configuration lookup.
#[derive(Debug)]
pub enum ConfigLookup {
    /// Configuration loaded.
    Found(ClusterConfig),
    /// No configuration exists; defaults apply.
    NotFound,
    /// Configuration exists but is unusable; defaults apply.
    Invalid(Error),
}

impl ConfigLookup {
    /// Configuration to proceed with.
    pub fn config_or_default(&self) -> ClusterConfig {
        match self {
            Self::Found(config) => config.clone(),
            Self::NotFound | Self::Invalid(_) => ClusterConfig::default(),
        }
    }
}

/// Loads configuration without failing: not-found is expected and logged
/// at info, anything else is logged as a warning.
pub fn lookup_config(source: &dyn ConfigSource) -> ConfigLookup {
    match source.load() {
        Ok(config) => ConfigLookup::Found(config),
        Err(Error::ConfigNotFound { path }) => {
            info!("no cluster config at {}; using defaults", path.display());
            ConfigLookup::NotFound
        }
        Err(e) => {
            warn!("Error loading profile config: {}", e);
            ConfigLookup::Invalid(e)
        }
    }
}
