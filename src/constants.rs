//! # Pipeline Constants
//!
//! Names, limits and defaults for the image cache-and-load pipeline. These
//! constants are the **single source of truth** for values shared between
//! the cache, the registry sources, and the loader.
//!
//! ## Cross-References
//!
//! - [`crate::sanitize`]: Uses the replacement character for cache paths
//! - [`crate::resolver`]: Uses reference validation and layer limits
//! - [`crate::archive`]: Uses media types and archive entry names
//! - [`crate::loader`]: Uses the guest load root and file mode

// =============================================================================
// Directory Layout
// =============================================================================

/// Name of the per-user state directory under `$HOME`.
pub const MAGIK_DIR: &str = ".magik";

/// Cache directory, relative to the state directory.
///
/// Entries live at `<cache>/<sanitized-reference>`, for example
/// `k8s.gcr.io/kube-addon-manager:v6.5` is stored at
/// `<cache>/k8s.gcr.io/kube-addon-manager_v6.5`.
pub const IMAGE_CACHE_DIR: &str = "cache/images";

/// Directory on the target where archives are copied before loading.
pub const GUEST_IMAGE_DIR: &str = "/var/lib/minikube/images";

/// Permissions applied to archives copied onto the target.
pub const ARCHIVE_FILE_MODE: &str = "0644";

/// Cluster profile config file name.
pub const PROFILE_CONFIG_FILE: &str = "config.json";

/// Directory holding cluster profiles, relative to the state directory.
pub const PROFILES_DIR: &str = "profiles";

/// Profile used when none is selected.
pub const DEFAULT_PROFILE: &str = "minikube";

/// Suffix of in-progress archive writes.
pub const TEMP_SUFFIX: &str = "tmp";

// =============================================================================
// Environment Variables
// =============================================================================

/// Overrides the state directory.
pub const ENV_HOME: &str = "MAGIK_HOME";

/// Overrides the cache directory.
pub const ENV_CACHE_DIR: &str = "MAGIK_CACHE_DIR";

/// Selects the active cluster profile.
pub const ENV_PROFILE: &str = "MAGIK_PROFILE";

/// Directory of the Docker client configuration.
pub const ENV_DOCKER_CONFIG: &str = "DOCKER_CONFIG";

// =============================================================================
// Reference Validation
// =============================================================================

/// Maximum image reference length in bytes.
///
/// **Security**: Registry implementations may have lower limits; this bound
/// keeps pathological references away from the parser and the filesystem.
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Characters allowed in an image reference.
pub const IMAGE_REF_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789/:.-_@";

/// Tag assumed when a reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Registry assumed when a reference carries none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Key used by the Docker client config for Docker Hub credentials.
pub const DOCKER_HUB_AUTH_KEY: &str = "https://index.docker.io/v1/";

// =============================================================================
// Registry Limits
// =============================================================================

/// Maximum number of layers in an image.
pub const MAX_LAYERS: usize = 128;

/// Maximum size of a single compressed layer (512 MiB).
///
/// **Security**: Layers are held in memory until the archive is written.
pub const MAX_LAYER_SIZE: usize = 512 * 1024 * 1024;

// =============================================================================
// Media Types
// =============================================================================

/// OCI uncompressed layer media type.
pub const OCI_LAYER_MEDIA_TYPE_TAR: &str = "application/vnd.oci.image.layer.v1.tar";

/// Docker gzip layer media type.
pub const DOCKER_LAYER_MEDIA_TYPE_GZIP: &str =
    "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Docker uncompressed layer media type.
pub const DOCKER_LAYER_MEDIA_TYPE_TAR: &str = "application/vnd.docker.image.rootfs.diff.tar";

/// Docker image config media type.
pub const DOCKER_CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";

// =============================================================================
// Archive Layout
// =============================================================================

/// Manifest entry inside a docker-archive tarball.
pub const ARCHIVE_MANIFEST: &str = "manifest.json";

/// Extension of compressed layers inside a docker-archive tarball.
pub const ARCHIVE_LAYER_EXT: &str = "tar.gz";
