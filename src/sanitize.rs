//! # Cache Path Sanitization
//!
//! Maps image references to filesystem-safe cache paths.
//!
//! ## Layout
//!
//! ```text
//! registry.example.com/team/app:v1.2
//!   → <cache>/registry.example.com/team/app_v1.2
//! ```
//!
//! Repository components become nested directories and the tag becomes a
//! suffix separated by `_`.
//!
//! ## Drive Letters
//!
//! On drive-letter hosts the leading `C:` must survive sanitization so the
//! path still addresses a volume, while every later colon is replaced.
//! Reference parsers reject colons anywhere, so [`PathNormalizer::archive_path`]
//! additionally rewrites `C:\` into the volume identifier reported by
//! [`VolumeQuery`] before a destination is used.

use crate::error::{Error, Result};
use crate::platform::{PathStyle, Platform, VolumeQuery, WmicVolumeQuery};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Character substituted for `:` in cache paths.
pub const COLON_REPLACEMENT: &str = "_";

/// Host-specific path handling, selected once at startup.
#[derive(Clone)]
pub enum PathNormalizer {
    /// Every colon is replaced; no volume translation.
    Posix,
    /// Drive-letter colon kept; destinations translated to volume paths.
    DriveLetter(Arc<dyn VolumeQuery>),
}

impl std::fmt::Debug for PathNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Posix => write!(f, "Posix"),
            Self::DriveLetter(_) => write!(f, "DriveLetter"),
        }
    }
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self::detect()
    }
}

impl PathNormalizer {
    /// Selects the normalizer for the host platform.
    pub fn detect() -> Self {
        match Platform::detect().path_style() {
            PathStyle::Posix => Self::Posix,
            PathStyle::DriveLetter => Self::DriveLetter(Arc::new(WmicVolumeQuery)),
        }
    }

    /// Replaces colons in `path`, keeping a leading drive-letter colon on
    /// drive-letter hosts.
    pub fn sanitize(&self, path: &str) -> String {
        match self {
            Self::DriveLetter(_) if has_drive_letter(path) => {
                let s = format!("{}{}", &path[..2], path[2..].replace(':', COLON_REPLACEMENT));
                info!("windows sanitize: {} -> {}", path, s);
                s
            }
            _ => path.replace(':', COLON_REPLACEMENT),
        }
    }

    /// Computes the cache path of `image` under `root`.
    ///
    /// The result always lies below `root`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidImageReference`] if `image` is absolute, carries a
    /// drive prefix, or contains `.`/`..` segments.
    pub fn cache_path(&self, root: &Path, image: &str) -> Result<PathBuf> {
        self.check_relative(image)?;
        let joined = root.join(image);
        Ok(PathBuf::from(self.sanitize(&joined.to_string_lossy())))
    }

    /// Rejects references that `Path::join` would not nest under a root.
    fn check_relative(&self, image: &str) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::InvalidImageReference {
                reference: image.to_string(),
                reason: reason.to_string(),
            })
        };

        if image.is_empty() {
            return invalid("empty image reference");
        }
        if image.starts_with('/') || image.starts_with('\\') {
            return invalid("absolute path");
        }
        let b = image.as_bytes();
        if matches!(self, Self::DriveLetter(_))
            && b.len() >= 2
            && b[0].is_ascii_alphabetic()
            && b[1] == b':'
        {
            return invalid("drive prefix");
        }
        if image.split(['/', '\\']).any(|seg| seg == "." || seg == "..") {
            return invalid("relative path segment");
        }
        for component in Path::new(image).components() {
            if !matches!(component, Component::Normal(_)) {
                return invalid("path escapes the cache root");
            }
        }
        Ok(())
    }

    /// Translates a sanitized destination into a path free of colons.
    ///
    /// Posix paths are returned unchanged. Drive-letter paths have their
    /// `C:\` prefix replaced by the volume identifier.
    ///
    /// # Errors
    ///
    /// [`Error::VolumeResolutionFailed`] if the volume cannot be looked up.
    pub fn archive_path(&self, dst: &Path) -> Result<PathBuf> {
        let s = dst.to_string_lossy();
        match self {
            Self::DriveLetter(volumes) if has_drive_letter(&s) => {
                let translated = replace_drive_letter(&s, volumes.as_ref())?;
                debug!("volume path: {} -> {}", s, translated);
                Ok(PathBuf::from(translated))
            }
            _ => Ok(dst.to_path_buf()),
        }
    }
}

/// Returns true if `s` starts with a drive letter such as `C:\` or `c:/`.
pub fn has_drive_letter(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && (b[2] == b'\\' || b[2] == b'/')
}

/// Replaces the drive-letter prefix of `s` with its volume identifier.
///
/// `s` must satisfy [`has_drive_letter`].
fn replace_drive_letter(s: &str, volumes: &dyn VolumeQuery) -> Result<String> {
    let drive = char::from(s.as_bytes()[0]);
    let volume = volumes.volume_id(drive)?;
    Ok(format!("{}{}", volume, &s[3..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedVolume(&'static str);

    impl VolumeQuery for FixedVolume {
        fn volume_id(&self, _drive: char) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct NoVolume;

    impl VolumeQuery for NoVolume {
        fn volume_id(&self, drive: char) -> Result<String> {
            Err(Error::VolumeResolutionFailed {
                drive,
                reason: "failed to get a volume GUID".to_string(),
            })
        }
    }

    fn drive_letter() -> PathNormalizer {
        PathNormalizer::DriveLetter(Arc::new(FixedVolume(r"\\?\Volume{abc}\")))
    }

    #[test]
    fn posix_replaces_every_colon() {
        let n = PathNormalizer::Posix;
        assert_eq!(
            n.sanitize("/cache/registry.example.com:5000/team/app:v1.2"),
            "/cache/registry.example.com_5000/team/app_v1.2"
        );
    }

    #[test]
    fn posix_ignores_drive_letters() {
        let n = PathNormalizer::Posix;
        assert_eq!(n.sanitize(r"C:\cache\app:v1"), r"C_\cache\app_v1");
    }

    #[test]
    fn drive_letter_keeps_first_colon() {
        let n = drive_letter();
        assert_eq!(n.sanitize(r"C:\cache\app:v1"), r"C:\cache\app_v1");
        assert_eq!(n.sanitize("d:/cache/a:b:c"), "d:/cache/a_b_c");
    }

    #[test]
    fn drive_letter_without_prefix_replaces_all() {
        let n = drive_letter();
        assert_eq!(n.sanitize("cache/app:v1"), "cache/app_v1");
    }

    #[test]
    fn has_drive_letter_detection() {
        assert!(has_drive_letter(r"C:\Users"));
        assert!(has_drive_letter("z:/tmp"));
        assert!(!has_drive_letter("C:"));
        assert!(!has_drive_letter("C:x"));
        assert!(!has_drive_letter("/tmp/C:/x"));
        assert!(!has_drive_letter("1:/x"));
    }

    #[test]
    fn cache_path_layout() {
        let n = PathNormalizer::Posix;
        let p = n
            .cache_path(Path::new("/cache"), "registry.example.com/team/app:v1.2")
            .unwrap();
        assert_eq!(p, PathBuf::from("/cache/registry.example.com/team/app_v1.2"));
    }

    #[test]
    fn cache_path_stays_under_root() {
        let root = Path::new("/cache");
        for image in ["/etc/shadow", "../sibling:1", "repo/../../x", "./x", "\\\\host\\share", ""] {
            assert!(
                matches!(
                    PathNormalizer::Posix.cache_path(root, image),
                    Err(Error::InvalidImageReference { .. })
                ),
                "{:?} should be rejected",
                image
            );
        }
        assert!(
            drive_letter()
                .cache_path(Path::new(r"C:\cache"), r"D:\x")
                .is_err()
        );
        assert!(PathNormalizer::Posix.cache_path(root, "a:1").is_ok());
    }

    #[test]
    fn archive_path_posix_is_identity() {
        let n = PathNormalizer::Posix;
        let p = Path::new("/cache/app_v1");
        assert_eq!(n.archive_path(p).unwrap(), p);
    }

    #[test]
    fn archive_path_substitutes_volume() {
        let n = drive_letter();
        let p = n.archive_path(Path::new(r"C:\cache\app_v1")).unwrap();
        assert_eq!(p, PathBuf::from(r"\\?\Volume{abc}\cache\app_v1"));
    }

    #[test]
    fn archive_path_reports_volume_failure() {
        let n = PathNormalizer::DriveLetter(Arc::new(NoVolume));
        let err = n.archive_path(Path::new(r"C:\cache\app_v1")).unwrap_err();
        assert!(matches!(err, Error::VolumeResolutionFailed { drive: 'C', .. }));
    }
}
