//! Platform detection and volume lookup.
//!
//! Detects OS and architecture at runtime to decide how cache paths are
//! spelled on the host and which image variant to fetch for the target.
//! On drive-letter hosts, [`VolumeQuery`] turns `C:` into a stable volume
//! identifier.

use crate::error::{Error, Result};
use std::process::Command;
use tracing::debug;

/// Detected platform information.
#[derive(Debug, Clone)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Unknown,
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
    Arm,
    Unknown,
}

/// How the host filesystem spells absolute paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    /// `/` rooted paths; `:` carries no meaning.
    Posix,
    /// `C:\` rooted paths; the drive-letter colon addresses a volume.
    DriveLetter,
}

impl Platform {
    /// Detects the current platform.
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: Self::detect_arch(),
        }
    }

    /// Detects the operating system.
    fn detect_os() -> Os {
        #[cfg(target_os = "linux")]
        return Os::Linux;

        #[cfg(target_os = "macos")]
        return Os::Darwin;

        #[cfg(target_os = "windows")]
        return Os::Windows;

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        return Os::Unknown;
    }

    /// Detects the CPU architecture.
    fn detect_arch() -> Arch {
        #[cfg(target_arch = "x86_64")]
        return Arch::Amd64;

        #[cfg(target_arch = "aarch64")]
        return Arch::Arm64;

        #[cfg(target_arch = "arm")]
        return Arch::Arm;

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm")))]
        return Arch::Unknown;
    }

    /// Returns the path style of the host filesystem.
    pub fn path_style(&self) -> PathStyle {
        match self.os {
            Os::Windows => PathStyle::DriveLetter,
            _ => PathStyle::Posix,
        }
    }

    /// OS name of the image variant to fetch.
    ///
    /// Targets always run Linux, so non-Linux hosts still fetch Linux images.
    pub fn image_os(&self) -> &'static str {
        "linux"
    }

    /// Architecture name of the image variant to fetch.
    pub fn image_arch(&self) -> &'static str {
        match self.arch {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::Arm => "arm",
            Arch::Unknown => "amd64",
        }
    }

    /// Returns the OCI platform string of the image variant (e.g., "linux/amd64").
    pub fn oci_platform(&self) -> String {
        format!("{}/{}", self.image_os(), self.image_arch())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}", self.os, self.arch)
    }
}

// =============================================================================
// Volume Lookup
// =============================================================================

/// Resolves a drive letter to a stable volume identifier.
///
/// Implementations return identifiers of the form `\\?\Volume{GUID}\`.
pub trait VolumeQuery: Send + Sync {
    /// Looks up the volume behind `drive` (a single ASCII letter).
    fn volume_id(&self, drive: char) -> Result<String>;
}

/// Queries volumes through `wmic volume ... get DeviceID`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WmicVolumeQuery;

impl VolumeQuery for WmicVolumeQuery {
    fn volume_id(&self, drive: char) -> Result<String> {
        let filter = format!("DriveLetter = '{}:'", drive);
        debug!("wmic volume where \"{}\" get DeviceID", filter);

        let output = Command::new("wmic")
            .args(["volume", "where", &filter, "get", "DeviceID"])
            .output()
            .map_err(|e| Error::VolumeResolutionFailed {
                drive,
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::VolumeResolutionFailed {
                drive,
                reason: format!(
                    "wmic exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        parse_volume_id(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            Error::VolumeResolutionFailed {
                drive,
                reason: "failed to get a volume GUID".to_string(),
            }
        })
    }
}

/// Extracts the first `\\?\Volume{...}\` line from `wmic` output.
pub fn parse_volume_id(output: &str) -> Option<String> {
    output
        .lines()
        .map(|l| l.trim_matches(|c: char| c.is_whitespace() || c == '\r'))
        .find(|l| l.starts_with(r"\\?\Volume{") && l.ends_with(r"}\"))
        .map(str::to_string)
}
