//! Command execution and file transfer on the load target.
//!
//! [`CommandRunner`] is the seam to whatever reaches the target (SSH, a VM
//! driver, or the local host). The loader only needs two operations: copy
//! a file into place and run a command.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A local file to be copied onto the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAsset {
    /// Local path of the file.
    pub source: PathBuf,
    /// Directory on the target (always `/`-separated).
    pub target_dir: String,
    /// File name on the target.
    pub target_name: String,
    /// Octal permission string, e.g. `0644`.
    pub permissions: String,
}

impl FileAsset {
    /// Describes a copy of `source` to `<target_dir>/<target_name>`.
    pub fn new(
        source: impl Into<PathBuf>,
        target_dir: impl Into<String>,
        target_name: impl Into<String>,
        permissions: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target_dir: target_dir.into(),
            target_name: target_name.into(),
            permissions: permissions.into(),
        }
    }

    /// Full path on the target.
    pub fn target_path(&self) -> String {
        format!(
            "{}/{}",
            self.target_dir.trim_end_matches('/'),
            self.target_name
        )
    }

    /// Parses [`FileAsset::permissions`] as an octal mode.
    pub fn mode(&self) -> Result<u32> {
        u32::from_str_radix(self.permissions.trim_start_matches("0o"), 8).map_err(|e| {
            Error::TransferFailed {
                path: self.source.clone(),
                destination: self.target_path(),
                reason: format!("invalid permissions '{}': {}", self.permissions, e),
            }
        })
    }
}

/// Captured output of a command run on the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// Executes commands and copies files on the load target.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `argv` on the target.
    ///
    /// Implementations return [`Error::CommandFailed`] for non-zero exits.
    async fn run(&self, argv: &[String]) -> Result<CommandOutput>;

    /// Copies `asset` onto the target.
    ///
    /// On success the file exists at [`FileAsset::target_path`]. On failure
    /// nothing is promised about partial writes.
    async fn copy(&self, asset: &FileAsset) -> Result<()>;
}

/// Runs commands on the local host.
///
/// Target paths are taken relative to `root`, which is `/` by default.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    root: PathBuf,
}

impl LocalRunner {
    /// Runner whose target filesystem is the host's.
    pub fn new() -> Self {
        Self::rooted("/")
    }

    /// Runner whose target paths are resolved under `root`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps a target path onto the host.
    pub fn host_path(&self, target: &str) -> PathBuf {
        self.root.join(target.trim_start_matches('/'))
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| Error::CommandFailed {
            command: String::new(),
            reason: "empty command".to_string(),
        })?;
        let command = argv.join(" ");
        debug!("Run: {}", command);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .check(&command, output.status)?;
        Ok(output)
    }

    async fn copy(&self, asset: &FileAsset) -> Result<()> {
        let failed = |reason: String| Error::TransferFailed {
            path: asset.source.clone(),
            destination: asset.target_path(),
            reason,
        };

        let dir = self.host_path(&asset.target_dir);
        let dst = dir.join(&asset.target_name);
        debug!("copy {} -> {}", asset.source.display(), dst.display());

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| failed(format!("mkdir {}: {}", dir.display(), e)))?;
        tokio::fs::copy(&asset.source, &dst)
            .await
            .map_err(|e| failed(e.to_string()))?;
        set_mode(&dst, asset.mode()?)
            .await
            .map_err(|e| failed(format!("chmod: {}", e)))
    }
}

impl CommandOutput {
    fn check(self, command: &str, status: std::process::ExitStatus) -> Result<Self> {
        if status.success() {
            return Ok(self);
        }
        Err(Error::CommandFailed {
            command: command.to_string(),
            reason: format!("{}: {}", status, self.stderr.trim()),
        })
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
