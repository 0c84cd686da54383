//! Container runtimes on the load target.
//!
//! Each runtime imports an archive already present on the target by
//! running its CLI through a [`CommandRunner`]:
//!
//! | Runtime    | Command                                   |
//! |------------|-------------------------------------------|
//! | docker     | `docker load -i <path>`                   |
//! | containerd | `sudo ctr -n=k8s.io images import <path>` |
//! | cri-o      | `sudo podman load -i <path>`              |

use crate::error::{Error, Result};
use crate::transfer::CommandRunner;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Selects a container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuntimeKind {
    /// Docker engine.
    #[default]
    Docker,
    /// containerd, images in the `k8s.io` namespace.
    Containerd,
    /// CRI-O, images managed through podman.
    CriO,
}

impl RuntimeKind {
    /// Canonical selector string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Containerd => "containerd",
            Self::CriO => "crio",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = Error;

    /// Parses a selector; the empty string means Docker.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "docker" => Ok(Self::Docker),
            "containerd" => Ok(Self::Containerd),
            "crio" | "cri-o" => Ok(Self::CriO),
            other => Err(Error::UnknownRuntime(other.to_string())),
        }
    }
}

/// A container runtime that can import image archives.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime identifier for logs.
    fn name(&self) -> &str;

    /// Imports the archive at `path` on the target.
    async fn load_image(&self, path: &str) -> Result<()>;
}

/// Constructs the runtime selected by `kind` on top of `runner`.
pub fn new_runtime(
    kind: RuntimeKind,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn ContainerRuntime> {
    match kind {
        RuntimeKind::Docker => Arc::new(Docker { runner }),
        RuntimeKind::Containerd => Arc::new(Containerd { runner }),
        RuntimeKind::CriO => Arc::new(CriO { runner }),
    }
}

/// Runs `argv` and maps failures to [`Error::LoadFailed`].
async fn import(
    runtime: &str,
    runner: &dyn CommandRunner,
    path: &str,
    argv: &[&str],
) -> Result<()> {
    info!("Loading image: {}", path);
    let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
    runner
        .run(&argv)
        .await
        .map(|_| ())
        .map_err(|e| Error::LoadFailed {
            runtime: runtime.to_string(),
            path: path.to_string(),
            reason: e.to_string(),
        })
}

/// Docker engine runtime.
pub struct Docker {
    runner: Arc<dyn CommandRunner>,
}

#[async_trait]
impl ContainerRuntime for Docker {
    fn name(&self) -> &str {
        "Docker"
    }

    async fn load_image(&self, path: &str) -> Result<()> {
        import(self.name(), self.runner.as_ref(), path, &["docker", "load", "-i", path]).await
    }
}

/// containerd runtime.
pub struct Containerd {
    runner: Arc<dyn CommandRunner>,
}

#[async_trait]
impl ContainerRuntime for Containerd {
    fn name(&self) -> &str {
        "containerd"
    }

    async fn load_image(&self, path: &str) -> Result<()> {
        import(
            self.name(),
            self.runner.as_ref(),
            path,
            &["sudo", "ctr", "-n=k8s.io", "images", "import", path],
        )
        .await
    }
}

/// CRI-O runtime.
pub struct CriO {
    runner: Arc<dyn CommandRunner>,
}

#[async_trait]
impl ContainerRuntime for CriO {
    fn name(&self) -> &str {
        "CRI-O"
    }

    async fn load_image(&self, path: &str) -> Result<()> {
        import(
            self.name(),
            self.runner.as_ref(),
            path,
            &["sudo", "podman", "load", "-i", path],
        )
        .await
    }
}
