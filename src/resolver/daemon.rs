//! Local image daemon source.
//!
//! Exports an image the daemon already holds with `docker image save` and
//! decodes the resulting archive.

use super::{ImageSource, ResolvedImage, SourceKind};
use crate::archive::read_archive;
use crate::error::{Error, Result};
use crate::reference::ImageReference;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Fetches images from the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DaemonSource {
    /// Docker CLI binary.
    binary: String,
}

impl DaemonSource {
    /// Uses the `docker` binary from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Uses a specific Docker-compatible CLI (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn failed(&self, reference: &ImageReference, reason: impl Into<String>) -> Error {
        Error::SourceFailed {
            source_name: self.name().to_string(),
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

impl Default for DaemonSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for DaemonSource {
    fn name(&self) -> &str {
        "daemon"
    }

    async fn fetch(&self, reference: &ImageReference) -> Result<ResolvedImage> {
        debug!("{} image save {}", self.binary, reference);

        let output = Command::new(&self.binary)
            .args(["image", "save", reference.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.failed(reference, e.to_string()))?;

        if !output.status.success() {
            return Err(self.failed(
                reference,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let image = read_archive(output.stdout.as_slice())
            .map_err(|e| self.failed(reference, e.to_string()))?;

        Ok(ResolvedImage {
            reference: reference.to_string(),
            source: SourceKind::Daemon,
            digest: None,
            config: image.config,
            layers: image.layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_a_source_failure() {
        let source = DaemonSource::with_binary("magikcache-no-such-docker");
        let r = ImageReference::parse("repo/x:1").unwrap();

        let err = source.fetch(&r).await.unwrap_err();
        assert!(matches!(err, Error::SourceFailed { ref source_name, .. } if source_name == "daemon"));
    }
}
