//! Remote registry source.
//!
//! Pulls the manifest, resolves multi-platform indexes to the target
//! platform, then downloads the config and every layer into memory.
//!
//! ## Limits
//!
//! - Layer count validated against [`MAX_LAYERS`]
//! - Layer size validated against [`MAX_LAYER_SIZE`] before download
//!
//! No timeout is applied here; the HTTP client's own transport timeouts
//! govern each request.

use super::{Blob, DockerKeychain, ImageSource, ResolvedImage, SourceKind};
use crate::constants::{MAX_LAYER_SIZE, MAX_LAYERS};
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::reference::ImageReference;
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{OciDescriptor, OciImageManifest, OciManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Client;
use tracing::{debug, info};

/// How a [`RegistrySource`] authenticates.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Credentials discovered from the Docker client config.
    Keychain(DockerKeychain),
    /// No credentials.
    Anonymous,
}

/// Fetches images from their registry over HTTPS.
pub struct RegistrySource {
    client: Client,
    credentials: Credentials,
    platform: Platform,
}

impl RegistrySource {
    /// Creates a source for the host's image platform.
    pub fn new(credentials: Credentials) -> Self {
        Self::for_platform(credentials, Platform::detect())
    }

    /// Creates a source that selects `platform` from multi-platform images.
    pub fn for_platform(credentials: Credentials, platform: Platform) -> Self {
        Self {
            client: Client::new(ClientConfig {
                protocol: ClientProtocol::Https,
                ..Default::default()
            }),
            credentials,
            platform,
        }
    }

    fn failed(&self, reference: &ImageReference, reason: impl Into<String>) -> Error {
        Error::SourceFailed {
            source_name: self.name().to_string(),
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    async fn auth(&self, reference: &ImageReference) -> Result<RegistryAuth> {
        match &self.credentials {
            Credentials::Keychain(keychain) => keychain
                .auth_for(reference.registry())
                .await
                .map_err(|e| self.failed(reference, format!("credential lookup: {}", e))),
            Credentials::Anonymous => Ok(RegistryAuth::Anonymous),
        }
    }

    /// Resolves a manifest (handling multi-arch index).
    async fn resolve_manifest(
        &self,
        reference: &ImageReference,
        auth: &RegistryAuth,
        manifest: OciManifest,
    ) -> Result<OciImageManifest> {
        let index = match manifest {
            OciManifest::Image(img) => return Ok(img),
            OciManifest::ImageIndex(index) => index,
        };

        let target_os = self.platform.image_os();
        let target_arch = self.platform.image_arch();

        let matching = index.manifests.iter().find(|m| {
            m.platform
                .as_ref()
                .is_some_and(|p| p.os == target_os && p.architecture == target_arch)
        });

        let manifest_desc = matching.ok_or_else(|| {
            let available: Vec<String> = index
                .manifests
                .iter()
                .filter_map(|m| m.platform.as_ref())
                .map(|p| format!("{}/{}", p.os, p.architecture))
                .collect();
            self.failed(
                reference,
                format!(
                    "no manifest for {}/{}. Available: {}",
                    target_os,
                    target_arch,
                    available.join(", ")
                ),
            )
        })?;

        let platform_ref = reference.with_digest(&manifest_desc.digest);
        let (platform_manifest, _) = self
            .client
            .pull_manifest(&platform_ref, auth)
            .await
            .map_err(|e| self.failed(reference, format!("failed to pull platform manifest: {}", e)))?;

        match platform_manifest {
            OciManifest::Image(img) => Ok(img),
            OciManifest::ImageIndex(_) => {
                Err(self.failed(reference, "nested image index not supported"))
            }
        }
    }

    async fn pull_blob(
        &self,
        reference: &ImageReference,
        descriptor: &OciDescriptor,
    ) -> Result<Blob> {
        let size = descriptor.size.max(0) as u64;
        if size > MAX_LAYER_SIZE as u64 {
            return Err(Error::ImageTooLarge {
                size,
                limit: MAX_LAYER_SIZE as u64,
            });
        }

        debug!("Pulling blob: {} ({} bytes)", descriptor.digest, size);

        let mut data = Vec::with_capacity(size as usize);
        self.client
            .pull_blob(reference.oci(), descriptor, &mut data)
            .await
            .map_err(|e| self.failed(reference, format!("blob {}: {}", descriptor.digest, e)))?;

        Ok(Blob {
            digest: descriptor.digest.clone(),
            media_type: descriptor.media_type.clone(),
            data,
        })
    }
}

#[async_trait]
impl ImageSource for RegistrySource {
    fn name(&self) -> &str {
        match self.credentials {
            Credentials::Keychain(_) => "authn",
            Credentials::Anonymous => "anon",
        }
    }

    async fn fetch(&self, reference: &ImageReference) -> Result<ResolvedImage> {
        info!("Pulling image: {} ({})", reference, self.name());

        let auth = self.auth(reference).await?;

        let (manifest, digest) = self
            .client
            .pull_manifest(reference.oci(), &auth)
            .await
            .map_err(|e| self.failed(reference, e.to_string()))?;

        let manifest = self.resolve_manifest(reference, &auth, manifest).await?;

        if manifest.layers.len() > MAX_LAYERS {
            return Err(self.failed(
                reference,
                format!("too many layers: {} > {}", manifest.layers.len(), MAX_LAYERS),
            ));
        }

        let config = self.pull_blob(reference, &manifest.config).await?;
        let mut layers = Vec::with_capacity(manifest.layers.len());
        for layer in &manifest.layers {
            layers.push(self.pull_blob(reference, layer).await?);
        }

        Ok(ResolvedImage {
            reference: reference.to_string(),
            source: match self.credentials {
                Credentials::Keychain(_) => SourceKind::Registry,
                Credentials::Anonymous => SourceKind::AnonymousRegistry,
            },
            digest: Some(digest),
            config,
            layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_follow_credentials() {
        let anon = RegistrySource::new(Credentials::Anonymous);
        assert_eq!(anon.name(), "anon");

        let authn = RegistrySource::new(Credentials::Keychain(DockerKeychain::new(
            "/nonexistent/config.json",
        )));
        assert_eq!(authn.name(), "authn");
    }
}
