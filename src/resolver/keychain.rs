//! Registry credential discovery from the Docker client config.
//!
//! Looks in `$DOCKER_CONFIG/config.json`, falling back to
//! `~/.docker/config.json`. Credential helpers (`credHelpers`,
//! `credsStore`) take precedence over inline `auths` entries. A registry
//! with no credentials resolves to anonymous access.

use crate::constants::{DEFAULT_REGISTRY, DOCKER_HUB_AUTH_KEY, ENV_DOCKER_CONFIG};
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Docker client config, restricted to the credential fields.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Output of `docker-credential-<helper> get`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperCredentials {
    username: String,
    secret: String,
}

/// Credential lookup backed by the Docker client config.
#[derive(Debug, Clone)]
pub struct DockerKeychain {
    config_path: PathBuf,
}

impl DockerKeychain {
    /// Reads from the config file at `path`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Locates the config through `DOCKER_CONFIG` or the home directory.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(ENV_DOCKER_CONFIG)
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));
        Self::new(dir.join("config.json"))
    }

    /// Path of the config file consulted.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Returns credentials for `registry`, or anonymous access if none
    /// are configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the config exists but cannot be parsed, or if a
    /// configured credential helper fails.
    pub async fn auth_for(&self, registry: &str) -> Result<RegistryAuth> {
        let config = match tokio::fs::read(&self.config_path).await {
            Ok(bytes) => serde_json::from_slice::<DockerConfig>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no docker config at {}", self.config_path.display());
                return Ok(RegistryAuth::Anonymous);
            }
            Err(e) => return Err(e.into()),
        };

        let helper = config
            .cred_helpers
            .get(registry)
            .or(config.creds_store.as_ref());
        if let Some(helper) = helper {
            return run_helper(helper, &server_key(registry)).await;
        }

        let entry = config
            .auths
            .iter()
            .find(|(key, _)| key_matches(key, registry))
            .map(|(_, entry)| entry);

        match entry {
            Some(entry) => decode_entry(entry, registry),
            None => Ok(RegistryAuth::Anonymous),
        }
    }
}

/// Server URL passed to credential helpers.
fn server_key(registry: &str) -> String {
    if is_docker_hub(registry) {
        DOCKER_HUB_AUTH_KEY.to_string()
    } else {
        registry.to_string()
    }
}

fn is_docker_hub(registry: &str) -> bool {
    matches!(
        registry,
        DEFAULT_REGISTRY | "index.docker.io" | "registry-1.docker.io"
    )
}

/// Matches `auths` keys such as `https://ghcr.io/v1/` against a host.
fn key_matches(key: &str, registry: &str) -> bool {
    if is_docker_hub(registry) && key == DOCKER_HUB_AUTH_KEY {
        return true;
    }
    let host = key
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = host.split('/').next().unwrap_or(host);
    host == registry || (is_docker_hub(registry) && is_docker_hub(host))
}

fn decode_entry(entry: &AuthEntry, registry: &str) -> Result<RegistryAuth> {
    if let (Some(user), Some(pass)) = (&entry.username, &entry.password) {
        return Ok(RegistryAuth::Basic(user.clone(), pass.clone()));
    }
    let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) else {
        return Ok(RegistryAuth::Anonymous);
    };
    let decoded = STANDARD
        .decode(auth)
        .map_err(|e| Error::Serialization(format!("auth for {}: {}", registry, e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| Error::Serialization(format!("auth for {}: {}", registry, e)))?;
    let (user, pass) = decoded.split_once(':').ok_or_else(|| {
        Error::Serialization(format!("auth for {}: expected user:password", registry))
    })?;
    Ok(RegistryAuth::Basic(user.to_string(), pass.to_string()))
}

async fn run_helper(helper: &str, server: &str) -> Result<RegistryAuth> {
    let program = format!("docker-credential-{}", helper);
    debug!("{} get {}", program, server);

    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::CommandFailed {
            command: program.clone(),
            reason: e.to_string(),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(server.as_bytes()).await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        // Helpers report unknown servers on stdout.
        if stdout.contains("credentials not found") {
            return Ok(RegistryAuth::Anonymous);
        }
        return Err(Error::CommandFailed {
            command: format!("{} get", program),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let creds: HelperCredentials = serde_json::from_slice(&output.stdout)?;
    Ok(RegistryAuth::Basic(creds.username, creds.secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn keychain(dir: &TempDir, body: &str) -> DockerKeychain {
        let path = dir.path().join("config.json");
        std::fs::write(&path, body).unwrap();
        DockerKeychain::new(path)
    }

    fn basic(auth: RegistryAuth) -> Option<(String, String)> {
        match auth {
            RegistryAuth::Basic(u, p) => Some((u, p)),
            _ => None,
        }
    }

    #[tokio::test]
    async fn missing_config_is_anonymous() {
        let dir = TempDir::new().unwrap();
        let kc = DockerKeychain::new(dir.path().join("config.json"));
        assert!(basic(kc.auth_for("ghcr.io").await.unwrap()).is_none());
    }

    #[tokio::test]
    async fn decodes_inline_auth() {
        let dir = TempDir::new().unwrap();
        let encoded = STANDARD.encode("alice:s3cret");
        let kc = keychain(
            &dir,
            &format!(r#"{{"auths":{{"https://ghcr.io/v1/":{{"auth":"{}"}}}}}}"#, encoded),
        );

        let creds = basic(kc.auth_for("ghcr.io").await.unwrap()).unwrap();
        assert_eq!(creds, ("alice".to_string(), "s3cret".to_string()));
    }

    #[tokio::test]
    async fn docker_hub_key_matches_default_registry() {
        let dir = TempDir::new().unwrap();
        let encoded = STANDARD.encode("bob:pw");
        let kc = keychain(
            &dir,
            &format!(
                r#"{{"auths":{{"https://index.docker.io/v1/":{{"auth":"{}"}}}}}}"#,
                encoded
            ),
        );

        let creds = basic(kc.auth_for("docker.io").await.unwrap()).unwrap();
        assert_eq!(creds.0, "bob");
    }

    #[tokio::test]
    async fn unrelated_registry_is_anonymous() {
        let dir = TempDir::new().unwrap();
        let kc = keychain(&dir, r#"{"auths":{"quay.io":{"auth":"eDp5"}}}"#);
        assert!(basic(kc.auth_for("ghcr.io").await.unwrap()).is_none());
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let kc = keychain(&dir, "not json");
        assert!(kc.auth_for("ghcr.io").await.is_err());
    }
}
