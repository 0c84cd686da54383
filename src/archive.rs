//! # Docker Archive Encoding
//!
//! Reads and writes single-image docker-archive tarballs, the format
//! accepted by `docker load`, `ctr images import` and `podman load`.
//!
//! ## Layout
//!
//! ```text
//! image.tar
//! ├── sha256:<config-hex>      (image config JSON)
//! ├── <layer-hex>.tar.gz       (one per layer, gzip compressed)
//! └── manifest.json            [{"Config", "RepoTags", "Layers"}]
//! ```
//!
//! Layers that arrive uncompressed (e.g. from `docker image save`) are
//! gzip-compressed on write and renamed after their new digest. Gzip layers
//! are stored verbatim; any other compression (zstd) is rejected.

use crate::constants::{
    ARCHIVE_LAYER_EXT, ARCHIVE_MANIFEST, DOCKER_CONFIG_MEDIA_TYPE, DOCKER_LAYER_MEDIA_TYPE_GZIP,
    DOCKER_LAYER_MEDIA_TYPE_TAR,
};
use crate::error::{Error, Result};
use crate::resolver::Blob;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// One image entry of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    /// Archive path of the config blob.
    pub config: String,
    /// Tags applied when the archive is loaded.
    #[serde(default)]
    pub repo_tags: Vec<String>,
    /// Archive paths of the layers, bottom to top.
    pub layers: Vec<String>,
}

/// Image content decoded from an archive.
#[derive(Debug, Clone)]
pub struct ArchiveImage {
    /// Tags recorded in the manifest.
    pub repo_tags: Vec<String>,
    /// Config blob.
    pub config: Blob,
    /// Layer blobs, bottom to top.
    pub layers: Vec<Blob>,
}

/// Writes a single-image archive tagged `repo_tag` to `out`.
pub fn write_archive<W: Write>(
    repo_tag: &str,
    config: &Blob,
    layers: &[Blob],
    out: W,
) -> Result<()> {
    let mut builder = Builder::new(out);

    let config_name = config.digest.clone();
    append_file(&mut builder, &config_name, &config.data)?;

    let mut layer_names = Vec::with_capacity(layers.len());
    for layer in layers {
        let compressed;
        let blob = if needs_compression(layer)? {
            compressed = compress_layer(layer)?;
            &compressed
        } else {
            layer
        };
        let name = format!("{}.{}", blob.hex(), ARCHIVE_LAYER_EXT);
        debug!("archive layer {} ({} bytes)", name, blob.data.len());
        append_file(&mut builder, &name, &blob.data)?;
        layer_names.push(name);
    }

    let manifest = vec![ManifestEntry {
        config: config_name,
        repo_tags: vec![repo_tag.to_string()],
        layers: layer_names,
    }];
    let manifest = serde_json::to_vec(&manifest)?;
    append_file(&mut builder, ARCHIVE_MANIFEST, &manifest)?;

    builder
        .into_inner()
        .and_then(|mut w| w.flush())
        .map_err(|e| Error::InvalidArchive(format!("finishing archive: {}", e)))
}

/// Returns true for plain tar layers, false for gzip layers.
///
/// Layers in any other compression cannot be re-wrapped without decoding
/// and are rejected.
fn needs_compression(layer: &Blob) -> Result<bool> {
    if layer.is_gzip() {
        return Ok(false);
    }
    if layer.data.starts_with(&ZSTD_MAGIC) {
        return Err(Error::InvalidArchive(format!(
            "layer {} is zstd-compressed",
            layer.digest
        )));
    }
    if let Some((_, suffix)) = layer.media_type.rsplit_once('+') {
        return Err(Error::InvalidArchive(format!(
            "layer {} has unsupported compression {}",
            layer.digest, suffix
        )));
    }
    Ok(true)
}

/// Decodes the first image of a docker-archive tarball.
pub fn read_archive<R: Read>(input: R) -> Result<ArchiveImage> {
    let mut files: HashMap<String, Vec<u8>> = HashMap::new();
    let mut archive = Archive::new(input);

    let entries = archive
        .entries()
        .map_err(|e| Error::InvalidArchive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::InvalidArchive(e.to_string()))?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let name = entry
            .path()
            .map_err(|e| Error::InvalidArchive(e.to_string()))?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| Error::InvalidArchive(format!("reading {}: {}", name, e)))?;
        files.insert(name, data);
    }

    let manifest = files
        .get(ARCHIVE_MANIFEST)
        .ok_or_else(|| Error::InvalidArchive(format!("missing {}", ARCHIVE_MANIFEST)))?;
    let manifest: Vec<ManifestEntry> = serde_json::from_slice(manifest)?;
    let entry = manifest
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidArchive("manifest lists no images".to_string()))?;

    let mut take = |name: &str| {
        files
            .remove(name)
            .ok_or_else(|| Error::InvalidArchive(format!("missing entry {}", name)))
    };

    let config = Blob::new(DOCKER_CONFIG_MEDIA_TYPE, take(&entry.config)?);
    let mut layers = Vec::with_capacity(entry.layers.len());
    for name in &entry.layers {
        let data = take(name)?;
        let media_type = if is_gzip(&data) {
            DOCKER_LAYER_MEDIA_TYPE_GZIP
        } else {
            DOCKER_LAYER_MEDIA_TYPE_TAR
        };
        layers.push(Blob::new(media_type, data));
    }

    Ok(ArchiveImage {
        repo_tags: entry.repo_tags,
        config,
        layers,
    })
}

/// Returns true if `data` starts with the gzip magic bytes.
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&[0x1f, 0x8b])
}

fn compress_layer(layer: &Blob) -> Result<Blob> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&layer.data)
        .and_then(|_| encoder.finish())
        .map(|data| Blob::new(DOCKER_LAYER_MEDIA_TYPE_GZIP, data))
        .map_err(|e| Error::InvalidArchive(format!("compressing layer {}: {}", layer.digest, e)))
}

fn append_file<W: Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| Error::InvalidArchive(format!("writing {}: {}", name, e)))
}
