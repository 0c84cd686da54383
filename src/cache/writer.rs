//! Atomic cache entry writes.
//!
//! An archive is written to `<name>.<uuid>.tmp` beside its destination and
//! renamed into place, so the destination path only ever shows a complete
//! archive. The temp file is removed when any step fails.

use crate::archive::write_archive;
use crate::constants::TEMP_SUFFIX;
use crate::error::{Error, Result};
use crate::resolver::ResolvedImage;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes `image` as an archive at `dst`, replacing nothing until the
/// final rename.
pub(crate) fn write_entry(image: &ResolvedImage, repo_tag: &str, dst: &Path) -> Result<()> {
    let temp = temp_path(dst);
    debug!("OPENING: {}", temp.display());

    let result = write_temp(image, repo_tag, &temp).and_then(|()| {
        fs::rename(&temp, dst).map_err(|e| Error::CacheWriteFailed {
            path: dst.to_path_buf(),
            reason: format!("rename {}: {}", temp.display(), e),
        })
    });

    if result.is_err()
        && let Err(e) = fs::remove_file(&temp)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("failed to remove {}: {}", temp.display(), e);
    }

    result
}

fn write_temp(image: &ResolvedImage, repo_tag: &str, temp: &Path) -> Result<()> {
    let failed = |reason: String| Error::CacheWriteFailed {
        path: temp.to_path_buf(),
        reason,
    };

    let file = File::create(temp).map_err(|e| failed(format!("create: {}", e)))?;
    let mut out = BufWriter::new(file);
    write_archive(repo_tag, &image.config, &image.layers, &mut out)?;
    out.flush().map_err(|e| failed(format!("flush: {}", e)))?;

    let file = out
        .into_inner()
        .map_err(|e| failed(format!("flush: {}", e.error())))?;
    file.sync_all().map_err(|e| failed(format!("sync: {}", e)))
}

/// Temp path in the same directory as `dst`, unique per write.
fn temp_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!("{}.{}.{}", name, uuid::Uuid::now_v7(), TEMP_SUFFIX))
}
