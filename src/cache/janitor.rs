//! Cache entry removal and empty directory pruning.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Removes the cache entry at `path`.
///
/// # Errors
///
/// [`Error::EntryNotFound`] if nothing is cached there.
pub(crate) fn remove_entry(path: &Path) -> Result<()> {
    info!("Deleting image in cache at {}", path.display());
    fs::remove_file(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::EntryNotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })
}

/// Removes every empty directory below `root`, deepest first.
///
/// `root` itself is kept. Directories that vanish during the walk count as
/// removed. Returns how many directories were deleted.
pub fn prune_empty_dirs(root: &Path) -> Result<usize> {
    let mut removed = 0;

    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_not_found(e.io_error()) => continue,
            Err(e) => {
                return Err(Error::WalkFailed {
                    path: e.path().unwrap_or(root).to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let empty = match fs::read_dir(path) {
            Ok(mut children) => children.next().is_none(),
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(Error::WalkFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        if empty {
            match fs::remove_dir(path) {
                Ok(()) => {
                    debug!("pruned empty cache directory {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::WalkFailed {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    Ok(removed)
}

fn is_not_found(e: Option<&std::io::Error>) -> bool {
    e.is_some_and(|e| e.kind() == ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prunes_nested_empty_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d/e_1"), b"x").unwrap();

        let removed = prune_empty_dirs(dir.path()).unwrap();

        assert_eq!(removed, 3);
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("d/e_1").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn missing_root_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert_eq!(prune_empty_dirs(&dir.path().join("gone")).unwrap(), 0);
    }

    #[test]
    fn removing_absent_entry_fails() {
        let dir = TempDir::new().unwrap();
        let err = remove_entry(&dir.path().join("nope_1")).unwrap_err();
        assert!(matches!(err, Error::EntryNotFound { .. }));
    }
}
