//! Tests for cache path sanitization.

use magikcache::{Error, PathNormalizer, Result, VolumeQuery, has_drive_letter};
use proptest::prelude::*;
use std::path::Path;
use std::sync::Arc;

struct StubVolumes;

impl VolumeQuery for StubVolumes {
    fn volume_id(&self, drive: char) -> Result<String> {
        match drive {
            'C' | 'c' => Ok("\\\\?\\Volume{4c1b02c1-d990-11dc-99ae-806e6f6e6963}\\".to_string()),
            _ => Err(Error::VolumeResolutionFailed {
                drive,
                reason: "no such volume".to_string(),
            }),
        }
    }
}

fn drive_letter() -> PathNormalizer {
    PathNormalizer::DriveLetter(Arc::new(StubVolumes))
}

#[test]
fn test_posix_cache_path() {
    let path = PathNormalizer::Posix.cache_path(
        Path::new("/home/u/.magik/cache/images"),
        "registry.example.com/team/app:v1.2",
    )
    .unwrap();
    assert_eq!(
        path,
        Path::new("/home/u/.magik/cache/images/registry.example.com/team/app_v1.2")
    );
}

#[test]
fn test_registry_port_is_sanitized() {
    let path = PathNormalizer::Posix.cache_path(Path::new("/cache"), "localhost:5000/app:1")
        .unwrap();
    assert_eq!(path, Path::new("/cache/localhost_5000/app_1"));
}

#[test]
fn test_drive_letter_colon_is_kept() {
    let n = drive_letter();
    assert_eq!(
        n.sanitize(r"C:\Users\me\.magik\cache\k8s.gcr.io\pause:3.1"),
        r"C:\Users\me\.magik\cache\k8s.gcr.io\pause_3.1"
    );
    assert_eq!(n.sanitize("pause:3.1"), "pause_3.1");
}

#[test]
fn test_archive_path_replaces_drive() {
    let n = drive_letter();
    let path = n
        .archive_path(Path::new(r"C:\Users\me\cache\pause_3.1"))
        .unwrap();
    assert_eq!(
        path.to_string_lossy(),
        r"\\?\Volume{4c1b02c1-d990-11dc-99ae-806e6f6e6963}\Users\me\cache\pause_3.1"
    );
}

#[test]
fn test_archive_path_unknown_volume_fails() {
    let err = drive_letter()
        .archive_path(Path::new(r"Z:\cache\pause_3.1"))
        .unwrap_err();
    assert!(matches!(err, Error::VolumeResolutionFailed { drive: 'Z', .. }));
}

#[test]
fn test_posix_archive_path_is_unchanged() {
    let p = Path::new("/cache/pause_3.1");
    assert_eq!(PathNormalizer::Posix.archive_path(p).unwrap(), p);
}

#[test]
fn test_cache_path_rejects_escapes() {
    let root = Path::new("/cache");
    for bad in ["/etc/shadow", "../up:1", "a/../../b", "a/./b", r"\\host\share", ""] {
        assert!(
            matches!(
                PathNormalizer::Posix.cache_path(root, bad),
                Err(Error::InvalidImageReference { .. })
            ),
            "{:?} should be rejected",
            bad
        );
    }
    assert!(drive_letter().cache_path(Path::new(r"C:\cache"), r"D:\x").is_err());
}

#[test]
fn test_has_drive_letter() {
    assert!(has_drive_letter(r"C:\x"));
    assert!(has_drive_letter("d:/x"));
    assert!(!has_drive_letter("C:"));
    assert!(!has_drive_letter("/c:/x"));
    assert!(!has_drive_letter("ab:/x"));
}

proptest! {
    #[test]
    fn posix_output_has_no_colon(
        image in "[a-z0-9][a-z0-9._:-]{0,10}(/[a-z0-9][a-z0-9._:-]{0,10}){0,3}",
    ) {
        let path = PathNormalizer::Posix.cache_path(Path::new("/cache"), &image).unwrap();
        prop_assert!(!path.to_string_lossy().contains(':'));
        prop_assert!(path.starts_with("/cache"));
    }

    #[test]
    fn parent_segments_never_yield_a_path(
        head in "([a-z]{1,6}/){0,2}",
        tail in "(/[a-z]{1,6}){0,2}",
    ) {
        let image = format!("{}..{}", head, tail);
        prop_assert!(PathNormalizer::Posix.cache_path(Path::new("/cache"), &image).is_err());
    }

    #[test]
    fn drive_letter_keeps_only_the_drive_colon(rest in "[a-z0-9/:_.-]{0,40}") {
        let input = format!(r"C:\{}", rest);
        let out = drive_letter().sanitize(&input);
        prop_assert!(out.starts_with(r"C:\"));
        prop_assert!(!out[2..].contains(':'));
    }

    #[test]
    fn tags_map_to_distinct_paths(
        repo in "[a-z]{1,8}/[a-z]{1,8}",
        a in "[a-z0-9.]{1,8}",
        b in "[a-z0-9.]{1,8}",
    ) {
        prop_assume!(a != b);
        let n = PathNormalizer::Posix;
        let root = Path::new("/cache");
        prop_assert_ne!(
            n.cache_path(root, &format!("{}:{}", repo, a)).unwrap(),
            n.cache_path(root, &format!("{}:{}", repo, b)).unwrap()
        );
    }
}
