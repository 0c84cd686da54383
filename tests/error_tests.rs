//! Tests for error types.
//!
//! Validates display formatting and cause chains of batch failures.

use magikcache::Error;
use std::error::Error as _;
use std::path::PathBuf;

#[test]
fn test_load_failed_display() {
    let err = Error::LoadFailed {
        runtime: "containerd".to_string(),
        path: "/var/lib/minikube/images/pause_3.1".to_string(),
        reason: "exit status: 1".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "containerd load /var/lib/minikube/images/pause_3.1: exit status: 1"
    );
}

#[test]
fn test_entry_not_found_display() {
    let err = Error::EntryNotFound {
        path: PathBuf::from("/cache/repo/x_1"),
    };
    let msg = err.to_string();
    assert!(msg.contains("/cache/repo/x_1"), "should include path");
    assert!(msg.contains("not found"), "should indicate not found");
}

#[test]
fn test_batch_chain() {
    let cause = Error::EntryNotFound {
        path: PathBuf::from("/cache/repo/x_1"),
    };
    let image = Error::Image {
        operation: "loading image",
        reference: "repo/x:1".to_string(),
        path: PathBuf::from("/cache/repo/x_1"),
        source: Box::new(cause),
    };
    let batch = Error::Batch {
        operation: "loading cached images",
        source: Box::new(image),
    };

    assert_eq!(batch.to_string(), "loading cached images");
    let image = batch.source().expect("batch should carry a source");
    assert_eq!(image.to_string(), "loading image repo/x:1 (/cache/repo/x_1)");
    assert!(matches!(batch.root_cause(), Error::EntryNotFound { .. }));
}

#[test]
fn test_resolution_failed_root_cause() {
    let err = Error::ResolutionFailed {
        reference: "repo/x:1".to_string(),
        last: Box::new(Error::SourceFailed {
            source_name: "anon".to_string(),
            reference: "repo/x:1".to_string(),
            reason: "unauthorized".to_string(),
        }),
    };
    assert!(err.to_string().contains("repo/x:1"));
    assert!(matches!(err.root_cause(), Error::SourceFailed { .. }));
}

#[test]
fn test_io_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: Error = io.into();
    assert!(matches!(err, Error::Io(_)));
}
