//! Stub sources and runners shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use magikcache::constants::{DOCKER_CONFIG_MEDIA_TYPE, OCI_LAYER_MEDIA_TYPE_TAR};
use magikcache::{
    Blob, CommandOutput, CommandRunner, Error, FileAsset, ImageReference, ImageResolver,
    ImageSource, ResolvedImage, Result, SourceKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A small image whose single layer names `reference`.
pub fn sample_image(reference: &str, source: SourceKind) -> ResolvedImage {
    let config = Blob::new(
        DOCKER_CONFIG_MEDIA_TYPE,
        br#"{"architecture":"amd64","os":"linux"}"#.to_vec(),
    );
    let layer = Blob::new(
        OCI_LAYER_MEDIA_TYPE_TAR,
        format!("layer of {}", reference).into_bytes(),
    );
    ResolvedImage {
        reference: reference.to_string(),
        source,
        digest: None,
        config,
        layers: vec![layer],
    }
}

/// Image source that counts calls and either succeeds or fails.
pub struct StubSource {
    name: &'static str,
    kind: SourceKind,
    fail: bool,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl StubSource {
    pub fn ok(name: &'static str, kind: SourceKind) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind: SourceKind::Daemon,
            fail: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &'static str, kind: SourceKind, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            fail: false,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for StubSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, reference: &ImageReference) -> Result<ResolvedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::SourceFailed {
                source_name: self.name.to_string(),
                reference: reference.to_string(),
                reason: "not available".to_string(),
            });
        }
        Ok(sample_image(reference.as_str(), self.kind))
    }
}

/// Resolver whose daemon and authenticated tiers fail and whose anonymous
/// tier is `anon`.
pub fn anon_only(anon: Arc<StubSource>) -> ImageResolver {
    ImageResolver::new(StubSource::failing("daemon"), StubSource::failing("authn"), anon)
}

/// Command runner that records copies and runs, tracking how many runs
/// overlap.
#[derive(Default)]
pub struct RecordingRunner {
    pub copies: Mutex<Vec<FileAsset>>,
    pub commands: Mutex<Vec<Vec<String>>>,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub run_delay: Duration,
    pub fail_runs: bool,
}

impl RecordingRunner {
    pub fn with_delay(run_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            run_delay,
            ..Default::default()
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|argv| argv.join(" "))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.run_delay).await;
        self.commands.lock().unwrap().push(argv.to_vec());
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_runs {
            return Err(Error::CommandFailed {
                command: argv.join(" "),
                reason: "exit status: 1".to_string(),
            });
        }
        Ok(CommandOutput::default())
    }

    async fn copy(&self, asset: &FileAsset) -> Result<()> {
        self.copies.lock().unwrap().push(asset.clone());
        Ok(())
    }
}
