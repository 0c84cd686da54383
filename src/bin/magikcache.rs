//! magikcache - Image Cache CLI
//!
//! Caches container images on the host as docker-archive files and loads
//! them into a target's container runtime.
//!
//! ## Usage
//!
//! ```sh
//! magikcache cache <image>...
//! magikcache load <image>... [--runtime containerd]
//! magikcache cache-and-load <image>...
//! magikcache delete <image>...
//! magikcache path <image>...
//! ```

use magikcache::{
    CacheSettings, ClusterConfig, ConfigSource, FileConfigSource, KubernetesConfig, LocalRunner,
    Pipeline, RuntimeKind, StaticConfigSource,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug, Default)]
struct Options {
    cache_dir: Option<PathBuf>,
    load_root: Option<String>,
    runtime: Option<RuntimeKind>,
    jobs: Option<usize>,
    verbose: bool,
}

#[derive(Debug)]
enum Command {
    Cache { images: Vec<String> },
    Load { images: Vec<String> },
    CacheAndLoad { images: Vec<String> },
    Delete { images: Vec<String> },
    Path { images: Vec<String> },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<(Command, Options), String> {
    let Some(name) = args.get(1) else {
        return Ok((Command::Help, Options::default()));
    };

    let mut options = Options::default();
    let mut images = Vec::new();
    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match flag {
            "--cache-dir" => {
                options.cache_dir = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--load-root" => {
                options.load_root = Some(value()?);
                i += 2;
            }
            "--runtime" | "-r" => {
                let kind = value()?
                    .parse::<RuntimeKind>()
                    .map_err(|e| e.to_string())?;
                options.runtime = Some(kind);
                i += 2;
            }
            "--jobs" | "-j" => {
                let jobs = value()?
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| "--jobs requires a positive integer".to_string())?;
                options.jobs = Some(jobs);
                i += 2;
            }
            "--verbose" | "-v" => {
                options.verbose = true;
                i += 1;
            }
            other if other.starts_with('-') => return Err(format!("unknown option: {}", other)),
            image => {
                images.push(image.to_string());
                i += 1;
            }
        }
    }

    let needs_images = |command: &str| {
        if images.is_empty() {
            Err(format!("{} requires at least one <image>", command))
        } else {
            Ok(images.clone())
        }
    };

    let command = match name.as_str() {
        "cache" => Command::Cache {
            images: needs_images("cache")?,
        },
        "load" => Command::Load {
            images: needs_images("load")?,
        },
        "cache-and-load" => Command::CacheAndLoad {
            images: needs_images("cache-and-load")?,
        },
        "delete" => Command::Delete {
            images: needs_images("delete")?,
        },
        "path" => Command::Path {
            images: needs_images("path")?,
        },
        "version" | "--version" => Command::Version,
        "help" | "--help" | "-h" => Command::Help,
        unknown => return Err(format!("unknown command: {}", unknown)),
    };
    Ok((command, options))
}

// =============================================================================
// Commands
// =============================================================================

fn settings(options: &Options) -> CacheSettings {
    let mut settings = CacheSettings::from_env();
    if let Some(dir) = &options.cache_dir {
        settings.cache_dir = dir.clone();
    }
    if let Some(root) = &options.load_root {
        settings.load_root = root.clone();
    }
    settings.max_parallel = options.jobs;
    settings
}

fn pipeline(options: &Options) -> Pipeline {
    let settings = settings(options);
    let config: Arc<dyn ConfigSource> = match options.runtime {
        Some(kind) => Arc::new(StaticConfigSource(ClusterConfig {
            name: String::new(),
            kubernetes_config: KubernetesConfig {
                container_runtime: kind.to_string(),
            },
        })),
        None => Arc::new(FileConfigSource::new(settings.active_profile_config())),
    };
    Pipeline::with_config(&settings, Arc::new(LocalRunner::new()), config)
}

async fn run(command: Command, options: Options) -> magikcache::Result<()> {
    match command {
        Command::Cache { images } => pipeline(&options).cache().cache_images(&images).await,
        Command::Load { images } => pipeline(&options).loader().load_images(&images).await,
        Command::CacheAndLoad { images } => pipeline(&options).cache_and_load(&images).await,
        Command::Delete { images } => pipeline(&options).cache().delete_images(&images),
        Command::Path { images } => {
            let pipeline = pipeline(&options);
            for image in &images {
                println!("{}", pipeline.cache().entry_path(image)?.display());
            }
            Ok(())
        }
        Command::Version => {
            println!("magikcache version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        r#"magikcache - cache container images and load them into a runtime

USAGE:
    magikcache <command> <image>... [options]

COMMANDS:
    cache <image>...     Fetch images into the host cache
    load <image>...      Copy cached images to the target and import them
    cache-and-load <image>...
                         Cache, then load, in one run
    delete <image>...    Remove cached images and prune empty directories
    path <image>...      Print the cache path of each image
    version              Show version info
    help                 Show this help

OPTIONS:
    --cache-dir <dir>      Cache root (default: ~/.magik/cache/images)
    --load-root <dir>      Target directory for archives (default: /var/lib/minikube/images)
    --runtime, -r <name>   Runtime: docker, containerd, crio (default: from profile)
    --jobs, -j <n>         Images processed at once (default: all)
    --verbose, -v          Debug logging

EXAMPLES:
    magikcache cache registry.k8s.io/pause:3.9
    magikcache load registry.k8s.io/pause:3.9 --runtime containerd
    magikcache delete registry.k8s.io/pause:3.9
"#
    );
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let (command, options) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("error: {}", e);
            print_help();
            return ExitCode::FAILURE;
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if options.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
    }

    match run(command, options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("magikcache")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_images_and_flags() {
        let (command, options) =
            parse_args(&argv(&["load", "a:1", "-r", "containerd", "b:2", "-j", "2"])).unwrap();
        match command {
            Command::Load { images } => assert_eq!(images, vec!["a:1", "b:2"]),
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(options.runtime, Some(RuntimeKind::Containerd));
        assert_eq!(options.jobs, Some(2));
    }

    #[test]
    fn rejects_missing_images_and_bad_flags() {
        assert!(parse_args(&argv(&["cache"])).is_err());
        assert!(parse_args(&argv(&["cache", "a:1", "--jobs", "0"])).is_err());
        assert!(parse_args(&argv(&["load", "a:1", "--runtime", "rkt"])).is_err());
        assert!(parse_args(&argv(&["cache", "a:1", "--bogus"])).is_err());
    }

    #[test]
    fn parses_cache_and_load() {
        let (command, _) = parse_args(&argv(&["cache-and-load", "a:1"])).unwrap();
        assert!(matches!(command, Command::CacheAndLoad { ref images } if images == &["a:1"]));
    }

    #[test]
    fn no_args_is_help() {
        assert!(matches!(parse_args(&argv(&[])).unwrap().0, Command::Help));
    }
}
