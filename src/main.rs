//! blobprint CLI.
//!
//! Results go to stdout; diagnostics and logging go to stderr, so piping
//! stdout to a file captures exactly what was asked for.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use blobprint::hash::{new_hasher_by_name, DigestHasher as _, DigestMatcher};
use blobprint::record::Fingerprint;
use blobprint::scanner::{
    self, find_matching_fingerprint, identify_file, scan_and_inventory_path, scan_docker_images,
    self_fingerprint, DockerCli, InventoryConfig, ScanError,
};
use blobprint::store::serial::{restore_remembered_objects, RestoreSource};
use blobprint::store::FingerprintStore;

#[derive(Parser)]
#[command(
    name = "blobprint",
    about = "File scanner for recording relationships between build inputs and outputs",
    long_about = "blobprint scans files and objects and records identifying information \
about them, including various hashes (md5, sha1, sha256, and friends). Some kinds of \
objects are scanned recursively, recording fingerprints for the container as well as \
everything inside it: most archive formats, DEB and RPM packages, and docker images."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan paths, directories, archives, packages, and local docker images
    Scan {
        /// Paths or image names
        #[arg(value_name = "PATH|IMAGE", required = true)]
        targets: Vec<String>,
        /// Nested container recursion budget
        #[arg(long, default_value_t = 10)]
        depth_limit: usize,
        /// Concurrent archive/package scan workers
        #[arg(long, default_value_t = 3)]
        workers: usize,
    },
    /// Calculate hashes of the named files
    Hash {
        /// `all` for every digest, or one of: md5 sha1 sha256 sha384 sha512
        /// git hwy64 hwy128 hwy256
        #[arg(value_name = "ALGO")]
        algorithm: String,
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,
    },
    /// Print Subresource Integrity strings
    Sri {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,
    },
    /// Find files/objects matching a fingerprint in the restored store
    Find {
        /// `<algo>:<hex-prefix>` pattern or a file path
        #[arg(value_name = "PATTERN")]
        pattern: String,
    },
    /// Print hashes of the running executable
    #[command(name = "self")]
    SelfId,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // One line on stderr; usage output would not help here.
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ScanError> {
    match cli.command {
        Command::Scan {
            targets,
            depth_limit,
            workers,
        } => cmd_scan(&targets, depth_limit, workers),
        Command::Hash { algorithm, paths } => cmd_hash(&algorithm, &paths),
        Command::Sri { paths } => cmd_sri(&paths),
        Command::Find { pattern } => cmd_find(&pattern),
        Command::SelfId => cmd_self(),
    }
}

/// restore -> scan -> verify -> persist. Persisting is skipped (with a log
/// line) when verification fails; the scan results still printed.
fn cmd_scan(targets: &[String], depth_limit: usize, workers: usize) -> Result<(), ScanError> {
    let store = restore_remembered_objects(Path::new("."), RestoreSource::Yaml)
        .unwrap_or_else(FingerprintStore::new);
    let daemon = DockerCli;

    let mut paths = Vec::new();
    let mut images = Vec::new();
    for target in targets {
        let is_path = scanner::is_scannable_path(target);
        let is_image = scanner::is_scannable_image(&daemon, target);
        if is_path {
            paths.push(target.clone());
        }
        if is_image {
            images.push(target.clone());
        }
        if !is_path && !is_image {
            println!("Cannot find scannable target: {target}");
        }
    }
    if paths.is_empty() && images.is_empty() {
        return Err(ScanError::NoTargets);
    }

    if !images.is_empty() {
        let scanned = scan_docker_images(&store, &daemon, &images)?;
        let mut out = std::io::stdout().lock();
        for image in &scanned {
            scanner::dump_docker_image(&store, image, &mut out)?;
        }
    }
    let config = InventoryConfig {
        workers,
        depth_limit,
    };
    for path in &paths {
        let stats = scan_and_inventory_path(&store, Path::new(path), &config);
        tracing::info!(
            path = %path,
            files = stats.files,
            repos = stats.repos,
            archives = stats.archives,
            packages = stats.packages,
            errors = stats.errors,
            "scan finished"
        );
    }

    if let Err(err) = store.persist_remembered_objects(Path::new(".")) {
        warn!(%err, "not persisting scan results");
    }
    Ok(())
}

fn cmd_hash(algorithm: &str, paths: &[String]) -> Result<(), ScanError> {
    let store = FingerprintStore::new();
    let mut out = std::io::stdout().lock();
    for path in paths {
        if algorithm == "all" {
            let file_id = identify_file(&store, Path::new(path))?;
            let fp = store.fingerprint(store.file(file_id).fingerprint);
            writeln!(out, "{fp}  {path}")?;
        } else {
            let meta = std::fs::metadata(path)?;
            let mut hasher = new_hasher_by_name(algorithm, Some(meta.len()))?;
            let mut file = std::fs::File::open(path)?;
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = std::io::Read::read(&mut file, &mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            let digest = hasher.finalize();
            writeln!(out, "{}  {}", digest.hex(), path)?;
        }
    }
    Ok(())
}

fn cmd_sri(paths: &[String]) -> Result<(), ScanError> {
    let store = FingerprintStore::new();
    let mut out = std::io::stdout().lock();
    for path in paths {
        let file_id = identify_file(&store, Path::new(path))?;
        let fp = store.fingerprint(store.file(file_id).fingerprint);
        writeln!(out, "{}: {}", path, fp.sri())?;
    }
    Ok(())
}

fn cmd_find(pattern: &str) -> Result<(), ScanError> {
    let store = restore_remembered_objects(Path::new("."), RestoreSource::Yaml)
        .unwrap_or_else(FingerprintStore::new);
    let mut out = std::io::stdout().lock();

    let fingerprint: Option<Fingerprint> = match DigestMatcher::parse(pattern) {
        Ok(matcher) => {
            writeln!(out, "Parsed as digest: {matcher}")?;
            find_matching_fingerprint(&store, &matcher).map(|id| store.fingerprint(id))
        }
        Err(err) => {
            // Not a digest pattern; treat it as a path to fingerprint.
            eprintln!("{err}");
            let file_id = identify_file(&store, Path::new(pattern))?;
            Some(store.fingerprint(store.file(file_id).fingerprint))
        }
    };
    let Some(fingerprint) = fingerprint else {
        return Ok(());
    };

    let repos = store.find_git_sources_containing_fingerprint(&fingerprint);
    if !repos.is_empty() {
        writeln!(out, "Git Repositories:")?;
        for id in repos {
            let repo = store.repo(id);
            let hits: Vec<String> = repo
                .files
                .iter()
                .map(|&fid| store.file(fid))
                .filter(|f| store.fingerprint(f.fingerprint).is(&fingerprint))
                .map(|f| f.path)
                .collect();
            writeln!(out, " - {}: {}", repo.urn(), hits.join(", "))?;
        }
    }

    let files = store.find_files_with_fingerprint(&fingerprint);
    if !files.is_empty() {
        writeln!(out, "File matches:")?;
        for id in files {
            writeln!(out, " - {}", store.file(id).path)?;
        }
    }

    let archives = store.find_archives_containing_fingerprint(&fingerprint);
    if !archives.is_empty() {
        writeln!(out, "Archives containing matches:")?;
        for id in archives {
            let archive = store.archive(id);
            writeln!(out, " - {}", store.file(archive.file).path)?;
        }
    }
    Ok(())
}

fn cmd_self() -> Result<(), ScanError> {
    let fp = self_fingerprint()?;
    let mut out = std::io::stdout().lock();
    // Standard/portable hashes first.
    writeln!(out, "md5:{}", fp.md5.hex())?;
    writeln!(out, "sha1:{}", fp.sha1.hex())?;
    writeln!(out, "sha256:{}", fp.sha256.hex())?;
    writeln!(out, "sha384:{}", fp.sha384.hex())?;
    writeln!(out, "sha512:{}", fp.sha512.hex())?;
    // Same output as git-hash-object would give.
    writeln!(out, "gitsha:{}", fp.git_sha.hex())?;
    // Keyed HighwayHash, fast but salt-specific.
    writeln!(out, "hwy64:{}", fp.hwy64.hex())?;
    writeln!(out, "hwy128:{}", fp.hwy128.hex())?;
    writeln!(out, "hwy256:{}", fp.hwy256.hex())?;
    Ok(())
}
