//! Docker image scanning.
//!
//! # Input
//! The v1 `docker save` stream: a tar whose members are per-image configs
//! (`<64-hex>.json`), per-layer directories (`<64-hex>/json`,
//! `<64-hex>/layer.tar`), a `manifest.json` ordering everything, and a
//! legacy `repositories` map. The daemon behind the stream is abstracted as
//! [`ImageDaemon`] so the parser can be fed synthetic tars in tests.
//!
//! # Output
//! One [`DockerImage`] per manifest entry, layers in manifest order, with
//! `repo_digests` copied from the daemon's inspect call. Images carry no
//! fingerprint of their own: a save stream is not content-stable, so only
//! layers (fingerprint + tarsum) and files are content-addressed.

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::archive::formats::{LimitedRead, TarCursor, TarNext};
use crate::record::{DockerImage, DockerLayer, FileId, FingerprintId};
use crate::store::FingerprintStore;

use super::archive::{fingerprint_entry, DEFAULT_DEPTH_LIMIT};
use super::error::ScanError;
use super::passthrough::{Passthrough, ScanRead};
use super::tarsum::TarSum;

/// What the daemon knows about one image.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ImageInspect {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "RepoDigests", default)]
    pub repo_digests: Vec<String>,
}

/// The scanner's view of a container daemon.
pub trait ImageDaemon {
    /// Opens a `docker save` stream over the named images.
    fn save(&self, names: &[String]) -> Result<Box<dyn Read>, ScanError>;
    /// Inspects one image by name or id.
    fn inspect(&self, name: &str) -> Result<ImageInspect, ScanError>;
}

/// Daemon access through the `docker` CLI.
pub struct DockerCli;

impl ImageDaemon for DockerCli {
    fn save(&self, names: &[String]) -> Result<Box<dyn Read>, ScanError> {
        let mut child = Command::new("docker")
            .arg("save")
            .args(names)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ScanError::Daemon(format!("could not run docker save: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScanError::Daemon("docker save produced no stdout".into()))?;
        Ok(Box::new(SaveStream {
            _child: child,
            stdout,
        }))
    }

    fn inspect(&self, name: &str) -> Result<ImageInspect, ScanError> {
        let output = Command::new("docker")
            .args(["image", "inspect", name])
            .stderr(Stdio::null())
            .output()
            .map_err(|e| ScanError::Daemon(format!("could not run docker inspect: {e}")))?;
        if !output.status.success() {
            return Err(ScanError::Daemon(format!("no such image: {name}")));
        }
        let mut docs: Vec<ImageInspect> = serde_json::from_slice(&output.stdout)
            .map_err(|e| ScanError::Daemon(format!("unreadable inspect output: {e}")))?;
        docs.pop()
            .ok_or_else(|| ScanError::Daemon(format!("empty inspect output for {name}")))
    }
}

struct SaveStream {
    _child: Child,
    stdout: std::process::ChildStdout,
}

impl Read for SaveStream {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(dst)
    }
}

/// True when the daemon can resolve the name to a local image.
pub fn is_scannable_image(daemon: &dyn ImageDaemon, name: &str) -> bool {
    daemon.inspect(name).is_ok()
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "Layers", default)]
    layers: Vec<String>,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Vec<String>,
}

fn image_config_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{64}\.json$").expect("image config regex"))
}

fn layer_config_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{64}/json$").expect("layer config regex"))
}

/// Scans named images through the daemon's save stream.
pub fn scan_docker_images(
    store: &FingerprintStore,
    daemon: &dyn ImageDaemon,
    names: &[String],
) -> Result<Vec<DockerImage>, ScanError> {
    debug!(images = %names.join(", "), "scanning docker images");
    let mut stream = daemon.save(names)?;
    scan_image_save_stream(store, daemon, names, &mut stream)
}

/// Parses one `docker save` stream and assembles the images it describes.
pub fn scan_image_save_stream(
    store: &FingerprintStore,
    daemon: &dyn ImageDaemon,
    names: &[String],
    input: &mut dyn Read,
) -> Result<Vec<DockerImage>, ScanError> {
    let mut cursor = TarCursor::new();
    let mut layers: Vec<DockerLayer> = Vec::new();
    let mut manifest: Vec<ManifestEntry> = Vec::new();

    loop {
        let (name, size, pad, regular) = match cursor.next_entry(input)? {
            TarNext::End => break,
            TarNext::BadHeader => {
                warn!("damaged header in save stream; restarting at the next block");
                continue;
            }
            TarNext::Entry(meta) => (
                String::from_utf8_lossy(meta.name).into_owned(),
                meta.size,
                meta.pad,
                meta.is_regular() && !meta.is_dir(),
            ),
        };
        if !regular {
            cursor.skip(input, size + pad)?;
            continue;
        }

        let mut body = LimitedRead::new(input, size);
        if name.ends_with("layer.tar") {
            let layer_name = name.split('/').next().unwrap_or(&name).to_string();
            match scan_docker_layer(store, &layer_name, size, &mut body) {
                Ok(layer) => layers.push(layer),
                Err(err) => warn!(layer = %name, %err, "could not scan layer"),
            }
        } else if name == "manifest.json" {
            let (content, _) = fingerprint_metadata_entry(store, size, &mut body)?;
            match serde_json::from_slice(&content) {
                Ok(parsed) => manifest = parsed,
                Err(err) => warn!(%err, "unreadable manifest.json"),
            }
        } else if name == "repositories" {
            // Legacy name->tag->layer map; fingerprinted, content unused.
            let _ = fingerprint_metadata_entry(store, size, &mut body)?;
        } else if image_config_name().is_match(&name) || layer_config_name().is_match(&name) {
            let _ = fingerprint_metadata_entry(store, size, &mut body)?;
        } else {
            debug!(entry = %name, "ignoring unrecognized save stream entry");
        }
        let leftover = body.remaining();
        cursor.skip(input, leftover + pad)?;
    }

    // Assemble in manifest order; the save stream's own entry order is
    // unspecified.
    let mut images = Vec::with_capacity(manifest.len());
    for (i, entry) in manifest.iter().enumerate() {
        let mut image = DockerImage {
            name: names
                .get(i)
                .cloned()
                .or_else(|| entry.repo_tags.first().cloned())
                .unwrap_or_else(|| entry.config.clone()),
            image_id: entry.config.clone(),
            ..DockerImage::default()
        };
        if let Some(tag) = entry.repo_tags.first() {
            match daemon.inspect(tag) {
                Ok(inspect) => image.repo_digests = inspect.repo_digests,
                Err(err) => warn!(image = %tag, %err, "could not inspect image"),
            }
        }
        for layer_path in &entry.layers {
            let id = layer_path.split('/').next().unwrap_or(layer_path);
            match layers.iter().find(|l| l.name == id) {
                Some(layer) => image.layers.push(layer.clone()),
                None => warn!(layer = %layer_path, "manifest references a layer the stream never delivered"),
            }
        }
        images.push(image);
    }
    Ok(images)
}

/// Scans one layer tar: fingerprints the stream, fingerprints every regular
/// entry, and computes the v1 tarsum alongside.
fn scan_docker_layer(
    store: &FingerprintStore,
    layer_name: &str,
    size: u64,
    input: &mut dyn ScanRead,
) -> Result<DockerLayer, ScanError> {
    let mut tee = Passthrough::new(input, Some(size))?;
    let mut cursor = TarCursor::new();
    let mut tarsum = TarSum::new();
    let mut files: Vec<FileId> = Vec::new();

    loop {
        let (name, entry_size, pad, regular) = match cursor.next_entry(&mut tee)? {
            TarNext::End => break,
            TarNext::BadHeader => {
                warn!(layer = layer_name, "damaged header in layer tar; restarting");
                continue;
            }
            TarNext::Entry(meta) => {
                tarsum.begin_entry(&meta);
                (
                    String::from_utf8_lossy(meta.name).into_owned(),
                    meta.size,
                    meta.pad,
                    meta.is_regular() && !meta.is_dir(),
                )
            }
        };

        if regular {
            let body = LimitedRead::new(&mut tee, entry_size);
            let mut teed = TarsumRead {
                inner: body,
                tarsum: &mut tarsum,
            };
            match fingerprint_entry(store, &name, entry_size, &mut teed, 0, DEFAULT_DEPTH_LIMIT) {
                Ok(file_id) => files.push(file_id),
                Err(err) => warn!(entry = %name, %err, "could not fingerprint layer entry"),
            }
            // Drain whatever the entry scan left unread; reading through the
            // adapter keeps feeding the tarsum.
            let mut scratch = [0u8; 8192];
            loop {
                let got = teed.read(&mut scratch)?;
                if got == 0 {
                    break;
                }
            }
        } else if entry_size > 0 {
            let mut body = LimitedRead::new(&mut tee, entry_size);
            let mut scratch = [0u8; 8192];
            loop {
                let got = body.read(&mut scratch)?;
                if got == 0 {
                    break;
                }
                tarsum.append_payload(&scratch[..got]);
            }
        }
        tarsum.end_entry();
        cursor.skip(&mut tee, pad)?;
    }

    let (fp, partial) = tee.finish()?;
    if partial {
        return Err(ScanError::PartialFingerprint {
            path: layer_name.to_string(),
        });
    }
    let fingerprint = store.put_fingerprint(fp);
    Ok(DockerLayer {
        name: layer_name.to_string(),
        tarsum: tarsum.finalize(),
        fingerprint,
        files,
    })
}

/// Fingerprints a metadata entry through a tee while buffering its content.
fn fingerprint_metadata_entry(
    store: &FingerprintStore,
    size: u64,
    body: &mut dyn ScanRead,
) -> Result<(Vec<u8>, FingerprintId), ScanError> {
    let mut tee = Passthrough::new(body, Some(size))?;
    let mut content = Vec::with_capacity(size.min(1 << 20) as usize);
    tee.read_to_end(&mut content)?;
    let (fp, partial) = tee.finish()?;
    if partial {
        return Err(ScanError::PartialFingerprint {
            path: "<metadata entry>".to_string(),
        });
    }
    Ok((content, store.put_fingerprint(fp)))
}

/// Read adapter feeding everything an entry scan consumes into the tarsum.
struct TarsumRead<'a, 'b> {
    inner: LimitedRead<'a>,
    tarsum: &'b mut TarSum,
}

impl Read for TarsumRead<'_, '_> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(dst)?;
        if n > 0 {
            self.tarsum.append_payload(&dst[..n]);
        }
        Ok(n)
    }
}

impl ScanRead for TarsumRead<'_, '_> {}

/// Prints the files of an image, by layer.
pub fn dump_docker_image(
    store: &FingerprintStore,
    image: &DockerImage,
    out: &mut dyn io::Write,
) -> io::Result<()> {
    writeln!(
        out,
        "Image: {} ({}, {:?})",
        image.name, image.image_id, image.repo_digests
    )?;
    writeln!(out, "  layers:")?;
    for layer in &image.layers {
        let fp = store.fingerprint(layer.fingerprint);
        writeln!(
            out,
            "    {}: ({} bytes, {})",
            layer.name, fp.size, layer.tarsum
        )?;
        for file_id in &layer.files {
            let file = store.file(*file_id);
            let fp = store.fingerprint(file.fingerprint);
            writeln!(
                out,
                "     - {} ({} bytes, {})",
                file.path,
                fp.size,
                fp.git_sha.hex()
            )?;
        }
    }
    Ok(())
}
