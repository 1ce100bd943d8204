//! Docker image observations.
//!
//! An image deliberately has no fingerprint of its own: `docker save` output
//! is not content-stable, so a whole-image digest would only ever identify
//! one particular export. Consumers key images by `image_id` or
//! `repo_digests` instead. Layers do get a fingerprint, which identifies the
//! layer tar exactly as it appeared in this save stream, plus the tarsum,
//! which is stable across byte-order quirks of the stream.

use super::{FileId, FingerprintId};

/// One layer of a saved image.
#[derive(Clone, Debug)]
pub struct DockerLayer {
    /// The layer's directory name inside the save stream (64 hex chars).
    pub name: String,
    /// Docker legacy tarsum (version 1) over the layer tar.
    pub tarsum: String,
    /// Fingerprint of the layer tar byte stream.
    pub fingerprint: FingerprintId,
    /// Regular files contained in the layer, in tar order.
    pub files: Vec<FileId>,
}

/// A named image assembled from a save stream, layers in manifest order.
#[derive(Clone, Debug, Default)]
pub struct DockerImage {
    pub name: String,
    pub image_id: String,
    pub repo_digests: Vec<String>,
    pub layers: Vec<DockerLayer>,
}
