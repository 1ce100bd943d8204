//! Git repository sources.

use serde::{Deserialize, Serialize};

use crate::hash::GitSha;

use super::FileId;

/// One commit of one repository and every blob reachable from its tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GitRepoSource {
    pub commit: GitSha,
    pub branch: String,
    pub tag: String,
    pub url: String,
    pub files: Vec<FileId>,
    cache_id: Option<u64>,
}

impl GitRepoSource {
    /// Self-describing identity for this commit of this repository.
    pub fn urn(&self) -> String {
        format!(
            "urn:x-fp:git:{}:{}:{}",
            self.commit.hex(),
            self.branch,
            self.tag
        )
    }

    /// Records a blob as part of this source, preserving walk order.
    pub fn record_blob(&mut self, file: FileId) {
        self.files.push(file);
    }

    pub fn cache_id(&self) -> Option<u64> {
        self.cache_id
    }

    pub fn set_cache_id(&mut self, id: u64) {
        self.cache_id = Some(id);
    }
}

/// On-disk form of [`GitRepoSource`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializedRepo {
    pub id: u64,
    pub commit: GitSha,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub files: Vec<u64>,
}
