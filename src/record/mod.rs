//! Graph node types.
//!
//! Every interned node lives in a per-kind arena inside the store; nodes
//! reference each other through the typed ids below. An id is exactly the
//! node's arena index, which is what makes the on-disk form trivial: the
//! pointer graph serializes as plain integers.

pub mod docker;
pub mod file;
pub mod fingerprint;
pub mod git;

pub use docker::{DockerImage, DockerLayer};
pub use file::{ArchiveFile, File, SerializedArchive, SerializedFile};
pub use fingerprint::Fingerprint;
pub use git::{GitRepoSource, SerializedRepo};

use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Handle of an interned [`Fingerprint`].
    FingerprintId
);
arena_id!(
    /// Handle of an interned [`File`].
    FileId
);
arena_id!(
    /// Handle of an interned [`ArchiveFile`].
    ArchiveId
);
arena_id!(
    /// Handle of an interned [`GitRepoSource`].
    RepoId
);
