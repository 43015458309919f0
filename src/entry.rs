use std::sync::OnceLock;

use serde::Serialize;

use crate::hash::Fingerprint;

/// A single path found in one tree during indexing.
///
/// `path` is root-relative and normalized (see
/// [`normalize_path`](crate::filter::normalize_path)); the engine normalizes
/// whatever a [`FileTree`](crate::traits::FileTree) yields before comparing.
///
/// The content fingerprint is computed lazily, at most once per comparison
/// request, and only when some level needs the content of this path.
#[derive(Debug)]
pub struct FileEntry {
    /// Root-relative POSIX path, e.g. `/etc/resolv.conf`.
    pub path: String,

    /// What kind of entry this is.
    pub kind: EntryKind,

    /// Size in bytes as reported by the tree. Informational only.
    pub size: u64,

    pub(crate) fingerprint: OnceLock<Result<Fingerprint, String>>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, kind: EntryKind, size: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            size,
            fingerprint: OnceLock::new(),
        }
    }

    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self::new(path, EntryKind::File, size)
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self::new(path, EntryKind::Dir, 0)
    }

    /// The fingerprint, if one has been computed successfully.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.get().and_then(|r| r.as_ref().ok())
    }
}

/// The kind of an entry in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A regular file.
    File,

    /// A directory.
    Dir,

    /// A symbolic link. Its content is the link target, never followed.
    Symlink,

    /// Anything else (device files, pipes, sockets, etc.).
    Other,
}

impl EntryKind {
    /// Whether entries of this kind carry bytes worth fingerprinting.
    pub fn has_content(self) -> bool {
        matches!(self, Self::File | Self::Symlink)
    }
}
