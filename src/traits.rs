use std::io::Read;

use crate::engine::WalkConfig;
use crate::entry::FileEntry;
use crate::error::SimError;
use crate::hash::Fingerprint;

/// An extracted container filesystem to compare.
///
/// Implement this to compare anything that looks like a tree of paths with
/// byte content: a directory on disk, an in-memory map, a tar stream that
/// was indexed up front. Extracting images is the implementor's job.
///
/// # Thread Safety
///
/// `Send + Sync` are required — levels are evaluated in parallel and may
/// open different paths of the same tree at the same time.
///
/// # Error Handling
///
/// Entries that cannot be enumerated should be yielded as `Err(SimError)`
/// carrying their path rather than silently skipped. The engine records
/// them and treats the path as a mismatch for every level that needs it.
///
/// # Example
///
/// ```rust
/// use std::io::Read;
/// use simlevel::{EntryKind, FileEntry, FileTree, SimError};
/// use simlevel::engine::WalkConfig;
///
/// struct OneFile(&'static [u8]);
///
/// impl FileTree for OneFile {
///     fn walk(&self, _config: &WalkConfig) -> Box<dyn Iterator<Item = Result<FileEntry, SimError>> + '_> {
///         Box::new(std::iter::once(Ok(FileEntry::file("/singularity", self.0.len() as u64))))
///     }
///
///     fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, SimError> {
///         match path {
///             "/singularity" => Ok(Box::new(self.0)),
///             other => Err(SimError::NotFound(other.into())),
///         }
///     }
/// }
/// ```
pub trait FileTree: Send + Sync {
    /// Enumerate every entry below the root. The root itself may be
    /// yielded or not; it never takes part in a comparison.
    fn walk(&self, config: &WalkConfig) -> Box<dyn Iterator<Item = Result<FileEntry, SimError>> + '_>;

    /// Open the byte content of `path` (normalized, root-relative).
    ///
    /// For symlinks this must yield the link target, not the file it
    /// points to. The returned reader is dropped as soon as the comparison
    /// of that path is done.
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, SimError>;
}

/// Computes a content fingerprint from a byte stream.
///
/// Implementations must stream: container images hold multi-gigabyte files,
/// so reading the whole content into memory is not acceptable.
pub trait ContentHasher: Send + Sync {
    fn fingerprint(&self, reader: &mut dyn Read) -> std::io::Result<Fingerprint>;
}
