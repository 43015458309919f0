//! Ready-made [`FileTree`] implementations.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ignore::{DirEntry, WalkBuilder, WalkState};

use crate::engine::WalkConfig;
use crate::entry::{EntryKind, FileEntry};
use crate::error::SimError;
use crate::filter::normalize_path;
use crate::traits::FileTree;

// ---------------------------------------------------------------------------
// DirectoryTree
// ---------------------------------------------------------------------------

/// An image already extracted to a directory on disk.
///
/// Walked in parallel with every ignore/hidden filter disabled and symlinks
/// not followed: an image's `/etc/mtab -> /proc/mounts` must be compared as
/// a link, not resolved against the host.
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    root: PathBuf,
}

impl DirectoryTree {
    /// Fails with [`SimError::InvalidSource`] if `root` is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SimError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SimError::InvalidSource(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(normalize_path(path).trim_start_matches('/'))
    }
}

impl FileTree for DirectoryTree {
    fn walk(&self, config: &WalkConfig) -> Box<dyn Iterator<Item = Result<FileEntry, SimError>> + '_> {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .ignore(false)
            .parents(false)
            .hidden(false)
            .follow_links(false)
            .same_file_system(false)
            .threads(config.threads);

        let found = Arc::new(Mutex::new(Vec::<Result<FileEntry, SimError>>::new()));

        builder.build_parallel().run(|| {
            let found = Arc::clone(&found);
            let root = self.root.clone();

            Box::new(move |res: Result<DirEntry, ignore::Error>| -> WalkState {
                let item = match res {
                    Ok(entry) if entry.depth() == 0 => return WalkState::Continue,
                    Ok(entry) => to_file_entry(&root, &entry),
                    Err(e) => Err(map_ignore_error(&root, e)),
                };
                match found.lock() {
                    Ok(mut found) => {
                        found.push(item);
                        WalkState::Continue
                    }
                    // Poisoned: take_collected reports it.
                    Err(_) => WalkState::Quit,
                }
            })
        });

        Box::new(take_collected(found).into_iter())
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, SimError> {
        let full = self.resolve(path);
        let meta = std::fs::symlink_metadata(&full).map_err(|e| SimError::from_io(path.into(), e))?;
        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&full).map_err(|e| SimError::from_io(path.into(), e))?;
            let bytes = target.into_os_string().into_encoded_bytes();
            return Ok(Box::new(Cursor::new(bytes)));
        }
        let file = File::open(&full).map_err(|e| SimError::from_io(path.into(), e))?;
        Ok(Box::new(file))
    }
}

/// Unwrap what the walker threads collected. If the results cannot be
/// recovered intact the walk is reported as one path-less error, which fails
/// every level that has candidates.
fn take_collected(found: Arc<Mutex<Vec<Result<FileEntry, SimError>>>>) -> Vec<Result<FileEntry, SimError>> {
    let collected = Arc::try_unwrap(found)
        .map_err(|_| SimError::Worker("walk results still shared after walk".into()))
        .and_then(|m| {
            m.into_inner()
                .map_err(|_| SimError::Worker("walk results lock poisoned".into()))
        });
    match collected {
        Ok(found) => found,
        Err(err) => vec![Err(err)],
    }
}

fn to_file_entry(root: &Path, entry: &DirEntry) -> Result<FileEntry, SimError> {
    let path = utf8_relative(root, entry.path())?;
    let kind = match entry.file_type() {
        Some(ft) if ft.is_dir() => EntryKind::Dir,
        Some(ft) if ft.is_file() => EntryKind::File,
        Some(ft) if ft.is_symlink() => EntryKind::Symlink,
        _ => EntryKind::Other,
    };
    // Without follow_links this is an lstat.
    let size = match entry.metadata() {
        Ok(m) => m.len(),
        Err(e) => return Err(map_ignore_error(root, e)),
    };
    Ok(FileEntry::new(path, kind, size))
}

/// Like [`relative`], but a name that is not valid UTF-8 is an error for
/// that path: lossy conversion would make distinct names compare equal.
fn utf8_relative(root: &Path, path: &Path) -> Result<String, SimError> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    match rel.to_str() {
        Some(s) => Ok(normalize_path(s)),
        None => Err(SimError::Io {
            path: normalize_path(&rel.to_string_lossy()).into(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "path is not valid UTF-8"),
        }),
    }
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    normalize_path(&rel.to_string_lossy())
}

fn map_ignore_error(root: &Path, e: ignore::Error) -> SimError {
    match e {
        ignore::Error::WithPath { path, err } => match *err {
            ignore::Error::Io(io_err) => SimError::from_io(relative(root, &path).into(), io_err),
            other => SimError::Io {
                path: relative(root, &path).into(),
                source: std::io::Error::other(other.to_string()),
            },
        },
        ignore::Error::WithDepth { err, .. } => map_ignore_error(root, *err),
        ignore::Error::Loop { child, .. } => SimError::SymlinkLoop(relative(root, &child).into()),
        ignore::Error::Io(io_err) => SimError::Io {
            path: PathBuf::from("/"),
            source: io_err,
        },
        other => SimError::Io {
            path: PathBuf::from("/"),
            source: std::io::Error::other(other.to_string()),
        },
    }
}

// ---------------------------------------------------------------------------
// MemoryTree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemoryNode {
    kind: EntryKind,
    content: Vec<u8>,
    readable: bool,
    listable: bool,
}

/// An in-memory tree, for embedding callers that already hold an image
/// index and for tests.
///
/// ```rust
/// use simlevel::MemoryTree;
///
/// let tree = MemoryTree::new()
///     .dir("/etc")
///     .file("/etc/hosts", "127.0.0.1 localhost\n")
///     .symlink("/etc/mtab", "/proc/mounts");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    nodes: BTreeMap<String, MemoryNode>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, path: &str, kind: EntryKind, content: Vec<u8>) -> Self {
        self.nodes.insert(
            normalize_path(path),
            MemoryNode {
                kind,
                content,
                readable: true,
                listable: true,
            },
        );
        self
    }

    pub fn file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.insert(path, EntryKind::File, content.as_ref().to_vec())
    }

    pub fn dir(self, path: &str) -> Self {
        self.insert(path, EntryKind::Dir, Vec::new())
    }

    pub fn symlink(self, path: &str, target: &str) -> Self {
        self.insert(path, EntryKind::Symlink, target.as_bytes().to_vec())
    }

    /// A file that is listed but fails with permission denied when opened.
    pub fn unreadable(self, path: &str) -> Self {
        let mut tree = self.insert(path, EntryKind::File, Vec::new());
        if let Some(node) = tree.nodes.get_mut(&normalize_path(path)) {
            node.readable = false;
        }
        tree
    }

    /// An entry whose enumeration fails with permission denied.
    pub fn unlistable(self, path: &str) -> Self {
        let mut tree = self.insert(path, EntryKind::Dir, Vec::new());
        if let Some(node) = tree.nodes.get_mut(&normalize_path(path)) {
            node.listable = false;
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FileTree for MemoryTree {
    fn walk(&self, _config: &WalkConfig) -> Box<dyn Iterator<Item = Result<FileEntry, SimError>> + '_> {
        Box::new(self.nodes.iter().map(|(path, node)| {
            if node.listable {
                Ok(FileEntry::new(path.clone(), node.kind, node.content.len() as u64))
            } else {
                Err(SimError::PermissionDenied(path.into()))
            }
        }))
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, SimError> {
        let path = normalize_path(path);
        let node = self
            .nodes
            .get(&path)
            .ok_or_else(|| SimError::NotFound(path.clone().into()))?;
        if !node.readable || !node.listable {
            return Err(SimError::PermissionDenied(path.into()));
        }
        if node.kind == EntryKind::Dir {
            return Err(SimError::Io {
                path: path.into(),
                source: std::io::Error::other("is a directory"),
            });
        }
        Ok(Box::new(node.content.as_slice()))
    }
}
