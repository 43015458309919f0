use std::error::Error as _;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};

use crate::entry::FileEntry;
use crate::error::SimError;
use crate::results::MismatchReason;
use crate::traits::{ContentHasher, FileTree};

/// Default read size for streaming hashes.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// A content digest. Equal fingerprints mean equal content; metadata
/// (mtime, permissions, owner) never enters it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Sha256Hasher
// ---------------------------------------------------------------------------

/// SHA-256 over raw bytes, read in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct Sha256Hasher {
    chunk_size: usize,
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Sha256Hasher {
    /// A zero chunk size is bumped to one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl ContentHasher for Sha256Hasher {
    fn fingerprint(&self, reader: &mut dyn Read) -> std::io::Result<Fingerprint> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Fingerprint(hasher.finalize().to_vec()))
    }
}

// ---------------------------------------------------------------------------
// ContentComparator
// ---------------------------------------------------------------------------

/// Compares one path across the two trees by content.
///
/// Presence and kind are checked first; the hasher only runs when both
/// sides hold an entry with content of the same kind. Any failure to read
/// or hash is a mismatch, never a pass.
pub(crate) struct ContentComparator<'a> {
    pub hasher: &'a dyn ContentHasher,
    pub left: &'a dyn FileTree,
    pub right: &'a dyn FileTree,
    pub hashed: &'a AtomicUsize,
}

impl ContentComparator<'_> {
    pub fn compare(
        &self,
        left: Option<&FileEntry>,
        right: Option<&FileEntry>,
    ) -> Option<MismatchReason> {
        let (l, r) = match (left, right) {
            (None, None) => return None,
            (Some(_), None) => return Some(MismatchReason::OnlyInLeft),
            (None, Some(_)) => return Some(MismatchReason::OnlyInRight),
            (Some(l), Some(r)) => (l, r),
        };
        if l.kind != r.kind {
            return Some(MismatchReason::KindDiffers {
                left: l.kind,
                right: r.kind,
            });
        }
        if !l.kind.has_content() {
            return None;
        }

        let lf = match self.fingerprint(self.left, l) {
            Ok(fp) => fp,
            Err(msg) => return Some(MismatchReason::Unreadable(msg.clone())),
        };
        let rf = match self.fingerprint(self.right, r) {
            Ok(fp) => fp,
            Err(msg) => return Some(MismatchReason::Unreadable(msg.clone())),
        };
        (lf != rf).then_some(MismatchReason::ContentDiffers)
    }

    fn fingerprint<'e>(
        &self,
        tree: &dyn FileTree,
        entry: &'e FileEntry,
    ) -> &'e Result<Fingerprint, String> {
        entry.fingerprint.get_or_init(|| {
            self.hashed.fetch_add(1, Ordering::Relaxed);
            // The reader lives only inside this closure, so it is closed on
            // every path out of it.
            let result = tree.open(&entry.path).and_then(|mut reader| {
                self.hasher
                    .fingerprint(&mut reader)
                    .map_err(|source| SimError::Hash {
                        path: entry.path.clone().into(),
                        source,
                    })
            });
            result.map_err(|err| {
                let msg = describe(&err);
                tracing::warn!(path = %entry.path, error = %msg, "cannot fingerprint entry");
                msg
            })
        })
    }
}

/// Render an error and its source chain on one line.
pub(crate) fn describe(err: &SimError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}
