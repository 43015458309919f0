use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    // Config
    #[error("malformed level definitions: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("level {level}: invalid pattern {pattern:?}")]
    InvalidPattern {
        level: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate level {0:?}")]
    DuplicateLevel(String),

    #[error("empty level name")]
    EmptyLevelName,

    #[error("cannot read level definitions")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Tree access
    #[error("permission denied")]
    PermissionDenied(PathBuf),

    #[error("path not found")]
    NotFound(PathBuf),

    #[error("invalid source")]
    InvalidSource(PathBuf),

    #[error("symlink loop")]
    SymlinkLoop(PathBuf),

    #[error("IO error")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Hashing
    #[error("failed to fingerprint content")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Runtime
    #[error("no {0} tree provided")]
    MissingTree(&'static str),

    #[error("worker failure: {0}")]
    Worker(String),
}

impl SimError {
    /// The path this error occurred at, if applicable.
    /// For tree errors this is the root-relative path inside the tree.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::PermissionDenied(p)
            | Self::NotFound(p)
            | Self::InvalidSource(p)
            | Self::SymlinkLoop(p)
            | Self::ConfigIo { path: p, .. }
            | Self::Io { path: p, .. }
            | Self::Hash { path: p, .. } => Some(p),
            _ => None,
        }
    }

    /// Whether the assessment can continue after this error.
    ///
    /// Recoverable errors (unreadable entries, symlink loops, hash failures)
    /// are recorded and turn the affected path into a mismatch for every level
    /// that needs it. Everything else halts before any level is evaluated.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::NotFound(_)
                | Self::SymlinkLoop(_)
                | Self::Io { .. }
                | Self::Hash { .. }
        )
    }

    /// Whether this error came from loading level definitions.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::InvalidPattern { .. }
                | Self::DuplicateLevel(_)
                | Self::EmptyLevelName
                | Self::ConfigIo { .. }
        )
    }

    /// Map an I/O error on a tree path to the matching variant.
    pub(crate) fn from_io(path: PathBuf, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Io { path, source: err },
        }
    }
}
