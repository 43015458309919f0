use std::sync::Arc;

use crate::engine::{run, EngineOptions, WalkConfig};
use crate::error::SimError;
use crate::hash::{Sha256Hasher, DEFAULT_CHUNK_SIZE};
use crate::level::LevelSet;
use crate::results::Report;
use crate::traits::{ContentHasher, FileTree};

// ---------------------------------------------------------------------------
// AssessBuilder
// ---------------------------------------------------------------------------

/// Entry point for configuring and running one comparison.
///
/// Created via [`simlevel::assess()`](crate::assess). Configure with chained
/// builder methods, then call [`run()`](AssessBuilder::run) to execute.
///
/// # Example
///
/// ```rust,ignore
/// let report = simlevel::assess()
///     .levels(LevelSet::from_path("levels.json")?)
///     .left(DirectoryTree::new("/tmp/image-a")?)
///     .right(DirectoryTree::new("/tmp/image-b")?)
///     .threads(8)
///     .run()?;
/// ```
pub struct AssessBuilder {
    levels: Option<Arc<LevelSet>>,
    left: Option<Box<dyn FileTree>>,
    right: Option<Box<dyn FileTree>>,
    hasher: Option<Box<dyn ContentHasher>>,
    threads: usize,
    chunk_size: usize,
}

impl Default for AssessBuilder {
    fn default() -> Self {
        Self {
            levels: None,
            left: None,
            right: None,
            hasher: None,
            threads: num_cpus(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl AssessBuilder {
    // ── Levels ────────────────────────────────────────────────────────────

    /// Set the level table. Accepts an owned [`LevelSet`] or a shared
    /// `Arc<LevelSet>`.
    ///
    /// Defaults to the built-in IDENTICAL, REPLICATE, RUNSCRIPT, ENVIRONMENT
    /// and RECIPE levels.
    pub fn levels(mut self, levels: impl Into<Arc<LevelSet>>) -> Self {
        self.levels = Some(levels.into());
        self
    }

    // ── Trees ─────────────────────────────────────────────────────────────

    /// The first image. Mismatch reasons call this side "left".
    pub fn left(mut self, tree: impl FileTree + 'static) -> Self {
        self.left = Some(Box::new(tree));
        self
    }

    /// The second image.
    pub fn right(mut self, tree: impl FileTree + 'static) -> Self {
        self.right = Some(Box::new(tree));
        self
    }

    // ── Options ───────────────────────────────────────────────────────────

    /// Set a custom content hasher.
    ///
    /// Defaults to streaming SHA-256. When set, `.chunk_size()` is ignored.
    pub fn hasher(mut self, h: impl ContentHasher + 'static) -> Self {
        self.hasher = Some(Box::new(h));
        self
    }

    /// Number of threads for tree walking and level evaluation.
    ///
    /// Defaults to the number of logical CPU cores. `0` or `1` evaluates
    /// levels one after another on the calling thread.
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    /// Read size of the default hasher, in bytes. Memory per hash is bounded
    /// by this, whatever the file size.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    // ── Execute ───────────────────────────────────────────────────────────

    /// Run the assessment and return the report.
    ///
    /// Blocks until every level has been evaluated.
    ///
    /// # Errors
    ///
    /// Returns `Err` for fatal problems only: a missing tree, an invalid
    /// built-in level table, or a panicked worker. Unreadable entries do not
    /// fail the run; they become mismatches and are listed in
    /// [`Report::errors`].
    pub fn run(self) -> Result<Report, SimError> {
        let left = self.left.ok_or(SimError::MissingTree("left"))?;
        let right = self.right.ok_or(SimError::MissingTree("right"))?;

        let levels = match self.levels {
            Some(l) => l,
            None => LevelSet::shared_builtin()?,
        };

        let hasher: Box<dyn ContentHasher> = match self.hasher {
            Some(h) => h,
            None => Box::new(Sha256Hasher::new(self.chunk_size)),
        };

        let opts = EngineOptions {
            config: WalkConfig {
                threads: self.threads,
            },
            levels,
            left,
            right,
            hasher,
        };

        run(opts)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Get the logical CPU count, with a safe fallback.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
