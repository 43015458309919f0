//! # simlevel
//!
//! Decide how similar two container images are, level by level.
//!
//! A *similarity level* is a named rule: which paths must exist in both
//! images, which paths are ignored, and which files must also match byte for
//! byte. simlevel evaluates every configured level against two extracted
//! image trees and reports, per level, whether it holds and which paths broke
//! it. It does **not** extract images, render trees, or parse command lines —
//! those belong to the caller.
//!
//! # Quick Start
//!
//! ```rust
//! use simlevel::MemoryTree;
//!
//! let a = MemoryTree::new()
//!     .file("/singularity", "#!/bin/sh\nexec python \"$@\"\n")
//!     .file("/environment", "export PATH=/usr/bin\n")
//!     .file("/etc/resolv.conf", "nameserver 10.0.0.1\n");
//! let b = MemoryTree::new()
//!     .file("/singularity", "#!/bin/sh\nexec python \"$@\"\n")
//!     .file("/environment", "export PATH=/usr/bin\n")
//!     .file("/etc/resolv.conf", "nameserver 8.8.8.8\n");
//!
//! let report = simlevel::assess().left(a).right(b).run().unwrap();
//!
//! assert!(!report.is_satisfied("IDENTICAL"));
//! assert_eq!(report.best_match().unwrap().level_name, "REPLICATE");
//! for level in &report.levels {
//!     println!("{:<12} {}", level.level_name, level.satisfied);
//! }
//! ```
//!
//! # Level files
//!
//! Levels are loaded from JSON with [`LevelSet::from_path`] or
//! [`LevelSet::from_json_str`]; see the [`level`] module for the format.
//! Loading is strict: unknown keys, wrong types and bad patterns are errors.
//!
//! # Custom trees
//!
//! Implement [`FileTree`] to compare anything traversable — an unpacked
//! rootfs, an indexed tarball, a remote listing with a byte-stream accessor.

#![forbid(unsafe_code)]

pub mod engine;
pub mod filter;
pub mod level;
pub mod score;

mod builder;
mod entry;
mod error;
mod hash;
mod results;
mod traits;
mod tree;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use builder::AssessBuilder;
pub use entry::{EntryKind, FileEntry};
pub use error::SimError;
pub use hash::{Fingerprint, Sha256Hasher, DEFAULT_CHUNK_SIZE};
pub use level::{LevelDefinition, LevelSet};
pub use results::{AssessStats, ComparisonResult, LevelState, Mismatch, MismatchReason, Report};
pub use score::{ListComparison, Listing, SimilarityMatrix, TreeOverlap};
pub use traits::{ContentHasher, FileTree};
pub use tree::{DirectoryTree, MemoryTree};

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a new [`AssessBuilder`] to configure and run a comparison.
///
/// # Example
///
/// ```rust
/// use simlevel::{LevelDefinition, LevelSet, MemoryTree};
///
/// let levels = LevelSet::from_levels(vec![
///     LevelDefinition::new("RUNSCRIPT", Some("$^"), Vec::<String>::new(), ["/singularity"]).unwrap(),
/// ]).unwrap();
///
/// let tree = MemoryTree::new().file("/singularity", "#!/bin/sh\n");
/// let report = simlevel::assess()
///     .levels(levels)
///     .left(tree.clone())
///     .right(tree)
///     .run()
///     .unwrap();
///
/// assert!(report.is_satisfied("RUNSCRIPT"));
/// ```
pub fn assess() -> AssessBuilder {
    AssessBuilder::default()
}
