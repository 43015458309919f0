use std::time::Duration;

use serde::Serialize;

use crate::entry::EntryKind;
use crate::error::SimError;
use crate::score::TreeOverlap;

/// Why a path broke a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    /// Present in the left tree only.
    OnlyInLeft,

    /// Present in the right tree only.
    OnlyInRight,

    /// Present in both, but e.g. a file on one side and a directory on the other.
    KindDiffers { left: EntryKind, right: EntryKind },

    /// Present in both with different content fingerprints.
    ContentDiffers,

    /// Could not be enumerated, read or hashed on at least one side.
    Unreadable(String),
}

/// One path that broke a level, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub path: String,
    pub reason: MismatchReason,
}

/// Lifecycle of one level's evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LevelState {
    Pending,
    Evaluating,
    Satisfied,
    Mismatched,
}

impl LevelState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Satisfied | Self::Mismatched)
    }
}

/// Outcome for a single level.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub level_name: String,

    /// `true` iff `mismatches` is empty.
    pub satisfied: bool,

    /// Offending paths in path order, empty when satisfied.
    pub mismatches: Vec<Mismatch>,
}

impl ComparisonResult {
    /// Paths that broke the match, in the same order as `mismatches`.
    pub fn mismatched_paths(&self) -> Vec<&str> {
        self.mismatches.iter().map(|m| m.path.as_str()).collect()
    }

    pub fn state(&self) -> LevelState {
        if self.satisfied {
            LevelState::Satisfied
        } else {
            LevelState::Mismatched
        }
    }
}

/// The output of a completed assessment.
///
/// `levels` follows the declaration order of the level table. Every level is
/// always present; no single winner is chosen, but [`Report::best_match`]
/// gives the natural headline.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Per-level results, in declaration order.
    pub levels: Vec<ComparisonResult>,

    /// File and folder overlap between the two complete trees.
    pub overlap: TreeOverlap,

    /// Run statistics.
    pub stats: AssessStats,

    /// Non-fatal errors met while indexing the trees. Each one has also been
    /// recorded as a mismatch in every level that needed its path.
    #[serde(skip)]
    pub errors: Vec<SimError>,
}

impl Report {
    /// First satisfied level in declaration order, i.e. the strictest one
    /// when levels are declared most-strict first.
    pub fn best_match(&self) -> Option<&ComparisonResult> {
        self.levels.iter().find(|r| r.satisfied)
    }

    pub fn level(&self, name: &str) -> Option<&ComparisonResult> {
        self.levels.iter().find(|r| r.level_name == name)
    }

    pub fn satisfied(&self) -> impl Iterator<Item = &str> {
        self.levels
            .iter()
            .filter(|r| r.satisfied)
            .map(|r| r.level_name.as_str())
    }

    pub fn is_satisfied(&self, name: &str) -> bool {
        self.level(name).is_some_and(|r| r.satisfied)
    }
}

/// Statistics for a completed assessment.
#[derive(Debug, Clone, Serialize)]
pub struct AssessStats {
    /// Entries indexed in the left tree (root excluded).
    pub left_entries: usize,

    /// Entries indexed in the right tree (root excluded).
    pub right_entries: usize,

    /// Content fingerprints computed across both trees. Each entry is
    /// hashed at most once per assessment, however many levels need it.
    pub fingerprints: usize,

    /// Wall-clock time from indexing start to the finished report.
    pub duration: Duration,
}
