//! Path-list overlap between two trees.
//!
//! Independent of the similarity levels: a coarse numeric score of how much
//! two images share, useful to rank candidates before running the level
//! comparison or to plot many images against each other with
//! [`SimilarityMatrix`].

use std::collections::BTreeSet;

use serde::Serialize;

use crate::engine::WalkConfig;
use crate::entry::EntryKind;
use crate::error::SimError;
use crate::filter::normalize_path;
use crate::traits::FileTree;

/// Intersecting and unique entries of two path lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListComparison {
    /// Paths present in both lists, sorted.
    pub intersect: Vec<String>,

    /// Paths only in the left list, sorted.
    pub unique_left: Vec<String>,

    /// Paths only in the right list, sorted.
    pub unique_right: Vec<String>,

    pub total_left: usize,
    pub total_right: usize,
}

impl ListComparison {
    /// Compare two path lists. Duplicates within one list count once.
    pub fn compare<L, R>(left: L, right: R) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let left: BTreeSet<String> = left.into_iter().map(Into::into).collect();
        let right: BTreeSet<String> = right.into_iter().map(Into::into).collect();
        Self::from_sets(&left, &right)
    }

    fn from_sets(left: &BTreeSet<String>, right: &BTreeSet<String>) -> Self {
        Self {
            intersect: left.intersection(&right).cloned().collect(),
            unique_left: left.difference(&right).cloned().collect(),
            unique_right: right.difference(&left).cloned().collect(),
            total_left: left.len(),
            total_right: right.len(),
        }
    }

    /// `2 * |intersect| / (total_left + total_right)`, in `[0, 1]`.
    /// Two empty lists are considered identical.
    pub fn information_coefficient(&self) -> f64 {
        let total = self.total_left + self.total_right;
        if total == 0 {
            return 1.0;
        }
        2.0 * self.intersect.len() as f64 / total as f64
    }
}

/// Overlap of two complete trees, split the way image listings are: regular
/// files (symlinks and special files included) and folders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreeOverlap {
    pub files: ListComparison,
    pub folders: ListComparison,
}

// ---------------------------------------------------------------------------
// SimilarityMatrix
// ---------------------------------------------------------------------------

/// Which listing of a tree a [`SimilarityMatrix`] scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Listing {
    /// Everything that is not a directory.
    Files,
    Folders,
}

impl Listing {
    fn wants(self, kind: EntryKind) -> bool {
        (kind == EntryKind::Dir) == (self == Listing::Folders)
    }
}

/// Information coefficients of every row tree against every column tree.
///
/// Each tree is walked once, however many pairs it takes part in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatrix {
    pub rows: usize,
    pub cols: usize,
    pub by: Listing,
    scores: Vec<f64>,
}

impl SimilarityMatrix {
    /// Square matrix of `trees` against themselves. Each unordered pair is
    /// compared once and mirrored; the diagonal is `1.0`.
    ///
    /// # Errors
    ///
    /// The first error any walk yields. A partial listing would make the
    /// score meaningless.
    pub fn pairwise(trees: &[&dyn FileTree], by: Listing, config: &WalkConfig) -> Result<Self, SimError> {
        let listings = trees
            .iter()
            .map(|t| listing(*t, by, config))
            .collect::<Result<Vec<_>, _>>()?;

        let n = listings.len();
        let mut scores = vec![1.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let sim = ListComparison::from_sets(&listings[i], &listings[j]).information_coefficient();
                tracing::debug!(row = i, col = j, sim, "pairwise similarity");
                scores[i * n + j] = sim;
                scores[j * n + i] = sim;
            }
        }
        Ok(Self {
            rows: n,
            cols: n,
            by,
            scores,
        })
    }

    /// Rectangular matrix of `rows` against `cols`.
    pub fn between(
        rows: &[&dyn FileTree],
        cols: &[&dyn FileTree],
        by: Listing,
        config: &WalkConfig,
    ) -> Result<Self, SimError> {
        let walk_all = |trees: &[&dyn FileTree]| {
            trees
                .iter()
                .map(|t| listing(*t, by, config))
                .collect::<Result<Vec<_>, SimError>>()
        };
        let left = walk_all(rows)?;
        let right = walk_all(cols)?;

        let mut scores = Vec::with_capacity(left.len() * right.len());
        for l in &left {
            for r in &right {
                scores.push(ListComparison::from_sets(l, r).information_coefficient());
            }
        }
        Ok(Self {
            rows: left.len(),
            cols: right.len(),
            by,
            scores,
        })
    }

    /// Score of row `row` against column `col`.
    ///
    /// # Panics
    ///
    /// If either index is out of range.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(row < self.rows && col < self.cols, "index ({row}, {col}) out of range");
        self.scores[row * self.cols + col]
    }

    /// One row of scores.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.scores[row * self.cols..(row + 1) * self.cols]
    }
}

fn listing(tree: &dyn FileTree, by: Listing, config: &WalkConfig) -> Result<BTreeSet<String>, SimError> {
    let mut out = BTreeSet::new();
    for item in tree.walk(config) {
        let entry = item?;
        let path = normalize_path(&entry.path);
        if path != "/" && by.wants(entry.kind) {
            out.insert(path);
        }
    }
    Ok(out)
}
