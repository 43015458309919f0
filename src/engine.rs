use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::entry::{EntryKind, FileEntry};
use crate::error::SimError;
use crate::filter::{normalize_path, Candidacy, IncludePattern};
use crate::hash::{describe, ContentComparator};
use crate::level::{LevelDefinition, LevelSet};
use crate::results::{AssessStats, ComparisonResult, LevelState, Mismatch, MismatchReason, Report};
use crate::score::{ListComparison, TreeOverlap};
use crate::traits::{ContentHasher, FileTree};

// ---------------------------------------------------------------------------
// WalkConfig
// ---------------------------------------------------------------------------

/// Traversal parameters handed to [`FileTree::walk`].
///
/// Callers configure these via the builder (`.threads()`).
#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub threads: usize,
}

// ---------------------------------------------------------------------------
// Engine options
// ---------------------------------------------------------------------------

/// Internal options passed from the builder to `run()`.
pub(crate) struct EngineOptions {
    pub config: WalkConfig,
    pub levels: Arc<LevelSet>,
    pub left: Box<dyn FileTree>,
    pub right: Box<dyn FileTree>,
    pub hasher: Box<dyn ContentHasher>,
}

// ---------------------------------------------------------------------------
// Tree index
// ---------------------------------------------------------------------------

/// Everything one tree yielded, keyed by normalized path. Lives for a single
/// assessment and is dropped with it.
#[derive(Default)]
struct TreeIndex {
    entries: BTreeMap<String, FileEntry>,
    /// Paths whose enumeration failed, with the rendered error.
    broken: BTreeMap<String, String>,
}

impl TreeIndex {
    fn build(side: &'static str, tree: &dyn FileTree, config: &WalkConfig) -> (Self, Vec<SimError>) {
        let mut index = Self::default();
        let mut errors = Vec::new();

        for item in tree.walk(config) {
            match item {
                Ok(mut entry) => {
                    entry.path = normalize_path(&entry.path);
                    if entry.path == "/" {
                        continue;
                    }
                    index.entries.entry(entry.path.clone()).or_insert(entry);
                }
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| normalize_path(&p.to_string_lossy()))
                        .unwrap_or_else(|| "/".to_string());
                    tracing::warn!(side, path = %path, error = %describe(&err), "cannot enumerate entry");
                    index.broken.insert(path, describe(&err));
                    errors.push(err);
                }
            }
        }

        tracing::debug!(
            side,
            entries = index.entries.len(),
            errors = errors.len(),
            "tree indexed"
        );
        (index, errors)
    }

    /// The enumeration error covering `path`: one recorded on the path
    /// itself or on any ancestor, up to and including `/`.
    fn broken_at(&self, path: &str) -> Option<&String> {
        if self.broken.is_empty() {
            return None;
        }
        let mut cur = path;
        loop {
            if let Some(msg) = self.broken.get(cur) {
                return Some(msg);
            }
            if cur == "/" {
                return None;
            }
            cur = match cur.rfind('/') {
                Some(0) | None => "/",
                Some(i) => &cur[..i],
            };
        }
    }

    fn overlap(&self, other: &Self, folders: bool) -> ListComparison {
        let pick = |idx: &Self| -> Vec<String> {
            idx.entries
                .values()
                .filter(|e| (e.kind == EntryKind::Dir) == folders)
                .map(|e| e.path.clone())
                .collect()
        };
        ListComparison::compare(pick(self), pick(other))
    }
}

// ---------------------------------------------------------------------------
// Level evaluation
// ---------------------------------------------------------------------------

/// Everything a level needs to evaluate, shared read-only across workers.
struct Inputs<'a> {
    left: &'a TreeIndex,
    right: &'a TreeIndex,
    /// Union of every path known on either side, sorted.
    all_paths: &'a [&'a str],
    comparator: ContentComparator<'a>,
}

/// Evaluate one level: PENDING -> EVALUATING -> SATISFIED | MISMATCHED.
fn evaluate(level: &LevelDefinition, inputs: &Inputs<'_>) -> ComparisonResult {
    let state = LevelState::Pending;
    tracing::debug!(level = level.name(), ?state);

    let state = LevelState::Evaluating;
    tracing::debug!(level = level.name(), ?state);

    let mut mismatches = Vec::new();

    // A tree that could not be listed from the root says nothing about any
    // path, so every level that has candidates at all fails.
    let root_broken = inputs
        .left
        .broken
        .get("/")
        .or_else(|| inputs.right.broken.get("/"));
    if let Some(msg) = root_broken {
        if !level.filter().is_vacuous() {
            mismatches.push(Mismatch {
                path: "/".to_string(),
                reason: MismatchReason::Unreadable(msg.clone()),
            });
        }
        return finish(level, mismatches);
    }

    let mut check = |path: &str| {
        let candidacy = level.classify(path);
        if candidacy == Candidacy::Excluded {
            return;
        }

        let broken = inputs
            .left
            .broken_at(path)
            .or_else(|| inputs.right.broken_at(path));
        let reason = match broken {
            Some(msg) => Some(MismatchReason::Unreadable(msg.clone())),
            None => {
                let l = inputs.left.entries.get(path);
                let r = inputs.right.entries.get(path);
                if candidacy == Candidacy::Content || level.hash_content() {
                    inputs.comparator.compare(l, r)
                } else {
                    presence(l, r)
                }
            }
        };

        if let Some(reason) = reason {
            mismatches.push(Mismatch {
                path: path.to_string(),
                reason,
            });
        }
    };

    match level.filter().include() {
        // Only the named files can be candidates; no need to scan the union.
        IncludePattern::Nothing => level.filter().assess_content().for_each(&mut check),
        _ => inputs.all_paths.iter().copied().for_each(&mut check),
    }

    finish(level, mismatches)
}

fn finish(level: &LevelDefinition, mismatches: Vec<Mismatch>) -> ComparisonResult {
    let state = if mismatches.is_empty() {
        LevelState::Satisfied
    } else {
        LevelState::Mismatched
    };
    tracing::debug!(level = level.name(), ?state, mismatches = mismatches.len());

    ComparisonResult {
        level_name: level.name().to_string(),
        satisfied: mismatches.is_empty(),
        mismatches,
    }
}

/// Presence-only comparison: same existence, same kind.
fn presence(left: Option<&FileEntry>, right: Option<&FileEntry>) -> Option<MismatchReason> {
    match (left, right) {
        (None, None) => None,
        (Some(_), None) => Some(MismatchReason::OnlyInLeft),
        (None, Some(_)) => Some(MismatchReason::OnlyInRight),
        (Some(l), Some(r)) if l.kind != r.kind => Some(MismatchReason::KindDiffers {
            left: l.kind,
            right: r.kind,
        }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// run()
// ---------------------------------------------------------------------------

/// Index both trees, evaluate every level and assemble the report.
///
/// This is the core engine — all parallelism lives here.
/// Called by `AssessBuilder::run()` after validating inputs.
pub(crate) fn run(opts: EngineOptions) -> Result<Report, SimError> {
    let start = Instant::now();
    let config = &opts.config;

    // Index both sides at once.
    let ((left, left_errors), (right, right_errors)) = std::thread::scope(|s| {
        let l = s.spawn(|| TreeIndex::build("left", opts.left.as_ref(), config));
        let r = s.spawn(|| TreeIndex::build("right", opts.right.as_ref(), config));
        Ok::<_, SimError>((join(l.join())?, join(r.join())?))
    })?;

    let all_paths: Vec<&str> = left
        .entries
        .keys()
        .chain(right.entries.keys())
        .chain(left.broken.keys())
        .chain(right.broken.keys())
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let hashed = AtomicUsize::new(0);
    let inputs = Inputs {
        left: &left,
        right: &right,
        all_paths: &all_paths,
        comparator: ContentComparator {
            hasher: opts.hasher.as_ref(),
            left: opts.left.as_ref(),
            right: opts.right.as_ref(),
            hashed: &hashed,
        },
    };

    let levels: Vec<&LevelDefinition> = opts.levels.iter().collect();
    let workers = config.threads.clamp(1, levels.len().max(1));

    let results: Vec<ComparisonResult> = if workers == 1 {
        levels.iter().map(|level| evaluate(level, &inputs)).collect()
    } else {
        // Contiguous chunks, joined in order, keep declaration order.
        let chunk = levels.len().div_ceil(workers);
        std::thread::scope(|s| {
            let handles: Vec<_> = levels
                .chunks(chunk)
                .map(|group| {
                    let inputs = &inputs;
                    s.spawn(move || {
                        group
                            .iter()
                            .map(|level| evaluate(level, inputs))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(levels.len());
            for handle in handles {
                results.extend(join(handle.join())?);
            }
            Ok::<_, SimError>(results)
        })?
    };

    let overlap = TreeOverlap {
        files: left.overlap(&right, false),
        folders: left.overlap(&right, true),
    };

    let mut errors = left_errors;
    errors.extend(right_errors);

    let report = Report {
        levels: results,
        overlap,
        stats: AssessStats {
            left_entries: left.entries.len(),
            right_entries: right.entries.len(),
            fingerprints: hashed.load(Ordering::Relaxed),
            duration: start.elapsed(),
        },
        errors,
    };

    tracing::info!(
        levels = report.levels.len(),
        satisfied = ?report.satisfied().collect::<Vec<_>>(),
        fingerprints = report.stats.fingerprints,
        duration_ms = report.stats.duration.as_millis() as u64,
        "assessment finished"
    );
    Ok(report)
}

fn join<T>(res: std::thread::Result<T>) -> Result<T, SimError> {
    res.map_err(|panic| {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string());
        SimError::Worker(msg)
    })
}
