use std::collections::BTreeSet;

use regex::Regex;

// ---------------------------------------------------------------------------
// Path normalization
// ---------------------------------------------------------------------------

/// Normalize a tree path to the root-relative POSIX form used everywhere
/// in comparisons: one leading `/`, no trailing `/`, no `.` or empty
/// segments. `..` never climbs above the root.
///
/// ```rust
/// use simlevel::filter::normalize_path;
///
/// assert_eq!(normalize_path("etc//resolv.conf"), "/etc/resolv.conf");
/// assert_eq!(normalize_path("./.singularity.d/"), "/.singularity.d");
/// assert_eq!(normalize_path(""), "/");
/// ```
pub fn normalize_path(raw: &str) -> String {
    let raw = raw.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for seg in raw.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    let mut out = String::with_capacity(raw.len() + 1);
    for p in &parts {
        out.push('/');
        out.push_str(p);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

// ---------------------------------------------------------------------------
// Include pattern
// ---------------------------------------------------------------------------

/// Path-based inclusion rule of a level.
#[derive(Debug, Clone)]
pub enum IncludePattern {
    /// No `regexp` configured: every path is a presence candidate.
    All,

    /// `regexp` is empty or the `$^` sentinel: no path is a presence
    /// candidate, only `assess_content` paths are compared.
    Nothing,

    /// Any other pattern, matched with search semantics.
    Regex(Regex),
}

/// The pattern that can never match a path.
pub const MATCH_NOTHING: &str = "$^";

impl IncludePattern {
    /// Build from the raw `regexp` value of a level definition.
    pub fn compile(raw: Option<&str>) -> Result<Self, regex::Error> {
        match raw {
            None => Ok(Self::All),
            Some(p) if p.is_empty() || p == MATCH_NOTHING => Ok(Self::Nothing),
            Some(p) => Regex::new(p).map(Self::Regex),
        }
    }

    pub fn is_match(&self, path: &str) -> bool {
        match self {
            Self::All => true,
            Self::Nothing => false,
            Self::Regex(re) => re.is_match(path),
        }
    }

    /// The source text, for logs and serialization.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Nothing => Some(MATCH_NOTHING),
            Self::Regex(re) => Some(re.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// PathFilter
// ---------------------------------------------------------------------------

/// How a single path takes part in one level's comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidacy {
    /// Never compared by any means.
    Excluded,

    /// Compared by presence (and by content if the level hashes its
    /// presence candidates).
    Presence,

    /// Listed in `assess_content`: compared by presence and content,
    /// regardless of the include pattern.
    Content,
}

/// Decides candidacy of root-relative paths for one level.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: IncludePattern,
    skip: BTreeSet<String>,
    assess: BTreeSet<String>,
}

impl PathFilter {
    /// `skip` and `assess` are normalized here; callers may pass raw
    /// configuration strings.
    pub fn new<S, A>(include: IncludePattern, skip: S, assess: A) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Self {
            include,
            skip: skip.into_iter().map(|p| normalize_path(p.as_ref())).collect(),
            assess: assess.into_iter().map(|p| normalize_path(p.as_ref())).collect(),
        }
    }

    /// Classify an already normalized path.
    pub fn classify(&self, path: &str) -> Candidacy {
        if path == "/" || self.skip.contains(path) {
            return Candidacy::Excluded;
        }
        if self.assess.contains(path) {
            return Candidacy::Content;
        }
        if self.include.is_match(path) {
            Candidacy::Presence
        } else {
            Candidacy::Excluded
        }
    }

    pub fn include(&self) -> &IncludePattern {
        &self.include
    }

    pub fn skip_files(&self) -> impl Iterator<Item = &str> {
        self.skip.iter().map(String::as_str)
    }

    pub fn assess_content(&self) -> impl Iterator<Item = &str> {
        self.assess.iter().map(String::as_str)
    }

    /// True when no path can ever be a candidate.
    pub fn is_vacuous(&self) -> bool {
        matches!(self.include, IncludePattern::Nothing) && self.assess.is_empty()
    }
}
