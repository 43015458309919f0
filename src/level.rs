//! Similarity level definitions and their loader.
//!
//! A level file is a JSON object mapping level name to definition:
//!
//! ```json
//! {
//!     "RUNSCRIPT": {
//!         "description": "same default runscript",
//!         "regexp": "$^",
//!         "assess_content": ["/singularity"]
//!     }
//! }
//! ```
//!
//! Keys are `description`, `regexp`, `skip_files`, `assess_content` and
//! `hash_content`; any other key is rejected. Level order is document order.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::SimError;
use crate::filter::{Candidacy, IncludePattern, PathFilter};

/// The five levels shipped with the crate, most to least strict.
pub const BUILTIN_LEVELS_JSON: &str = include_str!("../data/levels.json");

// ---------------------------------------------------------------------------
// Wire schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLevel {
    #[serde(default)]
    description: String,
    #[serde(default)]
    regexp: Option<String>,
    #[serde(default)]
    skip_files: Vec<String>,
    #[serde(default)]
    assess_content: Vec<String>,
    #[serde(default)]
    hash_content: bool,
}

/// Top-level object, kept in document order.
struct RawLevels(Vec<(String, RawLevel)>);

impl<'de> Deserialize<'de> for RawLevels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = RawLevels;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of level name to level definition")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<RawLevels, M::Error> {
                let mut levels = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, level)) = map.next_entry::<String, RawLevel>()? {
                    levels.push((name, level));
                }
                Ok(RawLevels(levels))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

// ---------------------------------------------------------------------------
// LevelDefinition
// ---------------------------------------------------------------------------

/// One named similarity tier. The name is an opaque key.
#[derive(Debug, Clone)]
pub struct LevelDefinition {
    name: String,
    description: String,
    filter: PathFilter,
    hash_content: bool,
}

impl LevelDefinition {
    /// Build a level in code. `regexp` follows the file format: `None`
    /// includes every path, `""` or `"$^"` includes none.
    pub fn new<S, A>(
        name: impl Into<String>,
        regexp: Option<&str>,
        skip_files: S,
        assess_content: A,
    ) -> Result<Self, SimError>
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(SimError::EmptyLevelName);
        }
        let include = IncludePattern::compile(regexp).map_err(|source| SimError::InvalidPattern {
            level: name.clone(),
            pattern: regexp.unwrap_or_default().to_string(),
            source,
        })?;
        Ok(Self {
            name,
            description: String::new(),
            filter: PathFilter::new(include, skip_files, assess_content),
            hash_content: false,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Also compare content of presence candidates found in both trees.
    pub fn with_hash_content(mut self, yes: bool) -> Self {
        self.hash_content = yes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    pub fn hash_content(&self) -> bool {
        self.hash_content
    }

    /// Shorthand for `self.filter().classify(path)`.
    pub fn classify(&self, path: &str) -> Candidacy {
        self.filter.classify(path)
    }

    fn from_raw(name: String, raw: RawLevel) -> Result<Self, SimError> {
        Ok(Self::new(name, raw.regexp.as_deref(), raw.skip_files, raw.assess_content)?
            .with_description(raw.description)
            .with_hash_content(raw.hash_content))
    }
}

// ---------------------------------------------------------------------------
// LevelSet
// ---------------------------------------------------------------------------

/// An ordered, validated table of levels. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct LevelSet {
    levels: Vec<LevelDefinition>,
}

impl LevelSet {
    /// Parse and validate a level file. Fails on the first bad entry;
    /// there is no partial load.
    pub fn from_json_str(raw: &str) -> Result<Self, SimError> {
        let RawLevels(raw_levels) = serde_json::from_str(raw)?;
        let levels = raw_levels
            .into_iter()
            .map(|(name, raw)| LevelDefinition::from_raw(name, raw))
            .collect::<Result<Vec<_>, _>>()?;
        let set = Self::from_levels(levels)?;
        tracing::debug!(levels = set.len(), "level definitions loaded");
        Ok(set)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SimError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Build from levels constructed in code. Names must be unique.
    pub fn from_levels(levels: Vec<LevelDefinition>) -> Result<Self, SimError> {
        let mut seen = HashSet::with_capacity(levels.len());
        for level in &levels {
            if !seen.insert(level.name.as_str()) {
                return Err(SimError::DuplicateLevel(level.name.clone()));
            }
        }
        Ok(Self { levels })
    }

    /// The shipped IDENTICAL, REPLICATE, RUNSCRIPT, ENVIRONMENT and RECIPE
    /// levels.
    pub fn builtin() -> Result<Self, SimError> {
        Self::from_json_str(BUILTIN_LEVELS_JSON)
    }

    /// The built-in table, parsed once per process and shared read-only.
    pub fn shared_builtin() -> Result<Arc<Self>, SimError> {
        static BUILTIN: OnceLock<Arc<LevelSet>> = OnceLock::new();
        if let Some(set) = BUILTIN.get() {
            return Ok(Arc::clone(set));
        }
        let set = Arc::new(Self::builtin()?);
        Ok(Arc::clone(BUILTIN.get_or_init(|| set)))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LevelDefinition> {
        self.levels.iter()
    }

    pub fn get(&self, name: &str) -> Option<&LevelDefinition> {
        self.levels.iter().find(|l| l.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|l| l.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl<'a> IntoIterator for &'a LevelSet {
    type Item = &'a LevelDefinition;
    type IntoIter = std::slice::Iter<'a, LevelDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.levels.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_levels_load_in_order() {
        let set = LevelSet::builtin().unwrap();
        let names: Vec<_> = set.names().collect();
        assert_eq!(
            names,
            ["IDENTICAL", "REPLICATE", "RUNSCRIPT", "ENVIRONMENT", "RECIPE"]
        );
        let replicate = set.get("REPLICATE").unwrap();
        assert!(replicate.hash_content());
        assert_eq!(replicate.classify("/etc/resolv.conf"), Candidacy::Excluded);
        let runscript = set.get("RUNSCRIPT").unwrap();
        assert_eq!(runscript.classify("/singularity"), Candidacy::Content);
        assert_eq!(runscript.classify("/bin/sh"), Candidacy::Excluded);
    }

    #[test]
    fn replicate_skips_only_named_files() {
        let set = LevelSet::builtin().unwrap();
        let replicate = set.get("REPLICATE").unwrap();
        for dir in ["/tmp", "/dev", "/proc", "/sys"] {
            assert!(!replicate.filter().skip_files().any(|s| s == dir), "{dir}");
            assert_eq!(replicate.classify(dir), Candidacy::Presence);
        }
        // A skipped entry does not hide what sits below it.
        assert_eq!(replicate.classify("/etc/hosts"), Candidacy::Excluded);
        assert_eq!(replicate.classify("/etc/hosts/extra"), Candidacy::Presence);
    }

    #[test]
    fn order_follows_document_not_alphabet() {
        let set = LevelSet::from_json_str(r#"{"ZULU": {}, "ALPHA": {}, "MIKE": {}}"#).unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), ["ZULU", "ALPHA", "MIKE"]);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = LevelSet::from_json_str(r#"{"X": {"regex": "."}}"#).unwrap_err();
        assert!(matches!(err, SimError::Parse(_)));
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let err = LevelSet::from_json_str(r#"{"X": {"skip_files": "/etc/hosts"}}"#).unwrap_err();
        assert!(err.is_config());
        let err = LevelSet::from_json_str(r#"["IDENTICAL"]"#).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn bad_pattern_names_the_level() {
        let err = LevelSet::from_json_str(r#"{"OK": {}, "BROKEN": {"regexp": "[a-"}}"#)
            .unwrap_err();
        match err {
            SimError::InvalidPattern { level, pattern, .. } => {
                assert_eq!(level, "BROKEN");
                assert_eq!(pattern, "[a-");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_and_empty_names_are_rejected() {
        let err = LevelSet::from_json_str(r#"{"A": {}, "A": {}}"#).unwrap_err();
        assert!(matches!(err, SimError::DuplicateLevel(name) if name == "A"));
        let err = LevelSet::from_json_str(r#"{"": {}}"#).unwrap_err();
        assert!(matches!(err, SimError::EmptyLevelName));
    }

    #[test]
    fn shared_builtin_is_one_table() {
        let a = LevelSet::shared_builtin().unwrap();
        let b = LevelSet::shared_builtin().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = LevelSet::from_path("/definitely/not/here/levels.json").unwrap_err();
        assert!(matches!(err, SimError::ConfigIo { .. }));
    }
}
