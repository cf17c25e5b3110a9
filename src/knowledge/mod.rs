//! Remedy knowledge base. Immutable monographs keyed by remedy name.
//!
//! Loaded once at startup, either from the compiled-in data file or from an
//! operator-supplied override, and shared read-only afterwards.

pub mod model;

pub use model::{Monograph, RemedyKey, Section};

use std::collections::HashMap;
use std::path::Path;

use crate::error::TaxonomyError;

/// Monographs shipped with the binary.
const BUILTIN_REMEDIES: &str = include_str!("../../data/remedies.json");

/// Read-only mapping from remedy name to monograph.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    remedies: HashMap<RemedyKey, Monograph>,
}

impl KnowledgeBase {
    /// Build from already-parsed monographs. Every monograph must carry at
    /// least one section.
    pub fn new(remedies: HashMap<RemedyKey, Monograph>) -> Result<Self, TaxonomyError> {
        if let Some((key, _)) = remedies.iter().find(|(_, m)| m.sections.is_empty()) {
            return Err(TaxonomyError::EmptyMonograph(key.to_string()));
        }
        Ok(Self { remedies })
    }

    /// Parse a JSON object of `{ remedy: { sections, image_url? } }`.
    pub fn from_json(json: &str) -> Result<Self, TaxonomyError> {
        let remedies: HashMap<RemedyKey, Monograph> =
            serde_json::from_str(json).map_err(|source| TaxonomyError::Parse {
                what: "remedy monographs".to_string(),
                source,
            })?;
        Self::new(remedies)
    }

    /// The monographs compiled into the binary.
    pub fn builtin() -> Result<Self, TaxonomyError> {
        Self::from_json(BUILTIN_REMEDIES)
    }

    /// Load from `path`, or the built-in data when no override is given.
    pub fn load(path: Option<&Path>) -> Result<Self, TaxonomyError> {
        match path {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_json(&json)
            }
            None => Self::builtin(),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&Monograph> {
        self.remedies.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.remedies.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.remedies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remedies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_loads() {
        let kb = KnowledgeBase::builtin().unwrap();
        assert!(!kb.is_empty());
        let mint = kb.lookup("薄荷").unwrap();
        assert!(mint.section("功效").is_some());
        assert!(mint.section("注意事項").is_some());
    }

    #[test]
    fn every_builtin_monograph_has_the_standard_sections() {
        let kb = KnowledgeBase::builtin().unwrap();
        for (key, monograph) in &kb.remedies {
            for label in ["主要成分", "功效", "使用方式", "建議用量", "注意事項"] {
                assert!(
                    monograph.section(label).is_some(),
                    "{key} is missing section {label}"
                );
            }
        }
    }

    #[test]
    fn lookup_unknown_is_none() {
        let kb = KnowledgeBase::builtin().unwrap();
        assert!(kb.lookup("人參果").is_none());
        assert!(!kb.contains("人參果"));
    }

    #[test]
    fn empty_monograph_is_rejected() {
        let err = KnowledgeBase::from_json(r#"{"薄荷": {"sections": []}}"#).unwrap_err();
        assert!(matches!(err, TaxonomyError::EmptyMonograph(ref k) if k == "薄荷"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = KnowledgeBase::from_json("{not json").unwrap_err();
        assert!(matches!(err, TaxonomyError::Parse { .. }));
    }

    #[test]
    fn load_from_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"左手香": {{"sections": [{{"label": "功效", "lines": ["消腫止癢"]}}], "image_url": "https://img.example/a.jpg"}}}}"#
        )
        .unwrap();

        let kb = KnowledgeBase::load(Some(file.path())).unwrap();
        assert_eq!(kb.len(), 1);
        let monograph = kb.lookup("左手香").unwrap();
        assert_eq!(monograph.image_url.as_deref(), Some("https://img.example/a.jpg"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = KnowledgeBase::load(Some(Path::new("/nonexistent/remedies.json"))).unwrap_err();
        assert!(matches!(err, TaxonomyError::Io { .. }));
    }
}
