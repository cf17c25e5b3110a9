//! Symptom taxonomy. Category → symptom → variant → remedy.
//!
//! The data file keeps the lookup tables flat (a variant table keyed by
//! symptom, a `Symptom_Code` remedy table and a direct-remedy table). They are
//! cross-checked against each other and against the knowledge base before a
//! [`Taxonomy`] is handed out, so lookups during a conversation never hit a
//! dangling reference.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::TaxonomyError;
use crate::knowledge::{KnowledgeBase, RemedyKey};

/// Universal "none of these" option, appended to every symptom list.
pub const NONE_TOKEN: &str = "無";

/// Category-stage token for "no category fits", which bypasses the menu.
pub const BYPASS_TOKEN: &str = "X";

const BUILTIN_TAXONOMY: &str = include_str!("../data/taxonomy.json");

// ── Raw tables ──────────────────────────────────────────────────────────

/// Category row as written in the data file.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryTable {
    pub code: String,
    pub name: String,
    pub symptoms: Vec<String>,
}

/// The taxonomy data file, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyTables {
    pub categories: Vec<CategoryTable>,
    /// symptom → variant code → description.
    #[serde(default)]
    pub variants: BTreeMap<String, BTreeMap<String, String>>,
    /// `Symptom_Code` → remedy.
    #[serde(default)]
    pub variant_remedies: HashMap<String, RemedyKey>,
    /// symptom → remedy, for symptoms without variants.
    #[serde(default)]
    pub direct_remedies: HashMap<String, RemedyKey>,
}

// ── Validated model ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub code: String,
    pub name: String,
    /// Presentation order.
    pub symptoms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub code: String,
    pub description: String,
    pub remedy: RemedyKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymptomKind {
    /// Maps straight to one remedy.
    Direct(RemedyKey),
    /// Needs a variant code; ordered by code.
    Variants(Vec<Variant>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symptom {
    pub name: String,
    /// Code of the owning category.
    pub category: String,
    pub kind: SymptomKind,
}

impl Symptom {
    pub fn is_direct(&self) -> bool {
        matches!(self.kind, SymptomKind::Direct(_))
    }

    pub fn variant(&self, code: &str) -> Option<&Variant> {
        match &self.kind {
            SymptomKind::Direct(_) => None,
            SymptomKind::Variants(variants) => variants.iter().find(|v| v.code == code),
        }
    }
}

/// Validated, read-only symptom taxonomy.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<Category>,
    symptoms: HashMap<String, Symptom>,
}

impl Taxonomy {
    /// Validate `tables` and check every referenced remedy exists in `kb`.
    pub fn from_tables(tables: TaxonomyTables, kb: &KnowledgeBase) -> Result<Self, TaxonomyError> {
        if tables.categories.is_empty() {
            return Err(TaxonomyError::NoCategories);
        }

        let mut categories = Vec::with_capacity(tables.categories.len());
        let mut owner: HashMap<String, String> = HashMap::new();
        let mut seen_codes = HashSet::new();

        for row in tables.categories {
            check_code(&row.code, "category")?;
            if row.code == BYPASS_TOKEN {
                return Err(TaxonomyError::ReservedToken {
                    token: row.code,
                    context: "a category code".to_string(),
                });
            }
            if !seen_codes.insert(row.code.clone()) {
                return Err(TaxonomyError::DuplicateCategory(row.code));
            }
            if row.symptoms.is_empty() {
                return Err(TaxonomyError::EmptyCategory(row.code));
            }

            for symptom in &row.symptoms {
                if symptom == NONE_TOKEN || symptom == BYPASS_TOKEN {
                    return Err(TaxonomyError::ReservedToken {
                        token: symptom.clone(),
                        context: format!("a symptom name in category {}", row.code),
                    });
                }
                if let Some(first) = owner.insert(symptom.clone(), row.code.clone()) {
                    return Err(TaxonomyError::DuplicateSymptom {
                        symptom: symptom.clone(),
                        first,
                        second: row.code.clone(),
                    });
                }
            }

            categories.push(Category {
                code: row.code,
                name: row.name,
                symptoms: row.symptoms,
            });
        }

        // Every table entry must name a declared symptom.
        let mut table_symptoms: Vec<&String> = tables
            .variants
            .keys()
            .chain(tables.direct_remedies.keys())
            .collect();
        table_symptoms.sort();
        if let Some(name) = table_symptoms.into_iter().find(|n| !owner.contains_key(*n)) {
            return Err(TaxonomyError::UndeclaredSymptom(name.clone()));
        }

        // Every remedy mapping must belong to a declared variant.
        let mut remedy_keys: Vec<&String> = tables.variant_remedies.keys().collect();
        remedy_keys.sort();
        for key in remedy_keys {
            let (symptom, code) = key
                .rsplit_once('_')
                .ok_or_else(|| TaxonomyError::MalformedVariantKey(key.clone()))?;
            let declared = tables
                .variants
                .get(symptom)
                .is_some_and(|codes| codes.contains_key(code));
            if !declared {
                return Err(TaxonomyError::RemedyWithoutVariant(key.clone()));
            }
        }

        let mut symptoms = HashMap::with_capacity(owner.len());
        for category in &categories {
            for name in &category.symptoms {
                let direct = tables.direct_remedies.get(name);
                let variants = tables.variants.get(name);

                let kind = match (direct, variants) {
                    (Some(_), Some(_)) => return Err(TaxonomyError::AmbiguousSymptom(name.clone())),
                    (None, None) => return Err(TaxonomyError::UnmappedSymptom(name.clone())),
                    (Some(remedy), None) => {
                        require_remedy(kb, remedy, name)?;
                        SymptomKind::Direct(remedy.clone())
                    }
                    (None, Some(codes)) => {
                        if codes.is_empty() {
                            return Err(TaxonomyError::EmptyVariants(name.clone()));
                        }
                        let mut resolved = Vec::with_capacity(codes.len());
                        for (code, description) in codes {
                            check_code(code, &format!("a variant of {name}"))?;
                            if code == BYPASS_TOKEN {
                                return Err(TaxonomyError::ReservedToken {
                                    token: code.clone(),
                                    context: format!("a variant code of {name}"),
                                });
                            }
                            let key = variant_key(name, code);
                            let remedy = tables.variant_remedies.get(&key).ok_or_else(|| {
                                TaxonomyError::VariantWithoutRemedy {
                                    symptom: name.clone(),
                                    code: code.clone(),
                                }
                            })?;
                            require_remedy(kb, remedy, &key)?;
                            resolved.push(Variant {
                                code: code.clone(),
                                description: description.clone(),
                                remedy: remedy.clone(),
                            });
                        }
                        SymptomKind::Variants(resolved)
                    }
                };

                symptoms.insert(
                    name.clone(),
                    Symptom {
                        name: name.clone(),
                        category: category.code.clone(),
                        kind,
                    },
                );
            }
        }

        Ok(Self {
            categories,
            symptoms,
        })
    }

    pub fn from_json(json: &str, kb: &KnowledgeBase) -> Result<Self, TaxonomyError> {
        let tables: TaxonomyTables =
            serde_json::from_str(json).map_err(|source| TaxonomyError::Parse {
                what: "symptom taxonomy".to_string(),
                source,
            })?;
        Self::from_tables(tables, kb)
    }

    /// The taxonomy compiled into the binary.
    pub fn builtin(kb: &KnowledgeBase) -> Result<Self, TaxonomyError> {
        Self::from_json(BUILTIN_TAXONOMY, kb)
    }

    /// Load from `path`, or the built-in data when no override is given.
    pub fn load(path: Option<&Path>, kb: &KnowledgeBase) -> Result<Self, TaxonomyError> {
        match path {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_json(&json, kb)
            }
            None => Self::builtin(kb),
        }
    }

    /// Categories in menu order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, code: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.code == code)
    }

    /// Symptom names of a category in menu order, terminated by [`NONE_TOKEN`].
    pub fn symptoms_of(&self, code: &str) -> Option<Vec<&str>> {
        let category = self.category(code)?;
        let mut names: Vec<&str> = category.symptoms.iter().map(String::as_str).collect();
        names.push(NONE_TOKEN);
        Some(names)
    }

    pub fn symptom(&self, name: &str) -> Option<&Symptom> {
        self.symptoms.get(name)
    }

    /// Look up `name` only among the symptoms of category `code`.
    pub fn symptom_in(&self, code: &str, name: &str) -> Option<&Symptom> {
        self.symptom(name).filter(|s| s.category == code)
    }

    /// `(code, description)` pairs in code order; empty for direct symptoms.
    pub fn variants_of(&self, symptom: &str) -> Vec<(&str, &str)> {
        match self.symptom(symptom).map(|s| &s.kind) {
            Some(SymptomKind::Variants(variants)) => variants
                .iter()
                .map(|v| (v.code.as_str(), v.description.as_str()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Resolve a symptom (and variant code, for variant symptoms) to its
    /// remedy. The code is ignored for direct symptoms.
    pub fn resolve(&self, symptom: &str, variant: Option<&str>) -> Option<&RemedyKey> {
        let symptom = self.symptom(symptom)?;
        match &symptom.kind {
            SymptomKind::Direct(remedy) => Some(remedy),
            SymptomKind::Variants(_) => symptom.variant(variant?).map(|v| &v.remedy),
        }
    }

    /// Every remedy the taxonomy can resolve to, sorted and deduplicated.
    pub fn remedy_keys(&self) -> Vec<&RemedyKey> {
        let mut keys: Vec<&RemedyKey> = self
            .symptoms
            .values()
            .flat_map(|s| match &s.kind {
                SymptomKind::Direct(remedy) => vec![remedy],
                SymptomKind::Variants(variants) => variants.iter().map(|v| &v.remedy).collect(),
            })
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn symptom_count(&self) -> usize {
        self.symptoms.len()
    }
}

fn variant_key(symptom: &str, code: &str) -> String {
    format!("{symptom}_{code}")
}

fn check_code(code: &str, context: &str) -> Result<(), TaxonomyError> {
    let mut chars = code.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Ok(()),
        _ => Err(TaxonomyError::InvalidCode {
            context: context.to_string(),
            code: code.to_string(),
        }),
    }
}

fn require_remedy(
    kb: &KnowledgeBase,
    remedy: &RemedyKey,
    referenced_by: &str,
) -> Result<(), TaxonomyError> {
    if kb.contains(remedy.as_str()) {
        Ok(())
    } else {
        Err(TaxonomyError::MissingRemedy {
            remedy: remedy.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }
}
