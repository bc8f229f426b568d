//! Criteria compilation and flat query execution.
//!
//! A search compiles to a conjunction of up to three clauses, always in
//! group, artifact, classnames order. Group and artifact criteria are
//! sourced terms: exact, case-sensitive field equality. The class-name
//! criterion is a user-input expression: wildcards are interpreted and
//! matching is case-insensitive, applied per contained-class entry with
//! implicit containment. An empty conjunction matches every record.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::fmt;

use crate::store::{IndexRecord, IndexStore};

/// What to search for. Every field is optional and an empty string counts
/// as absent; a record must satisfy all present criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub class_name: Option<String>,
}

impl SearchCriteria {
    /// The class-name criterion, with empty strings treated as absent.
    pub fn class_name_pattern(&self) -> Option<&str> {
        non_empty(self.class_name.as_deref())
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
enum Clause {
    GroupId(String),
    ArtifactId(String),
    ClassNames { raw: String, matcher: GlobMatcher },
}

impl Clause {
    fn matches(&self, record: &IndexRecord) -> bool {
        match self {
            Clause::GroupId(term) => record.group_id.as_deref() == Some(term.as_str()),
            Clause::ArtifactId(term) => record.artifact_id.as_deref() == Some(term.as_str()),
            Clause::ClassNames { matcher, .. } => {
                let Some(blob) = record.classnames.as_deref() else {
                    return false;
                };
                blob.lines()
                    .any(|entry| matcher.is_match(normalize_class_entry(entry)))
            }
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::GroupId(term) => write!(f, "+group-id:{term}"),
            Clause::ArtifactId(term) => write!(f, "+artifact-id:{term}"),
            Clause::ClassNames { raw, .. } => write!(f, "+classnames:{raw}"),
        }
    }
}

/// A compiled conjunctive query.
#[derive(Debug, Clone, Default)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// True when every clause accepts the record. The empty conjunction
    /// accepts everything.
    pub fn matches(&self, record: &IndexRecord) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

/// Compiles criteria into a query. Fails only when the class-name
/// expression is not a valid wildcard pattern.
pub fn compile(criteria: &SearchCriteria) -> Result<Query> {
    let mut clauses = Vec::new();
    if let Some(group_id) = non_empty(criteria.group_id.as_deref()) {
        clauses.push(Clause::GroupId(group_id.to_string()));
    }
    if let Some(artifact_id) = non_empty(criteria.artifact_id.as_deref()) {
        clauses.push(Clause::ArtifactId(artifact_id.to_string()));
    }
    if let Some(pattern) = criteria.class_name_pattern() {
        clauses.push(Clause::ClassNames {
            raw: pattern.to_string(),
            matcher: class_name_matcher(pattern)?,
        });
    }
    Ok(Query { clauses })
}

/// Flat search: every matching record, in the store's key order. No
/// ranking, no pagination.
pub fn execute(query: &Query, store: &IndexStore) -> Result<Vec<IndexRecord>> {
    let mut records = store.records()?;
    records.retain(|record| query.matches(record));
    Ok(records)
}

/// Wildcard matcher for a class-name expression: `*` and `?` interpreted,
/// case-insensitive, and wrapped in `*...*` so a bare name matches anywhere
/// within an entry.
fn class_name_matcher(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(&format!("*{pattern}*"))
        .case_insensitive(true)
        .build()
        .with_context(|| format!("Invalid class name expression: {pattern}"))?;
    Ok(glob.compile_matcher())
}

/// Entries are published in path form (`/com/foo/Bar`); matching happens on
/// the dotted form with the leading dot dropped.
fn normalize_class_entry(entry: &str) -> String {
    let dotted = entry.replace('/', ".");
    match dotted.strip_prefix('.') {
        Some(stripped) => stripped.to_string(),
        None => dotted,
    }
}
