use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Prefix of placeholder targets awaiting resolution
pub const REF_PREFIX: &str = "ref::";

/// Prefix of targets that live outside the analyzed tree
pub const EXTERNAL_PREFIX: &str = "external::";

/// Kind of knowledge-graph entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Module,
    Class,
    Function,
    Method,
    Variable,
    Document,
    Section,
    ConfigKey,
    Commit,
    Author,
    TestRun,
    CoverageReport,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        Self::Module,
        Self::Class,
        Self::Function,
        Self::Method,
        Self::Variable,
        Self::Document,
        Self::Section,
        Self::ConfigKey,
        Self::Commit,
        Self::Author,
        Self::TestRun,
        Self::CoverageReport,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Variable => "variable",
            Self::Document => "document",
            Self::Section => "section",
            Self::ConfigKey => "config_key",
            Self::Commit => "commit",
            Self::Author => "author",
            Self::TestRun => "test_run",
            Self::CoverageReport => "coverage_report",
        }
    }

    /// Human-readable label, e.g. `Config Key`
    #[must_use]
    pub fn title(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GraphError::UnknownKind {
                field: "entity kind",
                value: s.to_string(),
            })
    }
}

/// Kind of directed edge between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Calls,
    Imports,
    Contains,
    Inherits,
    References,
    ChangedBy,
    Authored,
    Modified,
    Covers,
    ExecutedBy,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 10] = [
        Self::Calls,
        Self::Imports,
        Self::Contains,
        Self::Inherits,
        Self::References,
        Self::ChangedBy,
        Self::Authored,
        Self::Modified,
        Self::Covers,
        Self::ExecutedBy,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Contains => "contains",
            Self::Inherits => "inherits",
            Self::References => "references",
            Self::ChangedBy => "changed_by",
            Self::Authored => "authored",
            Self::Modified => "modified",
            Self::Covers => "covers",
            Self::ExecutedBy => "executed_by",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GraphError::UnknownKind {
                field: "relationship kind",
                value: s.to_string(),
            })
    }
}

/// Source location of an entity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(default)]
    pub column_start: usize,
    #[serde(default)]
    pub column_end: usize,
}

impl Location {
    pub fn new(file_path: impl Into<String>, line_start: usize, line_end: usize) -> Self {
        Self {
            file_path: file_path.into(),
            line_start,
            line_end,
            column_start: 0,
            column_end: 0,
        }
    }

    #[must_use]
    pub const fn with_columns(mut self, column_start: usize, column_end: usize) -> Self {
        self.column_start = column_start;
        self.column_end = column_end;
        self
    }
}

/// A named, located unit of knowledge
///
/// Identity is the `id` alone: two entities with the same id compare equal
/// regardless of their other fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    pub name: String,
    pub qualified_name: String,
    pub location: Location,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        kind: EntityKind,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            qualified_name: qualified_name.into(),
            location,
            docstring: None,
            signature: None,
            source_code: None,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_docstring(mut self, docstring: Option<String>) -> Self {
        self.docstring = docstring.filter(|doc| !doc.is_empty());
        self
    }

    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_code = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn file_path(&self) -> &str {
        &self.location.file_path
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Target of a relationship
///
/// Persisted in its flat string form: a plain entity id, `ref::<name>` for a
/// placeholder awaiting resolution, or `external::<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationshipTarget {
    Resolved(String),
    Unresolved(String),
    External(String),
}

impl RelationshipTarget {
    /// Entity id this target points at (the flat string form)
    pub fn id(&self) -> String {
        self.to_string()
    }

    /// Compare against an id without allocating
    pub fn matches_id(&self, id: &str) -> bool {
        match self {
            Self::Resolved(target) => target == id,
            Self::Unresolved(name) => id
                .strip_prefix(REF_PREFIX)
                .is_some_and(|rest| rest == name),
            Self::External(name) => id
                .strip_prefix(EXTERNAL_PREFIX)
                .is_some_and(|rest| rest == name),
        }
    }
}

impl From<String> for RelationshipTarget {
    fn from(raw: String) -> Self {
        if let Some(name) = raw.strip_prefix(REF_PREFIX) {
            Self::Unresolved(name.to_string())
        } else if let Some(name) = raw.strip_prefix(EXTERNAL_PREFIX) {
            Self::External(name.to_string())
        } else {
            Self::Resolved(raw)
        }
    }
}

impl From<&str> for RelationshipTarget {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<RelationshipTarget> for String {
    fn from(target: RelationshipTarget) -> Self {
        match target {
            RelationshipTarget::Resolved(id) => id,
            RelationshipTarget::Unresolved(name) => format!("{REF_PREFIX}{name}"),
            RelationshipTarget::External(name) => format!("{EXTERNAL_PREFIX}{name}"),
        }
    }
}

impl fmt::Display for RelationshipTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(id) => f.write_str(id),
            Self::Unresolved(name) => write!(f, "{REF_PREFIX}{name}"),
            Self::External(name) => write!(f, "{EXTERNAL_PREFIX}{name}"),
        }
    }
}

/// Directed, typed edge
///
/// Equality covers `(source_id, target, kind)` only; edge metadata does not
/// participate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    #[serde(rename = "target_id")]
    pub target: RelationshipTarget,
    pub kind: RelationshipKind,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target: impl Into<RelationshipTarget>,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target: target.into(),
            kind,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn target_id(&self) -> String {
        self.target.id()
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.source_id == other.source_id && self.target == other.target && self.kind == other.kind
    }
}

impl Eq for Relationship {}

impl Hash for Relationship {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_id.hash(state);
        self.target.hash(state);
        self.kind.hash(state);
    }
}

/// Output of one parser invocation on one file
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub file_path: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub errors: Vec<String>,
}

impl ParseResult {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    /// Result carrying a single file-scoped error
    pub fn failed(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}
