use crate::parsers::{MarkdownParser, PythonParser, YamlParser};
use crate::store::{GraphStats, KnowledgeStore};
use crate::types::{Entity, ParseResult, RelationshipTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Capability that turns one file into entities and relationships
///
/// Parsers never fail: read or syntax problems land in
/// [`ParseResult::errors`].
pub trait SourceParser: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Lower-case file extensions without the dot
    fn extensions(&self) -> &[&'static str];

    fn parse(&self, path: &Path, source: &str) -> ParseResult;
}

/// Totals reported after a build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    #[serde(flatten)]
    pub graph: GraphStats,
    pub total_errors: usize,
}

/// Merges per-file parse results into a [`KnowledgeStore`]
pub struct GraphBuilder {
    parsers: Vec<Box<dyn SourceParser>>,
    store: KnowledgeStore,
    errors: Vec<String>,
}

impl GraphBuilder {
    /// Builder with no parsers registered
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
            store: KnowledgeStore::new(),
            errors: Vec::new(),
        }
    }

    /// Builder with the built-in Python and Markdown parsers
    pub fn with_default_parsers() -> Self {
        let mut builder = Self::new();
        builder.register(Box::new(PythonParser::new()));
        builder.register(Box::new(MarkdownParser::new()));
        builder.register(Box::new(YamlParser::new()));
        builder
    }

    pub fn register(&mut self, parser: Box<dyn SourceParser>) {
        log::debug!("Registered {} parser for {:?}", parser.name(), parser.extensions());
        self.parsers.push(parser);
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.parsers
            .iter()
            .flat_map(|p| p.extensions().iter().copied())
            .collect()
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.parser_for(path).is_some()
    }

    fn parser_for(&self, path: &Path) -> Option<&dyn SourceParser> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.parsers
            .iter()
            .find(|p| p.extensions().iter().any(|candidate| *candidate == ext))
            .map(|p| p.as_ref())
    }

    /// Parse one file with the parser registered for its extension
    pub fn parse_file(&self, path: &Path) -> ParseResult {
        let display = path.to_string_lossy().into_owned();
        let Some(parser) = self.parser_for(path) else {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return ParseResult::failed(display, format!("Unsupported file type: {ext}"));
        };
        match fs::read_to_string(path) {
            Ok(source) => parser.parse(path, &source),
            Err(err) => ParseResult::failed(display, format!("Failed to read file: {err}")),
        }
    }

    /// Parse and merge every file, then resolve placeholder references
    ///
    /// A file that cannot be read or parsed contributes an error and the
    /// build moves on.
    pub fn build_from_files<P: AsRef<Path>>(&mut self, files: &[P]) -> BuildStats {
        for file in files {
            let result = self.parse_file(file.as_ref());
            if !result.errors.is_empty() {
                log::warn!(
                    "{}: {} parse error(s)",
                    result.file_path,
                    result.errors.len()
                );
            }
            self.merge(result);
        }
        let resolved = self.resolve_references();
        let stats = self.stats();
        log::info!(
            "Built knowledge graph: {} entities, {} relationships ({} resolved), {} errors",
            stats.graph.total_entities,
            stats.graph.total_relationships,
            resolved,
            stats.total_errors
        );
        stats
    }

    /// Union entities by id (last write wins) and append relationships
    pub fn merge(&mut self, result: ParseResult) {
        for entity in result.entities {
            self.store.insert_entity(entity);
        }
        for rel in result.relationships {
            self.store.add_relationship(rel);
        }
        let file = result.file_path;
        self.errors
            .extend(result.errors.into_iter().map(|err| format!("{file}: {err}")));
    }

    /// Replace `ref::` placeholders with concrete entity ids
    ///
    /// Lookup order is exact name, then exact qualified name, then a
    /// qualified name ending in `.<name>`; the first entity in insertion
    /// order wins at each step. Unmatched placeholders stay as they are.
    pub fn resolve_references(&mut self) -> usize {
        let index = NameIndex::build(self.store.entities());
        self.store.retarget(|rel| match &rel.target {
            RelationshipTarget::Unresolved(name) => index
                .resolve(name)
                .map(|id| RelationshipTarget::Resolved(id.to_string())),
            _ => None,
        })
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn stats(&self) -> BuildStats {
        BuildStats {
            graph: self.store.stats(),
            total_errors: self.errors.len(),
        }
    }

    /// Finish the build, recording stats and errors in the store metadata
    pub fn into_store(self) -> KnowledgeStore {
        let stats = self.stats();
        let mut store = self.store;
        store.set_metadata(serde_json::json!({
            "stats": stats,
            "errors": self.errors,
        }));
        store
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::with_default_parsers()
    }
}

/// Name lookup tables built once per resolution pass
struct NameIndex {
    by_name: HashMap<String, String>,
    by_qualified: HashMap<String, String>,
    by_suffix: HashMap<String, String>,
}

impl NameIndex {
    fn build<'a>(entities: impl Iterator<Item = &'a Entity>) -> Self {
        let mut index = Self {
            by_name: HashMap::new(),
            by_qualified: HashMap::new(),
            by_suffix: HashMap::new(),
        };
        for entity in entities {
            index
                .by_name
                .entry(entity.name.clone())
                .or_insert_with(|| entity.id.clone());
            index
                .by_qualified
                .entry(entity.qualified_name.clone())
                .or_insert_with(|| entity.id.clone());
            let qualified = entity.qualified_name.as_str();
            for (pos, _) in qualified.match_indices('.') {
                index
                    .by_suffix
                    .entry(qualified[pos + 1..].to_string())
                    .or_insert_with(|| entity.id.clone());
            }
        }
        index
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name)
            .or_else(|| self.by_qualified.get(name))
            .or_else(|| self.by_suffix.get(name))
            .map(String::as_str)
    }
}
