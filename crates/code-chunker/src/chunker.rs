use crate::config::ChunkingConfig;
use crate::error::{ChunkerError, Result};
use crate::types::{
    CodeChunk, META_CHUNK_INDEX, META_HAS_DOCSTRING, META_KIND, META_LAST_MODIFIED, META_TYPE,
};
use codeweave_graph::{Entity, EntityKind, ParseResult};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFINITION_PREFIXES: [&str; 4] = ["import ", "from ", "class ", "def "];
const IMPORT_PREFIXES: [&str; 2] = ["import ", "from "];

/// Slices entities into retrieval chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker, rejecting configurations that cannot advance
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self { config })
    }

    pub const fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk one file's parse result, reading its source and mtime from disk
    ///
    /// A missing file only disables the header/imports chunks and the
    /// `last_modified` flag.
    pub fn chunk_parse_result(&self, result: &ParseResult) -> Vec<CodeChunk> {
        let path = Path::new(&result.file_path);
        let source = fs::read_to_string(path).ok();
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        self.chunk_with_source(result, source.as_deref(), modified)
    }

    /// Chunk one file's parse result with caller-supplied source text
    pub fn chunk_with_source(
        &self,
        result: &ParseResult,
        source: Option<&str>,
        modified: Option<SystemTime>,
    ) -> Vec<CodeChunk> {
        let last_modified = modified.and_then(epoch_seconds);
        let mut chunks = Vec::new();

        let is_code_module = result.entities.iter().any(|e| e.kind == EntityKind::Module);
        if let (true, Some(source)) = (is_code_module, source) {
            chunks.extend(module_chunks(&result.file_path, source));
        }

        for entity in result.entities.iter().filter(|e| e.kind != EntityKind::Module) {
            chunks.extend(self.chunk_entity(entity, last_modified.as_deref()));
        }

        log::debug!("Chunked {} into {} chunks", result.file_path, chunks.len());
        chunks
    }

    /// Chunk a single entity with a sliding character window
    pub fn chunk_entity(&self, entity: &Entity, last_modified: Option<&str>) -> Vec<CodeChunk> {
        let content = self.entity_content(entity);
        let documented = entity.docstring.as_deref().is_some_and(|d| !d.trim().is_empty());
        let has_docstring = if documented { "true" } else { "false" };

        let chars: Vec<char> = content.chars().collect();
        let max = self.config.max_chunk_size;
        let mut windows = Vec::new();
        if chars.len() <= max {
            windows.push(content);
        } else {
            let mut start = 0;
            loop {
                let end = (start + max).min(chars.len());
                windows.push(chars[start..end].iter().collect::<String>());
                if end == chars.len() {
                    break;
                }
                start += self.config.step();
            }
        }

        windows
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut chunk = CodeChunk::new(format!("{}::{index}", entity.id), &entity.id, text)
                    .with_metadata(META_KIND, entity.kind.as_str())
                    .with_metadata(META_HAS_DOCSTRING, has_docstring)
                    .with_metadata(META_CHUNK_INDEX, index.to_string());
                if let Some(ts) = last_modified {
                    chunk = chunk.with_metadata(META_LAST_MODIFIED, ts);
                }
                chunk
            })
            .collect()
    }

    /// Signature, quoted docstring and source (or the bare name)
    fn entity_content(&self, entity: &Entity) -> String {
        let mut content = String::new();
        if self.config.include_signatures {
            if let Some(signature) = &entity.signature {
                content.push_str(signature);
                content.push('\n');
            }
        }
        if self.config.include_docstrings {
            if let Some(doc) = &entity.docstring {
                content.push_str(&format!("\"\"\"{doc}\"\"\"\n"));
            }
        }
        match &entity.source_code {
            Some(source) if !source.is_empty() => content.push_str(source),
            _ => content.push_str(&entity.name),
        }
        content
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkingConfig::default(),
        }
    }
}

fn epoch_seconds(time: SystemTime) -> Option<String> {
    let elapsed = time.duration_since(UNIX_EPOCH).ok()?;
    Some(format!("{:.3}", elapsed.as_secs_f64()))
}

fn module_chunks(file_path: &str, source: &str) -> Vec<CodeChunk> {
    let entity_id = format!("{file_path}::module");
    let mut chunks = Vec::new();

    let header = module_header(source);
    if !header.is_empty() {
        chunks.push(
            CodeChunk::new(format!("{file_path}::module::0"), &entity_id, header)
                .with_metadata(META_TYPE, "module_header"),
        );
    }

    let imports = import_lines(source);
    if !imports.is_empty() {
        chunks.push(
            CodeChunk::new(format!("{file_path}::imports::0"), &entity_id, imports)
                .with_metadata(META_TYPE, "imports"),
        );
    }
    chunks
}

/// Leading comment/docstring block before the first import or definition
fn module_header(source: &str) -> String {
    let mut header: Vec<&str> = Vec::new();
    let mut quote: Option<&str> = None;

    for line in source.lines() {
        let stripped = line.trim();
        if stripped.is_empty() && quote.is_none() {
            continue;
        }

        let triple = ["\"\"\"", "'''"].into_iter().find(|q| stripped.contains(q));
        match (quote, triple) {
            (None, Some(q)) => {
                header.push(line);
                if stripped.matches(q).count() >= 2 {
                    break;
                }
                quote = Some(q);
            }
            (Some(_), Some(_)) => {
                header.push(line);
                break;
            }
            (Some(_), None) => header.push(line),
            (None, None) => {
                if DEFINITION_PREFIXES.iter().any(|p| stripped.starts_with(p)) {
                    break;
                }
                header.push(line);
            }
        }
    }
    header.join("\n").trim().to_string()
}

fn import_lines(source: &str) -> String {
    source
        .lines()
        .filter(|line| {
            let stripped = line.trim();
            IMPORT_PREFIXES.iter().any(|p| stripped.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeweave_graph::Location;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn function(id: &str, source: &str) -> Entity {
        Entity::new(id, EntityKind::Function, "f", "f", Location::new("a.py", 1, 1)).with_source(source)
    }

    #[test]
    fn small_entity_yields_one_chunk_with_flags() {
        let chunker = Chunker::default();
        let entity = function("a.py::f", "def f():\n    return 1")
            .with_signature("def f()")
            .with_docstring(Some("Does f.".into()));

        let chunks = chunker.chunk_entity(&entity, Some("1700000000.000"));
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.id, "a.py::f::0");
        assert_eq!(chunk.content, "def f()\n\"\"\"Does f.\"\"\"\ndef f():\n    return 1");
        assert_eq!(chunk.kind(), Some("function"));
        assert!(chunk.has_docstring());
        assert_eq!(chunk.meta(META_CHUNK_INDEX), Some("0"));
        assert_eq!(chunk.last_modified(), Some(1_700_000_000.0));
    }

    #[test]
    fn oversized_entity_slides_with_overlap() {
        let chunker = Chunker::new(ChunkingConfig {
            max_chunk_size: 10,
            overlap: 4,
            include_signatures: false,
            include_docstrings: false,
        })
        .unwrap();
        let source: String = ('a'..='z').collect();
        let chunks = chunker.chunk_entity(&function("a.py::f", &source), None);

        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["abcdefghij", "ghijklmnop", "mnopqrstuv", "stuvwxyz"]);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a.py::f::0", "a.py::f::1", "a.py::f::2", "a.py::f::3"]);
        assert!(chunks.iter().all(|c| c.meta(META_LAST_MODIFIED).is_none()));
    }

    #[test]
    fn multibyte_content_never_splits_characters() {
        let chunker = Chunker::new(ChunkingConfig {
            max_chunk_size: 3,
            overlap: 1,
            ..ChunkingConfig::default()
        })
        .unwrap();
        let chunks = chunker.chunk_entity(&function("a.py::f", "日本語のテキスト"), None);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 3));
        let ids: HashSet<_> = chunks.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn entity_without_source_uses_its_name() {
        let entity = Entity::new("d.md::guide", EntityKind::Document, "guide", "guide", Location::new("d.md", 1, 1));
        let chunks = Chunker::default().chunk_entity(&entity, None);
        assert_eq!(chunks[0].content, "guide");
        assert!(!chunks[0].has_docstring());
    }

    #[test]
    fn blank_docstring_does_not_count_as_documented() {
        let entity = function("a.py::f", "def f():\n    pass").with_docstring(Some("  ".to_string()));
        let chunks = Chunker::default().chunk_entity(&entity, None);
        assert!(!chunks[0].has_docstring());
    }

    #[test]
    fn module_header_and_imports_become_dedicated_chunks() {
        let source = "#!/usr/bin/env python\n\"\"\"Payment routines.\n\nMore detail.\n\"\"\"\nimport os\nfrom x import y\n\ndef f():\n    import json\n";
        let mut result = ParseResult::new("pay.py");
        result.entities.push(Entity::new("pay.py::pay", EntityKind::Module, "pay", "pay", Location::new("pay.py", 1, 9)));
        result.entities.push(function("pay.py::f", "def f():\n    import json"));

        let chunks = Chunker::default().chunk_with_source(&result, Some(source), None);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["pay.py::module::0", "pay.py::imports::0", "pay.py::f::0"]);

        assert_eq!(
            chunks[0].content,
            "#!/usr/bin/env python\n\"\"\"Payment routines.\n\nMore detail.\n\"\"\""
        );
        assert_eq!(chunks[0].meta(META_TYPE), Some("module_header"));
        assert_eq!(chunks[0].entity_id, "pay.py::module");
        assert_eq!(chunks[1].content, "import os\nfrom x import y\n    import json");
    }

    #[test]
    fn documents_skip_module_chunks() {
        let mut result = ParseResult::new("guide.md");
        result.entities.push(Entity::new("guide.md::guide", EntityKind::Document, "guide", "guide", Location::new("guide.md", 1, 3)));
        let chunks = Chunker::default().chunk_with_source(&result, Some("# Guide\n\nimport this\n"), None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "guide.md::guide::0");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Chunker::new(ChunkingConfig {
            max_chunk_size: 5,
            overlap: 9,
            ..ChunkingConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ChunkerError::InvalidConfig(_)));
    }
}
