use super::file_stem;
use crate::builder::SourceParser;
use crate::types::{Entity, EntityKind, Location, ParseResult, Relationship, RelationshipKind};
use serde_yaml::{Mapping, Value};
use std::path::Path;

const PREVIEW_LIMIT: usize = 100;

/// Configuration keys from YAML files
///
/// Every mapping key becomes a `config_key` entity named by its dotted path
/// (`server.port`), contained by its parent key or by the document.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlParser;

impl YamlParser {
    pub fn new() -> Self {
        Self
    }
}

impl SourceParser for YamlParser {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn extensions(&self) -> &[&'static str] {
        &["yaml", "yml"]
    }

    fn parse(&self, path: &Path, source: &str) -> ParseResult {
        let file = path.to_string_lossy().into_owned();
        let parsed: Result<Value, serde_yaml::Error> = if source.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_yaml::from_str(source)
        };
        let data = match parsed {
            Ok(data) => data,
            Err(err) => return ParseResult::failed(file, format!("YAML parse error: {err}")),
        };

        let lines: Vec<&str> = source.lines().collect();
        let stem = file_stem(path);
        let doc_id = format!("{file}::{stem}");
        let mut result = ParseResult::new(file.clone());
        result.entities.push(Entity::new(
            doc_id.clone(),
            EntityKind::Document,
            &stem,
            &stem,
            Location::new(&file, 1, lines.len()),
        ));

        if let Value::Mapping(mapping) = &data {
            KeyWalker {
                file: &file,
                lines: &lines,
                result: &mut result,
            }
            .walk(mapping, &doc_id, "");
        }
        result
    }
}

struct KeyWalker<'a> {
    file: &'a str,
    lines: &'a [&'a str],
    result: &'a mut ParseResult,
}

impl KeyWalker<'_> {
    fn walk(&mut self, mapping: &Mapping, parent_id: &str, prefix: &str) {
        for (key, value) in mapping {
            let Some(key) = scalar_text(key) else {
                continue;
            };
            let qualified = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            let key_id = format!("{}::{qualified}", self.file);
            let line = key_line(self.lines, &key, prefix);

            self.result.entities.push(
                Entity::new(
                    key_id.clone(),
                    EntityKind::ConfigKey,
                    &key,
                    &qualified,
                    Location::new(self.file, line, line),
                )
                .with_metadata("value_type", value_type(value))
                .with_metadata("value_preview", preview(value)),
            );
            self.result.relationships.push(Relationship::new(
                parent_id,
                key_id.clone(),
                RelationshipKind::Contains,
            ));

            if let Value::Mapping(nested) = value {
                self.walk(nested, &key_id, &qualified);
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "dict",
        Value::Tagged(tagged) => value_type(&tagged.value),
    }
}

fn preview(value: &Value) -> String {
    match value {
        Value::Mapping(_) => "{...}".to_string(),
        Value::Sequence(items) => format!("[{} items]", items.len()),
        other => scalar_text(other)
            .unwrap_or_default()
            .chars()
            .take(PREVIEW_LIMIT)
            .collect(),
    }
}

/// First `key:` line indented roughly two spaces per nesting level
///
/// Falls back to line 1 when nothing matches.
fn key_line(lines: &[&str], key: &str, prefix: &str) -> usize {
    let needle = format!("{key}:");
    let depth = if prefix.is_empty() {
        0
    } else {
        prefix.matches('.').count() + 1
    };
    lines
        .iter()
        .position(|line| {
            let stripped = line.trim_start();
            let indent = line.len() - stripped.len();
            stripped.starts_with(&needle) && indent.abs_diff(depth * 2) <= 2
        })
        .map_or(1, |idx| idx + 1)
}
