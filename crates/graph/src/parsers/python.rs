use super::file_stem;
use crate::builder::SourceParser;
use crate::types::{Entity, EntityKind, Location, ParseResult, Relationship, RelationshipKind};
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Python modules, classes, functions and methods via tree-sitter
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }
}

impl SourceParser for PythonParser {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &[&'static str] {
        &["py", "pyi"]
    }

    fn parse(&self, path: &Path, source: &str) -> ParseResult {
        let file = path.to_string_lossy().into_owned();

        let mut parser = Parser::new();
        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        if let Err(e) = parser.set_language(&language) {
            return ParseResult::failed(file, format!("Failed to set language: {e}"));
        }
        let Some(tree) = parser.parse(source, None) else {
            return ParseResult::failed(file, "Syntax error: parser produced no tree");
        };
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            return ParseResult::failed(file, format!("Syntax error: invalid syntax (line {line})"));
        }

        let mut walker = Walker {
            file: &file,
            source,
            result: ParseResult::new(file.clone()),
        };
        walker.module(root, &file_stem(path));
        walker.result
    }
}

struct Walker<'a> {
    file: &'a str,
    source: &'a str,
    result: ParseResult,
}

impl Walker<'_> {
    fn text(&self, node: Node) -> &str {
        &self.source[node.byte_range()]
    }

    fn location(&self, node: Node) -> Location {
        Location::new(
            self.file,
            node.start_position().row + 1,
            node.end_position().row + 1,
        )
        .with_columns(node.start_position().column, node.end_position().column)
    }

    fn module(&mut self, root: Node, stem: &str) {
        let module_id = format!("{}::{stem}", self.file);
        let line_count = self.source.lines().count();
        let module = Entity::new(
            module_id.clone(),
            EntityKind::Module,
            stem,
            stem,
            Location::new(self.file, 1, line_count),
        )
        .with_docstring(self.docstring(root))
        .with_source(self.source);
        self.result.entities.push(module);

        self.imports(root, &module_id);

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let Some(def) = unwrap_decorated(child) else {
                continue;
            };
            match def.kind() {
                "class_definition" => self.class(def, &module_id),
                "function_definition" => self.function(def, &module_id),
                _ => {}
            }
        }
    }

    fn imports(&mut self, node: Node, module_id: &str) {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    let dotted = match name.kind() {
                        "aliased_import" => name.child_by_field_name("name"),
                        _ => Some(name),
                    };
                    if let Some(dotted) = dotted {
                        let target = format!("external::{}", self.text(dotted));
                        self.result.relationships.push(Relationship::new(
                            module_id,
                            target,
                            RelationshipKind::Imports,
                        ));
                    }
                }
                return;
            }
            "import_from_statement" => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    let name = self.text(module).trim_start_matches('.');
                    if !name.is_empty() {
                        let target = format!("external::{name}");
                        self.result.relationships.push(Relationship::new(
                            module_id,
                            target,
                            RelationshipKind::Imports,
                        ));
                    }
                }
                return;
            }
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.imports(child, module_id);
        }
    }

    fn class(&mut self, node: Node, parent_id: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let class_id = format!("{}::{name}", self.file);
        let body = node.child_by_field_name("body");

        let entity = Entity::new(class_id.clone(), EntityKind::Class, &name, &name, self.location(node))
            .with_docstring(body.and_then(|b| self.docstring(b)))
            .with_source(self.text(node));
        self.result.entities.push(entity);
        self.result.relationships.push(Relationship::new(
            parent_id,
            class_id.clone(),
            RelationshipKind::Contains,
        ));

        if let Some(bases) = node.child_by_field_name("superclasses") {
            let mut cursor = bases.walk();
            for base in bases.named_children(&mut cursor) {
                if let Some(base_name) = self.dotted_name(base) {
                    self.result.relationships.push(Relationship::new(
                        class_id.clone(),
                        format!("ref::{base_name}"),
                        RelationshipKind::Inherits,
                    ));
                }
            }
        }

        let Some(body) = body else {
            return;
        };
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            if let Some(def) = unwrap_decorated(child).filter(|d| d.kind() == "function_definition") {
                self.method(def, &class_id, &name);
            }
        }
    }

    fn function(&mut self, node: Node, parent_id: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let func_id = format!("{}::{name}", self.file);
        self.callable(node, func_id, EntityKind::Function, name.clone(), name, parent_id);
    }

    fn method(&mut self, node: Node, class_id: &str, class_name: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let qualified = format!("{class_name}.{name}");
        let method_id = format!("{}::{qualified}", self.file);
        self.callable(node, method_id, EntityKind::Method, name, qualified, class_id);
    }

    fn callable(
        &mut self,
        node: Node,
        id: String,
        kind: EntityKind,
        name: String,
        qualified: String,
        parent_id: &str,
    ) {
        let docstring = node.child_by_field_name("body").and_then(|b| self.docstring(b));
        let entity = Entity::new(id.clone(), kind, name, qualified, self.location(node))
            .with_docstring(docstring)
            .with_signature(self.signature(node))
            .with_source(self.text(node));
        self.result.entities.push(entity);
        self.result.relationships.push(Relationship::new(
            parent_id,
            id.clone(),
            RelationshipKind::Contains,
        ));

        let mut calls = Vec::new();
        self.collect_calls(node, &mut calls);
        for callee in calls {
            self.result.relationships.push(Relationship::new(
                id.clone(),
                format!("ref::{callee}"),
                RelationshipKind::Calls,
            ));
        }
    }

    fn collect_calls(&self, node: Node, calls: &mut Vec<String>) {
        if node.kind() == "call" {
            if let Some(name) = node
                .child_by_field_name("function")
                .and_then(|f| self.dotted_name(f))
            {
                calls.push(name);
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect_calls(child, calls);
        }
    }

    /// `foo` for a plain call, `value.attr` for attribute calls
    fn dotted_name(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.text(node).to_string()),
            "attribute" => {
                let attr = self.text(node.child_by_field_name("attribute")?).to_string();
                match node
                    .child_by_field_name("object")
                    .and_then(|obj| self.dotted_name(obj))
                {
                    Some(value) => Some(format!("{value}.{attr}")),
                    None => Some(attr),
                }
            }
            _ => None,
        }
    }

    fn signature(&self, node: Node) -> String {
        let is_async = node
            .child(0)
            .is_some_and(|first| first.kind() == "async");
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let params = node
            .child_by_field_name("parameters")
            .map(|p| collapse_whitespace(self.text(p)))
            .unwrap_or_else(|| "()".to_string());
        let returns = node
            .child_by_field_name("return_type")
            .map(|r| format!(" -> {}", self.text(r)))
            .unwrap_or_default();
        let prefix = if is_async { "async " } else { "" };
        format!("{prefix}def {name}{params}{returns}")
    }

    /// Leading string literal of a module or block
    fn docstring(&self, block: Node) -> Option<String> {
        let mut cursor = block.walk();
        let first = block
            .named_children(&mut cursor)
            .find(|child| child.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let literal = first.named_child(0)?;
        if literal.kind() != "string" {
            return None;
        }
        Some(clean_docstring(strip_quotes(self.text(literal))))
    }
}

fn unwrap_decorated(node: Node) -> Option<Node> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition")
    } else {
        Some(node)
    }
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_quotes(literal: &str) -> &str {
    let body = literal.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    body
}

/// Trim surrounding blank lines and the common indentation of continuation lines
fn clean_docstring(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.trim().to_string()
            } else if line.len() >= indent {
                line[indent..].trim_end().to_string()
            } else {
                line.trim().to_string()
            }
        })
        .collect();

    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}
