use super::file_stem;
use crate::builder::SourceParser;
use crate::types::{Entity, EntityKind, Location, ParseResult, Relationship, RelationshipKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid regex"));
static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SLUG_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_]+").expect("valid regex"));
static SLUG_DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid regex"));

const DESCRIPTION_LIMIT: usize = 500;

/// Documents and heading sections from Markdown files
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownParser;

impl MarkdownParser {
    pub fn new() -> Self {
        Self
    }
}

struct Heading {
    level: usize,
    title: String,
    line: usize,
}

impl SourceParser for MarkdownParser {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }

    fn parse(&self, path: &Path, source: &str) -> ParseResult {
        let file = path.to_string_lossy().into_owned();
        let mut result = ParseResult::new(file.clone());
        let lines: Vec<&str> = source.lines().collect();
        let prose = without_fences(&lines);

        let stem = file_stem(path);
        let doc_id = format!("{file}::{stem}");
        result.entities.push(
            Entity::new(
                doc_id.clone(),
                EntityKind::Document,
                &stem,
                &stem,
                Location::new(&file, 1, lines.len()),
            )
            .with_docstring(description(&prose)),
        );

        let headings = headings(&lines);
        let mut stack: Vec<(usize, String)> = vec![(0, doc_id.clone())];
        for (i, heading) in headings.iter().enumerate() {
            let line_end = headings[i + 1..]
                .iter()
                .find(|next| next.level <= heading.level)
                .map_or(lines.len(), |next| next.line - 1);
            let section_id = format!("{file}::{}", slugify(&heading.title));
            let body = lines[heading.line - 1..line_end.max(heading.line)].join("\n");

            result.entities.push(
                Entity::new(
                    section_id.clone(),
                    EntityKind::Section,
                    &heading.title,
                    &heading.title,
                    Location::new(&file, heading.line, line_end),
                )
                .with_source(body)
                .with_metadata("level", heading.level.to_string()),
            );

            while stack.last().is_some_and(|(level, _)| *level >= heading.level) {
                stack.pop();
            }
            let parent = stack.last().map_or(doc_id.as_str(), |(_, id)| id.as_str());
            result.relationships.push(Relationship::new(
                parent,
                section_id.clone(),
                RelationshipKind::Contains,
            ));
            stack.push((heading.level, section_id));
        }

        result
    }
}

/// Lines outside fenced code blocks; fenced lines become blank
fn without_fences(lines: &[&str]) -> Vec<String> {
    let mut in_fence = false;
    lines
        .iter()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return String::new();
            }
            if in_fence {
                String::new()
            } else {
                (*line).to_string()
            }
        })
        .collect()
}

fn headings(lines: &[&str]) -> Vec<Heading> {
    let mut in_fence = false;
    let mut out = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = HEADING.captures(line) {
            out.push(Heading {
                level: caps[1].len(),
                title: caps[2].trim().to_string(),
                line: idx + 1,
            });
        }
    }
    out
}

/// First non-heading paragraph, capped at 500 characters
fn description(prose: &[String]) -> Option<String> {
    let mut paragraph: Vec<&str> = Vec::new();
    for line in prose.iter().map(String::as_str).chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !paragraph.is_empty() {
                let text = paragraph.join("\n");
                let text = text.trim();
                if !text.starts_with('#') {
                    return Some(text.chars().take(DESCRIPTION_LIMIT).collect());
                }
                paragraph.clear();
            }
            continue;
        }
        paragraph.push(line);
    }
    None
}

fn slugify(text: &str) -> String {
    let mut slug = text.trim().to_lowercase();
    for (pattern, replacement) in [(&SLUG_STRIP, ""), (&SLUG_SPACES, "-"), (&SLUG_DASHES, "-")] {
        slug = pattern.replace_all(&slug, replacement).into_owned();
    }
    slug.trim_matches('-').to_string()
}
