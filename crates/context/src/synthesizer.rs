use crate::error::{ContextError, Result};
use crate::task::{ContextSection, TaskType};
use crate::tokens::TokenCounter;
use codeweave_graph::{Entity, EntityKind, KnowledgeStore};
use serde::Serialize;

pub const DEFAULT_MAX_TOKENS: usize = 2000;

/// Joins the parts of a bundle
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const TRUNCATION_MARKER: &str = "\n# ... (truncated)";
const SOURCE_OPEN: &str = "## Source Code\n\n```python\n";
const SOURCE_CLOSE: &str = "\n```";
/// Source needs more than this many spare tokens to be attempted at all
const MIN_SOURCE_BUDGET: usize = 100;
const MAX_LISTED_RELATIONS: usize = 10;
const MAX_LISTED_CHILDREN: usize = 15;
const SEARCH_DOC_PREVIEW: usize = 200;
const SOURCE_BONUS: f64 = 0.2;
const DOCSTRING_BONUS: f64 = 0.1;
const DOCSTRING_BONUS_MIN_CHARS: usize = 50;
const SHORT_CONTEXT_CHARS: usize = 100;

/// Token-budgeted context for one entity
#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub target_entity: Entity,
    pub context_text: String,
    pub included_entities: Vec<String>,
    pub total_chars: usize,
    /// Sum of the per-section token counts; always below the budget
    pub total_tokens: usize,
    pub truncated: bool,
    /// Set by task-aware synthesis
    pub task_type: Option<TaskType>,
    pub sufficiency_score: f64,
}

impl ContextBundle {
    /// True when the bundle is too thin to answer locally
    pub fn needs_escalation(&self, threshold: f64) -> bool {
        self.sufficiency_score < threshold
    }
}

/// Greedy packer that assembles entity context under a token budget
///
/// Sections are added in a fixed priority order. A section that does not
/// strictly fit in the remaining budget is skipped and the bundle is
/// flagged as truncated.
pub struct ContextSynthesizer<'a> {
    store: &'a KnowledgeStore,
    tokens: TokenCounter,
    max_tokens: usize,
}

impl<'a> ContextSynthesizer<'a> {
    pub fn new(store: &'a KnowledgeStore, tokens: TokenCounter, max_tokens: usize) -> Self {
        Self {
            store,
            tokens,
            max_tokens,
        }
    }

    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn entity(&self, entity_id: &str) -> Result<&'a Entity> {
        self.store
            .get(entity_id)
            .ok_or_else(|| ContextError::entity_not_found(entity_id))
    }

    /// Header, description, signature, source, parent, then relations
    pub fn synthesize(&self, entity_id: &str) -> Result<ContextBundle> {
        let entity = self.entity(entity_id)?;
        let mut bundle = Packer::new(self, entity);

        if let Some(text) = description_section(entity) {
            bundle.try_add(&text, 1.0);
        }
        if let Some(text) = signature_section(entity) {
            bundle.try_add(&text, 1.0);
        }
        if let Some(source) = nonempty(entity.source_code.as_deref()) {
            bundle.add_source(source);
        }
        if let Some(parent) = self.store.get_parent(entity_id) {
            if bundle.try_add(&parent_section(parent), 1.0) {
                bundle.included.push(parent.id.clone());
            }
        }
        for section in [ContextSection::Callers, ContextSection::Callees, ContextSection::Children] {
            if let Some((text, ids)) = self.relation_section(entity, section) {
                if bundle.try_add(&text, 1.0) {
                    bundle.included.extend(ids);
                } else {
                    bundle.truncated = true;
                }
            }
        }

        Ok(bundle.finish(None, 0.0))
    }

    /// Task-aware packing with per-section boosts and a sufficiency score
    pub fn synthesize_with_task(&self, entity_id: &str, task: TaskType) -> Result<ContextBundle> {
        let entity = self.entity(entity_id)?;
        let mut bundle = Packer::new(self, entity);
        let profile = task.profile();

        let mut included_weight = 0.0;
        let mut possible_weight = 0.0;
        let mut source_included = false;

        for (slot, (section, boost)) in profile.iter().enumerate() {
            let weight = 1.0 / (slot as f64 + 1.0);
            possible_weight += weight;

            let added = match section {
                ContextSection::Docstring => description_section(entity).map(|text| bundle.try_add(&text, *boost)),
                ContextSection::Signature => signature_section(entity).map(|text| bundle.try_add(&text, *boost)),
                ContextSection::Source => nonempty(entity.source_code.as_deref()).map(|source| {
                    let (body, cut) = self.pre_truncate_source(source);
                    let fits = bundle.try_add(&format!("{SOURCE_OPEN}{body}{SOURCE_CLOSE}"), *boost);
                    if fits {
                        source_included = true;
                        bundle.truncated |= cut;
                    }
                    fits
                }),
                ContextSection::Parent => self.store.get_parent(entity_id).map(|parent| {
                    let fits = bundle.try_add(&parent_section(parent), *boost);
                    if fits {
                        bundle.included.push(parent.id.clone());
                    }
                    fits
                }),
                ContextSection::Callers | ContextSection::Callees | ContextSection::Children => {
                    self.relation_section(entity, *section).map(|(text, ids)| {
                        let fits = bundle.try_add(&text, *boost);
                        if fits {
                            bundle.included.extend(ids);
                        }
                        fits
                    })
                }
            };

            match added {
                Some(true) => included_weight += weight,
                Some(false) => bundle.truncated = true,
                None => {}
            }
        }

        let mut earned = included_weight;
        let mut possible = possible_weight;
        if source_included {
            earned += SOURCE_BONUS;
            possible += SOURCE_BONUS;
        }
        if entity
            .docstring
            .as_deref()
            .is_some_and(|doc| doc.chars().count() > DOCSTRING_BONUS_MIN_CHARS)
        {
            earned += DOCSTRING_BONUS;
            possible += DOCSTRING_BONUS;
        }

        let mut score = if possible > 0.0 { earned / possible } else { 0.0 };
        if bundle.text_chars() < SHORT_CONTEXT_CHARS {
            score *= 0.5;
        }
        let score = (score.clamp(0.0, 1.0) * 100.0).round() / 100.0;

        Ok(bundle.finish(Some(task), score))
    }

    /// Markdown listing of lexical matches for `pattern`
    pub fn synthesize_for_search(&self, pattern: &str, max_results: usize) -> String {
        let matches = self.store.search(pattern);
        if matches.is_empty() || max_results == 0 {
            return format!("No entities found matching '{pattern}'");
        }

        let mut lines = vec![format!("# Search Results for '{pattern}'"), String::new()];
        for entity in matches.into_iter().take(max_results) {
            lines.push(format!("## {}: `{}`", entity.kind.title(), entity.qualified_name));
            lines.push(format!(
                "File: `{}:{}`",
                entity.location.file_path, entity.location.line_start
            ));
            if let Some(doc) = nonempty(entity.docstring.as_deref()) {
                let mut preview: String = doc.chars().take(SEARCH_DOC_PREVIEW).collect();
                if doc.chars().count() > SEARCH_DOC_PREVIEW {
                    preview.push_str("...");
                }
                lines.push(format!("> {preview}"));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Source body capped at half the total budget
    fn pre_truncate_source(&self, source: &str) -> (String, bool) {
        let cap = self.max_tokens / 2;
        if self.tokens.count(source) <= cap {
            return (source.to_string(), false);
        }
        let marker_tokens = self.tokens.count(TRUNCATION_MARKER);
        let body = self.tokens.truncate(source, cap.saturating_sub(marker_tokens));
        (format!("{body}{TRUNCATION_MARKER}"), true)
    }

    fn relation_section(&self, entity: &Entity, section: ContextSection) -> Option<(String, Vec<String>)> {
        let related = match section {
            ContextSection::Callers => self.store.get_callers(&entity.id),
            ContextSection::Callees => self.store.get_callees(&entity.id),
            ContextSection::Children
                if matches!(
                    entity.kind,
                    EntityKind::Class | EntityKind::Module | EntityKind::Document
                ) =>
            {
                self.store.get_children(&entity.id)
            }
            _ => return None,
        };
        if related.is_empty() {
            return None;
        }

        let (title, limit) = match section {
            ContextSection::Callers => ("## Called By", MAX_LISTED_RELATIONS),
            ContextSection::Callees => ("## Calls", MAX_LISTED_RELATIONS),
            _ => ("## Contains", MAX_LISTED_CHILDREN),
        };

        let mut lines = vec![title.to_string(), String::new()];
        for item in related.iter().take(limit) {
            lines.push(match section {
                ContextSection::Callers => match item.signature.as_deref() {
                    Some(sig) => {
                        let head = sig.split('(').next().unwrap_or(sig);
                        format!("- `{}` - `{head}(...)`", item.qualified_name)
                    }
                    None => format!("- `{}`", item.qualified_name),
                },
                ContextSection::Callees => format!("- `{}`", item.qualified_name),
                _ => format!("- [{}] `{}`", item.kind, item.name),
            });
        }
        if related.len() > limit {
            lines.push(format!("- ... and {} more", related.len() - limit));
        }

        let ids = related.iter().map(|e| e.id.clone()).collect();
        Some((lines.join("\n"), ids))
    }
}

/// Running state of one bundle under construction
struct Packer<'s, 'a> {
    synth: &'s ContextSynthesizer<'a>,
    entity: &'a Entity,
    sections: Vec<String>,
    included: Vec<String>,
    current: usize,
    truncated: bool,
}

impl<'s, 'a> Packer<'s, 'a> {
    /// Start with the mandatory header, cut down if it alone would fill the budget
    fn new(synth: &'s ContextSynthesizer<'a>, entity: &'a Entity) -> Self {
        let mut header = entity_header(entity);
        let mut current = synth.tokens.count(&header);
        let mut truncated = false;
        if current >= synth.max_tokens {
            let mut allowed = synth.max_tokens.saturating_sub(1);
            loop {
                header = synth.tokens.truncate(&header, allowed);
                current = synth.tokens.count(&header);
                if current < synth.max_tokens || allowed == 0 {
                    break;
                }
                allowed -= 1;
            }
            truncated = true;
        }

        Self {
            synth,
            entity,
            sections: vec![header],
            included: vec![entity.id.clone()],
            current,
            truncated,
        }
    }

    /// Add `text` when `current + tokens < min(max * boost, max)`
    fn try_add(&mut self, text: &str, boost: f64) -> bool {
        let max = self.synth.max_tokens as f64;
        let cap = (max * boost).min(max);
        let cost = self.synth.tokens.count(text);
        if ((self.current + cost) as f64) < cap {
            self.sections.push(text.to_string());
            self.current += cost;
            true
        } else {
            false
        }
    }

    /// Source with the plain-synthesis policy: only with ample room, cut to fit
    fn add_source(&mut self, source: &str) {
        let tokens = &self.synth.tokens;
        let frame = tokens.count(&format!("{SOURCE_OPEN}{SOURCE_CLOSE}"));
        let spare = self
            .synth
            .max_tokens
            .saturating_sub(self.current)
            .saturating_sub(frame);
        if spare <= MIN_SOURCE_BUDGET {
            self.truncated = true;
            return;
        }

        let full = format!("{SOURCE_OPEN}{source}{SOURCE_CLOSE}");
        if self.try_add(&full, 1.0) {
            return;
        }

        let mut body_budget = spare.saturating_sub(tokens.count(TRUNCATION_MARKER));
        while body_budget > 0 {
            let body = tokens.truncate(source, body_budget);
            let text = format!("{SOURCE_OPEN}{body}{TRUNCATION_MARKER}{SOURCE_CLOSE}");
            let cost = tokens.count(&text);
            if self.current + cost < self.synth.max_tokens {
                self.sections.push(text);
                self.current += cost;
                self.truncated = true;
                return;
            }
            body_budget = body_budget.saturating_sub(self.current + cost + 1 - self.synth.max_tokens);
        }
        self.truncated = true;
    }

    fn text_chars(&self) -> usize {
        let separators = self.sections.len().saturating_sub(1) * SECTION_SEPARATOR.chars().count();
        self.sections.iter().map(|s| s.chars().count()).sum::<usize>() + separators
    }

    fn finish(self, task_type: Option<TaskType>, sufficiency_score: f64) -> ContextBundle {
        let context_text = self.sections.join(SECTION_SEPARATOR);
        ContextBundle {
            target_entity: self.entity.clone(),
            total_chars: context_text.chars().count(),
            context_text,
            included_entities: self.included,
            total_tokens: self.current,
            truncated: self.truncated || self.current >= self.synth.max_tokens,
            task_type,
            sufficiency_score,
        }
    }
}

fn nonempty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.is_empty())
}

fn entity_header(entity: &Entity) -> String {
    format!(
        "# {}: `{}`\n\n**File**: `{}`\n**Lines**: {}-{}",
        entity.kind.title(),
        entity.qualified_name,
        entity.location.file_path,
        entity.location.line_start,
        entity.location.line_end
    )
}

fn description_section(entity: &Entity) -> Option<String> {
    nonempty(entity.docstring.as_deref()).map(|doc| format!("## Description\n\n{doc}"))
}

fn signature_section(entity: &Entity) -> Option<String> {
    nonempty(entity.signature.as_deref()).map(|sig| format!("## Signature\n\n```python\n{sig}\n```"))
}

fn parent_section(parent: &Entity) -> String {
    let mut text = format!(
        "## Parent Context\n\n**{}**: `{}`",
        parent.kind.title(),
        parent.qualified_name
    );
    if let Some(first_line) = nonempty(parent.docstring.as_deref()).and_then(|doc| doc.lines().next()) {
        text.push_str(&format!("\n> {first_line}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeweave_graph::{Location, Relationship, RelationshipKind};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn counter() -> TokenCounter {
        TokenCounter::new().unwrap()
    }

    /// billing.py: class Billing contains charge; charge calls validate; checkout calls charge
    fn billing_store(source_len: usize) -> KnowledgeStore {
        let mut store = KnowledgeStore::new();
        store.insert_entity(
            Entity::new("billing.py::Billing", EntityKind::Class, "Billing", "Billing", Location::new("billing.py", 1, 40))
                .with_docstring(Some("Billing operations.\nSecond line.".into())),
        );
        let body: String = "    total = total + item.price * item.quantity\n"
            .chars()
            .cycle()
            .take(source_len)
            .collect();
        store.insert_entity(
            Entity::new("billing.py::Billing.charge", EntityKind::Method, "charge", "Billing.charge", Location::new("billing.py", 5, 30))
                .with_signature("def charge(self, amount)")
                .with_docstring(Some("Charge the customer's stored card for the given amount, retrying once on timeout.".into()))
                .with_source(format!("def charge(self, amount):\n{body}")),
        );
        store.insert_entity(
            Entity::new("billing.py::validate", EntityKind::Function, "validate", "validate", Location::new("billing.py", 42, 45))
                .with_signature("def validate(amount)"),
        );
        store.insert_entity(
            Entity::new("shop.py::checkout", EntityKind::Function, "checkout", "checkout", Location::new("shop.py", 1, 9))
                .with_signature("def checkout(cart)"),
        );
        store.add_relationship(Relationship::new("billing.py::Billing", "billing.py::Billing.charge", RelationshipKind::Contains));
        store.add_relationship(Relationship::new("billing.py::Billing.charge", "billing.py::validate", RelationshipKind::Calls));
        store.add_relationship(Relationship::new("shop.py::checkout", "billing.py::Billing.charge", RelationshipKind::Calls));
        store
    }

    #[test]
    fn roomy_budget_includes_every_section_in_order() {
        let store = billing_store(200);
        let synth = ContextSynthesizer::new(&store, counter(), DEFAULT_MAX_TOKENS);
        let bundle = synth.synthesize("billing.py::Billing.charge").unwrap();

        let headings: Vec<&str> = bundle
            .context_text
            .split(SECTION_SEPARATOR)
            .map(|s| s.lines().next().unwrap_or(""))
            .collect();
        assert_eq!(
            headings,
            vec![
                "# Method: `Billing.charge`",
                "## Description",
                "## Signature",
                "## Source Code",
                "## Parent Context",
                "## Called By",
                "## Calls",
            ]
        );
        assert!(bundle.context_text.contains("**File**: `billing.py`\n**Lines**: 5-30"));
        assert!(bundle.context_text.contains("- `checkout` - `def checkout(...)`"));
        assert!(bundle.context_text.contains("> Billing operations."));
        assert!(!bundle.context_text.contains("Second line."));
        assert_eq!(
            bundle.included_entities,
            vec![
                "billing.py::Billing.charge",
                "billing.py::Billing",
                "shop.py::checkout",
                "billing.py::validate",
            ]
        );
        assert!(!bundle.truncated);
        assert!(bundle.total_tokens < DEFAULT_MAX_TOKENS);
        assert_eq!(bundle.total_chars, bundle.context_text.chars().count());
        assert_eq!(bundle.task_type, None);
    }

    #[test]
    fn huge_source_with_tiny_budget_keeps_header() {
        let store = billing_store(10_000);
        let synth = ContextSynthesizer::new(&store, counter(), 50);
        let bundle = synth.synthesize("billing.py::Billing.charge").unwrap();

        assert!(bundle.truncated);
        assert!(bundle.context_text.starts_with("# Method: `Billing.charge`"));
        assert!(!bundle.context_text.contains("## Source Code"));
        assert!(bundle.total_tokens < 50);
    }

    #[test]
    fn oversized_source_is_cut_with_marker() {
        let store = billing_store(10_000);
        let synth = ContextSynthesizer::new(&store, counter(), 600);
        let bundle = synth.synthesize("billing.py::Billing.charge").unwrap();

        assert!(bundle.truncated);
        assert!(bundle.context_text.contains("## Source Code"));
        assert!(bundle.context_text.contains("# ... (truncated)"));
        assert!(bundle.total_tokens < 600);
    }

    #[test]
    fn class_lists_its_children() {
        let store = billing_store(100);
        let synth = ContextSynthesizer::new(&store, counter(), DEFAULT_MAX_TOKENS);
        let bundle = synth.synthesize("billing.py::Billing").unwrap();
        assert!(bundle.context_text.contains("## Contains\n\n- [method] `charge`"));
        assert!(bundle.included_entities.contains(&"billing.py::Billing.charge".to_string()));
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let store = KnowledgeStore::new();
        let synth = ContextSynthesizer::new(&store, counter(), 100);
        let err = synth.synthesize("nope").unwrap_err();
        assert!(err.is_not_found());
        assert!(synth.synthesize_with_task("nope", TaskType::Debug).unwrap_err().is_not_found());
    }

    #[test]
    fn task_order_drives_section_order() {
        let store = billing_store(200);
        let synth = ContextSynthesizer::new(&store, counter(), DEFAULT_MAX_TOKENS);
        let bundle = synth
            .synthesize_with_task("billing.py::Billing.charge", TaskType::Debug)
            .unwrap();

        let headings: Vec<&str> = bundle
            .context_text
            .split(SECTION_SEPARATOR)
            .map(|s| s.lines().next().unwrap_or(""))
            .collect();
        assert_eq!(
            headings,
            vec![
                "# Method: `Billing.charge`",
                "## Source Code",
                "## Called By",
                "## Calls",
                "## Signature",
                "## Description",
            ]
        );
        assert_eq!(bundle.task_type, Some(TaskType::Debug));
        // every slot plus both bonuses earned
        assert_eq!(bundle.sufficiency_score, 1.0);
        assert!(!bundle.needs_escalation(0.8));
    }

    #[test]
    fn locate_skips_absent_slots_without_truncating() {
        let store = billing_store(200);
        let synth = ContextSynthesizer::new(&store, counter(), DEFAULT_MAX_TOKENS);
        let bundle = synth
            .synthesize_with_task("billing.py::validate", TaskType::Locate)
            .unwrap();

        // signature (1.0) of 1 + 1/2 + 1/3
        assert!(!bundle.truncated);
        assert_eq!(bundle.sufficiency_score, 0.55);
        assert!(bundle.needs_escalation(0.8));
    }

    #[test]
    fn short_context_halves_the_score() {
        let mut store = KnowledgeStore::new();
        store.insert_entity(
            Entity::new("a.py::f", EntityKind::Function, "f", "f", Location::new("a.py", 1, 1)).with_signature("def f()"),
        );
        let synth = ContextSynthesizer::new(&store, counter(), DEFAULT_MAX_TOKENS);
        let bundle = synth.synthesize_with_task("a.py::f", TaskType::Locate).unwrap();
        assert!(bundle.context_text.chars().count() < 100);
        // (1 / (1 + 1/2 + 1/3)) * 0.5
        assert_eq!(bundle.sufficiency_score, 0.27);
    }

    #[test]
    fn search_listing_previews_docstrings() {
        let store = billing_store(10);
        let synth = ContextSynthesizer::new(&store, counter(), DEFAULT_MAX_TOKENS);
        let listing = synth.synthesize_for_search("charge", 5);
        assert!(listing.starts_with("# Search Results for 'charge'\n"));
        assert!(listing.contains("## Method: `Billing.charge`\nFile: `billing.py:5`\n> Charge the customer's"));
        assert_eq!(synth.synthesize_for_search("zzz", 5), "No entities found matching 'zzz'");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn totals_stay_below_budget(max_tokens in 1usize..700, source_len in 0usize..4000, task_idx in 0usize..6) {
            let store = billing_store(source_len);
            let synth = ContextSynthesizer::new(&store, counter(), max_tokens);

            let plain = synth.synthesize("billing.py::Billing.charge").unwrap();
            prop_assert!(plain.total_tokens < max_tokens);

            let task = TaskType::ALL[task_idx];
            let tasked = synth.synthesize_with_task("billing.py::Billing.charge", task).unwrap();
            prop_assert!(tasked.total_tokens < max_tokens);
            prop_assert!((0.0..=1.0).contains(&tasked.sufficiency_score));
        }
    }
}
