use codeweave_context::ContextBundle;
use codeweave_graph::{ImpactReport, TracedEntity};
use codeweave_indexer::WorkerStats;
use codeweave_service::{AnalyzeReport, EntitySummary, RetrievalResult, ServiceStats};
use std::fmt::Write;

pub fn analyze(out: &AnalyzeReport) -> String {
    let graph = &out.build.graph;
    let mut text = format!(
        "Knowledge store: {}\n  entities: {}\n  relationships: {}\n  errors: {}\n",
        out.store_path.display(),
        graph.total_entities,
        graph.total_relationships,
        out.build.total_errors
    );
    if let (Some(dir), Some(index)) = (&out.index_dir, &out.index) {
        let _ = writeln!(
            text,
            "Retrieval index: {}\n  files: {}\n  chunks: {}\n  time: {}ms",
            dir.display(),
            index.files,
            index.chunks,
            index.time_ms
        );
    }
    text
}

pub fn entities(list: &[EntitySummary], empty: &str) -> String {
    if list.is_empty() {
        return format!("{empty}\n");
    }
    let mut text = String::new();
    for (i, entity) in list.iter().enumerate() {
        let _ = writeln!(
            text,
            "{}. {} [{}] {}:{}\n   {}",
            i + 1,
            entity.qualified_name,
            entity.kind,
            entity.file,
            entity.line,
            entity.id
        );
    }
    text
}

pub fn context(bundle: &ContextBundle) -> String {
    let mut text = bundle.context_text.clone();
    let _ = write!(
        text,
        "\n\n[{} tokens{}, sufficiency {:.2}]\n",
        bundle.total_tokens,
        if bundle.truncated { ", truncated" } else { "" },
        bundle.sufficiency_score
    );
    text
}

pub fn retrieval(result: &RetrievalResult) -> String {
    let mut text = format!(
        "Task: {} ({:.2})  Mode: {}  Sufficiency: {:.2}{}\n",
        result.task_type,
        result.task_confidence,
        result.retrieval_mode,
        result.sufficiency_score,
        if result.needs_escalation { "  (escalate)" } else { "" }
    );
    for selected in &result.selected_entities {
        let _ = writeln!(
            text,
            "  {}. {} ({}, {:.3})",
            selected.rank, selected.entity_id, selected.source, selected.score
        );
    }
    for error in &result.errors {
        let _ = writeln!(text, "  ! {error}");
    }
    if !result.context_text.is_empty() {
        let _ = writeln!(text, "\n{}", result.context_text);
    }
    text
}

pub fn trace(traced: &[TracedEntity]) -> String {
    if traced.is_empty() {
        return "No calls found\n".to_string();
    }
    let mut text = String::new();
    for hop in traced {
        let _ = writeln!(
            text,
            "{}{} [{}] {}",
            "  ".repeat(hop.call_depth.saturating_sub(1)),
            hop.entity.qualified_name,
            hop.entity.kind,
            hop.entity.id
        );
    }
    text
}

pub fn impact(report: &ImpactReport) -> String {
    let mut text = format!(
        "Impact of {}\n  risk score: {:.2}\n  direct dependents: {}\n  transitive dependents: {}\n",
        report.entity_id,
        report.risk_score,
        report.direct_dependents.len(),
        report.transitive_dependents.len()
    );
    if !report.affected_files.is_empty() {
        text.push_str("  affected files:\n");
        for file in &report.affected_files {
            let _ = writeln!(text, "    {file}");
        }
    }
    text
}

pub fn stats(stats: &ServiceStats) -> String {
    let mut text = format!("Entities: {}\n", stats.graph.total_entities);
    for (kind, count) in &stats.graph.entities_by_kind {
        let _ = writeln!(text, "  {kind}: {count}");
    }
    let _ = writeln!(text, "Relationships: {}", stats.graph.total_relationships);
    for (kind, count) in &stats.graph.relationships_by_kind {
        let _ = writeln!(text, "  {kind}: {count}");
    }
    if let Some(chunks) = stats.total_chunks {
        let _ = writeln!(text, "Chunks: {chunks}");
    }
    if let Some(vectors) = stats.vector_index_size {
        let _ = writeln!(text, "Vectors: {vectors}");
    }
    text
}

pub fn worker(stats: &WorkerStats) -> String {
    format!(
        "Reindexed {} files ({} unchanged, {} failed)\n",
        stats.indexed, stats.unchanged, stats.failed
    )
}
