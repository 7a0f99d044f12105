use codeweave_context::TaskType;
use codeweave_graph::{Entity, EntityKind, KnowledgeStore, Location, TraceDirection};
use codeweave_search::ChunkSource;
use codeweave_service::{
    AppConfig, ClientRegistry, KnowledgeService, RetrievalMode, RetrievalOptions, ServiceError,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const PRICING: &str = r#"def sum_items(items):
    """Add up the price of every item in the cart, skipping nothing."""
    return sum(apply_discount(item.price) for item in items)


def apply_discount(price):
    return price * 0.9
"#;

const CHECKOUT: &str = r#"def checkout(cart):
    return sum_items(cart)
"#;

struct Fixture {
    project: TempDir,
    state: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let project = TempDir::new().expect("project dir");
        std::fs::write(project.path().join("pricing.py"), PRICING).expect("write pricing");
        std::fs::write(project.path().join("checkout.py"), CHECKOUT).expect("write checkout");
        Self {
            project,
            state: TempDir::new().expect("state dir"),
        }
    }

    fn root(&self) -> &Path {
        self.project.path()
    }

    fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.embedding.dimension = 32;
        config.paths.store = self.state.path().join("knowledge.json");
        config.paths.index_dir = self.state.path().join("index");
        config
    }

    fn service(&self) -> KnowledgeService {
        KnowledgeService::new(self.config(), ClientRegistry::new()).expect("service")
    }
}

#[tokio::test]
async fn indexed_project_answers_semantically() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let report = service.index(fixture.root(), &[]).await.expect("index");
    assert_eq!(report.index.as_ref().map(|s| s.files), Some(2));
    assert!(report.index_dir.is_some());

    // A fresh service only sees what was written to disk.
    let fresh = fixture.service();
    let result = fresh
        .retrieve_context_for_query(
            "sum_items apply_discount price",
            RetrievalOptions {
                task: Some(TaskType::Explain),
                ..RetrievalOptions::default()
            },
        )
        .await;

    assert_eq!(result.retrieval_mode, RetrievalMode::Semantic);
    assert_eq!(result.task_type, TaskType::Explain);
    assert_eq!(result.task_confidence, 1.0);
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert!(!result.selected_entities.is_empty());
    assert!(result.selected_entities.len() <= 3);
    assert!(!result.evidence.is_empty());
    assert!(result.selected_entities.iter().all(|s| s.source == "retrieved"));
    assert!(!result.context_text.is_empty());
    assert!((0.0..=1.0).contains(&result.sufficiency_score));
    assert_eq!(result.needs_escalation, result.sufficiency_score < 0.8);

    let ranks: Vec<usize> = result.selected_entities.iter().map(|s| s.rank).collect();
    let expected: Vec<usize> = (1..=ranks.len()).collect();
    assert_eq!(ranks, expected);
}

#[tokio::test]
async fn missing_index_falls_back_to_name_matching() {
    let fixture = Fixture::new();
    let service = fixture.service();
    service.analyze(fixture.root(), None, &[]).expect("analyze");

    let result = service
        .retrieve_context_for_query(
            "where is sum_items defined",
            RetrievalOptions {
                limit_entities: 1,
                ..RetrievalOptions::default()
            },
        )
        .await;

    assert_eq!(result.retrieval_mode, RetrievalMode::Lexical);
    assert!(!result.errors.is_empty());
    assert!(result.evidence.is_empty());
    assert_eq!(result.selected_entities.len(), 1);
    assert!(result.selected_entities[0].entity_id.ends_with("::sum_items"));
    assert_eq!(result.selected_entities[0].source, "lexical");
    assert!(result.context_text.contains("def sum_items"));
    assert!(result.total_tokens > 0);
}

#[tokio::test]
async fn missing_store_explains_how_to_build_it() {
    let fixture = Fixture::new();
    let service = fixture.service();

    let err = service.search("sum").unwrap_err();
    assert!(matches!(err, ServiceError::StoreNotFound(_)));
    assert!(err.to_string().contains("codeweave analyze"));

    let result = service
        .retrieve_context_for_query("sum_items", RetrievalOptions::default())
        .await;
    assert_eq!(result.retrieval_mode, RetrievalMode::None);
    assert!(result.selected_entities.is_empty());
    assert_eq!(result.sufficiency_score, 0.0);
    assert!(result.needs_escalation);
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test]
async fn blank_query_retrieves_nothing() {
    let fixture = Fixture::new();
    let service = fixture.service();
    service.analyze(fixture.root(), None, &[]).expect("analyze");

    let result = service
        .retrieve_context_for_query("   ", RetrievalOptions::default())
        .await;
    assert_eq!(result.retrieval_mode, RetrievalMode::None);
    assert!(result.context_text.is_empty());
    assert!(!result.errors.is_empty());
}

#[test]
fn context_and_call_queries_over_an_analyzed_project() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let report = service.analyze(fixture.root(), None, &[]).expect("analyze");
    assert_eq!(report.build.total_errors, 0);
    assert!(report.store_path.is_file());

    let bundle = service.get_context("sum_it", None, None).expect("fallback match");
    assert_eq!(bundle.target_entity.name, "sum_items");
    assert!(bundle.context_text.contains("# Source Code"));

    let missing = service.get_context("does_not_exist", None, None).unwrap_err();
    assert!(missing.is_not_found());

    let sum_items = bundle.target_entity.id.clone();
    let callers: Vec<String> = service
        .get_callers(&sum_items)
        .expect("callers")
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(callers, vec!["checkout"]);
    let callees: Vec<String> = service
        .get_callees(&sum_items)
        .expect("callees")
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(callees, vec!["apply_discount"]);
    assert!(service.get_callers("nope::nope").unwrap_err().is_not_found());

    let traced = service
        .trace_calls(&sum_items, TraceDirection::Callees, 50)
        .expect("trace");
    assert!(traced.iter().any(|t| t.entity.name == "apply_discount" && t.call_depth == 1));

    let stats = service.stats().expect("stats");
    assert!(stats.graph.total_entities >= 5);
    assert_eq!(stats.total_chunks, None);
}

#[test]
fn reload_swaps_in_a_fresh_snapshot() {
    let fixture = Fixture::new();
    let writer = fixture.service();
    writer.analyze(fixture.root(), None, &[]).expect("analyze");

    let reader = fixture.service();
    let before = reader.store().expect("store");
    assert!(reader.search("refund_order").expect("search").is_empty());

    std::fs::write(
        fixture.root().join("returns.py"),
        "def refund_order(order):\n    return order\n",
    )
    .expect("write refunds");
    writer.analyze(fixture.root(), None, &[]).expect("reanalyze");

    assert!(reader.search("refund_order").expect("search").is_empty());
    reader.reload().expect("reload");
    assert_eq!(reader.search("refund_order").expect("search").len(), 1);
    // Snapshots taken before the reload are left untouched.
    assert!(before.search("refund_order").is_empty());
}

#[test]
fn in_memory_store_needs_no_files() {
    let mut store = KnowledgeStore::new();
    store.insert_entity(
        Entity::new("mem.py::ping", EntityKind::Function, "ping", "ping", Location::new("mem.py", 1, 2))
            .with_source("def ping():\n    return 'pong'"),
    );
    let service =
        KnowledgeService::with_store(AppConfig::default(), ClientRegistry::new(), store).expect("service");

    assert_eq!(service.get_entity("mem.py::ping").expect("entity").name, "ping");
    assert!(service.get_entity("mem.py::pong").unwrap_err().is_not_found());
    let bundle = service
        .get_context("mem.py::ping", Some(500), Some(TaskType::Explain))
        .expect("context");
    assert!(bundle.context_text.contains("return 'pong'"));
    assert_eq!(bundle.task_type, Some(TaskType::Explain));
}

#[tokio::test]
async fn mismatched_index_falls_back_to_name_matching() {
    let fixture = Fixture::new();
    fixture.service().index(fixture.root(), &[]).await.expect("index");

    let mut config = fixture.config();
    config.embedding.dimension = 16;
    let service = KnowledgeService::new(config, ClientRegistry::new()).expect("service");
    let result = service
        .retrieve_context_for_query("where is sum_items defined", RetrievalOptions::default())
        .await;

    assert_eq!(result.retrieval_mode, RetrievalMode::Lexical);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("manifest mismatch on dimension"), "{}", result.errors[0]);
    assert!(result.evidence.is_empty());
    assert!(result.context_text.contains("def sum_items"));
}

#[tokio::test]
async fn search_engine_keeps_the_snapshot_it_was_given() {
    let fixture = Fixture::new();
    fixture.service().index(fixture.root(), &[]).await.expect("index");

    let reader = fixture.service();
    let before = reader.store().expect("store");

    // Drop every call edge from the saved graph; the index on disk stays.
    std::fs::write(fixture.root().join("pricing.py"), "def sum_items(items):\n    return 0\n")
        .expect("rewrite pricing");
    std::fs::write(fixture.root().join("checkout.py"), "def checkout(cart):\n    return cart\n")
        .expect("rewrite checkout");
    fixture.service().analyze(fixture.root(), None, &[]).expect("reanalyze");
    reader.reload().expect("reload");

    let current = reader
        .search_engine()
        .await
        .expect("engine")
        .search_scored("sum_items", 1, true)
        .await
        .expect("search");
    assert_eq!(current.len(), 1);

    let pinned = reader
        .search_engine_with(Arc::clone(&before))
        .await
        .expect("engine")
        .search_scored("sum_items", 1, true)
        .await
        .expect("search");
    assert_eq!(pinned[0].chunk.id, current[0].chunk.id);
    for hit in pinned.iter().filter(|h| h.source == ChunkSource::Dependency) {
        assert!(!before.get_callers(&hit.chunk.entity_id).is_empty());
    }
}
