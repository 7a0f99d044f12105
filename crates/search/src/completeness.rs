use codeweave_chunker::CodeChunk;
use codeweave_graph::KnowledgeStore;
use codeweave_vector_store::ChunkRepository;
use std::collections::HashSet;

/// Seed chunk followed by the chunks of entities it calls
///
/// Breadth-first over callee edges from the seed's entity; `max_depth = 1`
/// means direct callees only. Entities are visited once and no chunk id
/// appears twice. The seed always comes first.
pub fn expand_dependencies(
    seed: &CodeChunk,
    repository: &dyn ChunkRepository,
    store: &KnowledgeStore,
    max_depth: usize,
) -> Vec<CodeChunk> {
    let mut expanded = vec![seed.clone()];
    let mut collected: HashSet<String> = HashSet::from([seed.id.clone()]);
    let mut visited: HashSet<String> = HashSet::from([seed.entity_id.clone()]);
    let mut frontier = vec![seed.entity_id.clone()];

    for _ in 0..max_depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for entity_id in &frontier {
            for callee in store.get_callees(entity_id) {
                if !visited.insert(callee.id.clone()) {
                    continue;
                }
                next.push(callee.id.clone());
                for chunk in repository.get_by_entity(&callee.id) {
                    if collected.insert(chunk.id.clone()) {
                        expanded.push(chunk);
                    }
                }
            }
        }
        frontier = next;
    }

    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeweave_graph::{Entity, EntityKind, Location, Relationship, RelationshipKind};
    use codeweave_vector_store::InMemoryChunkRepository;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn function(id: &str) -> Entity {
        Entity::new(id, EntityKind::Function, id, id, Location::new("m.py", 1, 1))
    }

    /// a -> b -> c, a -> c, b -> a
    fn chain() -> (KnowledgeStore, InMemoryChunkRepository) {
        let mut store = KnowledgeStore::new();
        for id in ["a", "b", "c"] {
            store.insert_entity(function(id));
        }
        store.add_relationship(Relationship::new("a", "b", RelationshipKind::Calls));
        store.add_relationship(Relationship::new("b", "c", RelationshipKind::Calls));
        store.add_relationship(Relationship::new("a", "c", RelationshipKind::Calls));
        store.add_relationship(Relationship::new("b", "a", RelationshipKind::Calls));

        let repo = InMemoryChunkRepository::new();
        for id in ["a", "b", "c"] {
            repo.add(CodeChunk::new(format!("{id}::0"), id, id));
        }
        repo.add(CodeChunk::new("b::1", "b", "b tail"));
        (store, repo)
    }

    fn ids(chunks: &[CodeChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn depth_one_takes_direct_callees() {
        let (store, repo) = chain();
        let seed = repo.get("a::0").unwrap();
        let expanded = expand_dependencies(&seed, &repo, &store, 1);
        assert_eq!(ids(&expanded), vec!["a::0", "b::0", "b::1", "c::0"]);
    }

    #[test]
    fn cycles_do_not_revisit_the_seed() {
        let (store, repo) = chain();
        let seed = repo.get("b::1").unwrap();
        let expanded = expand_dependencies(&seed, &repo, &store, 3);
        assert_eq!(ids(&expanded), vec!["b::1", "c::0", "a::0"]);
    }

    #[test]
    fn zero_depth_returns_only_the_seed() {
        let (store, repo) = chain();
        let seed = repo.get("a::0").unwrap();
        assert_eq!(ids(&expand_dependencies(&seed, &repo, &store, 0)), vec!["a::0"]);
    }

    proptest! {
        #[test]
        fn never_duplicates_and_keeps_seed(
            edges in proptest::collection::vec((0usize..6, 0usize..6), 0..20),
            depth in 0usize..4,
            seed_idx in 0usize..6,
        ) {
            let mut store = KnowledgeStore::new();
            let repo = InMemoryChunkRepository::new();
            for i in 0..6 {
                let id = format!("e{i}");
                store.insert_entity(function(&id));
                repo.add(CodeChunk::new(format!("{id}::0"), &id, "x"));
                repo.add(CodeChunk::new(format!("{id}::1"), &id, "y"));
            }
            for (from, to) in edges {
                store.add_relationship(Relationship::new(format!("e{from}"), format!("e{to}"), RelationshipKind::Calls));
            }

            let seed = CodeChunk::new(format!("e{seed_idx}::0"), format!("e{seed_idx}"), "x");
            let expanded = expand_dependencies(&seed, &repo, &store, depth);
            prop_assert_eq!(&expanded[0].id, &seed.id);
            let unique: HashSet<_> = expanded.iter().map(|c| c.id.clone()).collect();
            prop_assert_eq!(unique.len(), expanded.len());
        }
    }
}
