use crate::error::{GraphError, Result};
use crate::types::{Entity, EntityKind, Location, Relationship, RelationshipKind, RelationshipTarget};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};


/// File name used when a store path points at a directory
pub const DEFAULT_STORE_FILE: &str = "codeweave_knowledge.json";

/// Snapshot format version written by [`KnowledgeStore::save`]
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Upper bound on call-trace depth
pub const MAX_TRACE_DEPTH: usize = 5;

/// Upper bound on call-trace result count
pub const MAX_TRACE_RESULTS: usize = 100;

/// Direction of a call-graph traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceDirection {
    Callers,
    Callees,
}

/// Entity reached by [`KnowledgeStore::trace_calls`]
#[derive(Debug, Clone, Serialize)]
pub struct TracedEntity {
    pub entity: Entity,
    /// Hop count from the origin (1 = direct)
    pub call_depth: usize,
}

/// Blast radius of changing one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub entity_id: String,
    pub direct_dependents: Vec<String>,
    pub transitive_dependents: Vec<String>,
    pub affected_files: Vec<String>,
    pub risk_score: f64,
}

/// Aggregate counts over a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entities_by_kind: BTreeMap<String, usize>,
    pub relationships_by_kind: BTreeMap<String, usize>,
}


/// Edge kinds that make one entity depend on another
const DEPENDENCY_KINDS: &[RelationshipKind] = &[RelationshipKind::Calls, RelationshipKind::Imports];

/// In-memory knowledge graph backed by a `petgraph` stable graph
///
/// Entities are nodes and keep their insertion order; a later insert with an
/// existing id replaces the earlier entity in place. Every relationship is
/// kept in a flat list, and those with a resolved target whose endpoints both
/// exist also become edges. Unresolved and external targets never do.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeStore {
    graph: StableDiGraph<Entity, Link>,
    nodes: HashMap<String, NodeIndex>,
    relationships: Vec<Relationship>,
    /// Resolved relationships keyed by the endpoint id they are still missing
    pending: HashMap<String, Vec<usize>>,
    metadata: serde_json::Value,
}

/// Edge weight: relationship kind plus its position in the relationship list
#[derive(Debug, Clone, Copy)]
struct Link {
    kind: RelationshipKind,
    seq: usize,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self {
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            ..Self::default()
        }
    }

    /// Insert or replace an entity (last write wins, position kept)
    pub fn insert_entity(&mut self, entity: Entity) {
        if let Some(&node) = self.nodes.get(&entity.id) {
            self.graph[node] = entity;
            return;
        }
        let id = entity.id.clone();
        let node = self.graph.add_node(entity);
        let waiting = self.pending.remove(&id).unwrap_or_default();
        self.nodes.insert(id, node);
        for seq in waiting {
            self.link(seq);
        }
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        let seq = self.relationships.len();
        self.relationships.push(relationship);
        self.link(seq);
    }

    /// Turn relationship `seq` into an edge once both endpoints exist
    fn link(&mut self, seq: usize) {
        let rel = &self.relationships[seq];
        let RelationshipTarget::Resolved(target) = &rel.target else {
            return;
        };
        let from = self.nodes.get(&rel.source_id).copied();
        let to = self.nodes.get(target).copied();
        match (from, to) {
            (Some(from), Some(to)) => {
                self.graph.add_edge(from, to, Link { kind: rel.kind, seq });
            }
            (None, _) => self
                .pending
                .entry(rel.source_id.clone())
                .or_default()
                .push(seq),
            (Some(_), None) => self.pending.entry(target.clone()).or_default().push(seq),
        }
    }

    /// Rewrite relationship targets in place; returns how many changed
    pub(crate) fn retarget(
        &mut self,
        mut resolve: impl FnMut(&Relationship) -> Option<RelationshipTarget>,
    ) -> usize {
        let mut changed = 0;
        for rel in &mut self.relationships {
            if let Some(target) = resolve(rel) {
                if target != rel.target {
                    rel.target = target;
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            self.graph.clear_edges();
            self.pending.clear();
            for seq in 0..self.relationships.len() {
                self.link(seq);
            }
        }
        changed
    }

    pub fn set_metadata(&mut self, metadata: serde_json::Value) {
        self.metadata = metadata;
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.nodes.get(id).map(|&node| &self.graph[node])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Entities in insertion order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.graph.node_indices().map(move |node| &self.graph[node])
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Case-insensitive substring match on name or qualified name
    pub fn search(&self, pattern: &str) -> Vec<&Entity> {
        let needle = pattern.to_lowercase();
        self.entities()
            .filter(|e| {
                e.name.to_lowercase().contains(&needle)
                    || e.qualified_name.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn list_by_kind(&self, kind: EntityKind) -> Vec<&Entity> {
        self.entities().filter(|e| e.kind == kind).collect()
    }

    /// Nodes across edges of the given kinds, deduplicated in relationship order
    fn linked(
        &self,
        node: NodeIndex,
        direction: Direction,
        kinds: &[RelationshipKind],
    ) -> Vec<NodeIndex> {
        let mut edges: Vec<(usize, NodeIndex)> = self
            .graph
            .edges_directed(node, direction)
            .filter(|edge| kinds.contains(&edge.weight().kind))
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.weight().seq, other)
            })
            .collect();
        edges.sort_unstable_by_key(|&(seq, _)| seq);

        let mut seen = HashSet::new();
        edges
            .into_iter()
            .map(|(_, other)| other)
            .filter(|other| seen.insert(*other))
            .collect()
    }

    fn neighbours(
        &self,
        id: &str,
        direction: Direction,
        kinds: &[RelationshipKind],
    ) -> Vec<&Entity> {
        let Some(&node) = self.nodes.get(id) else {
            return Vec::new();
        };
        self.linked(node, direction, kinds)
            .into_iter()
            .map(|other| &self.graph[other])
            .collect()
    }

    pub fn get_callers(&self, id: &str) -> Vec<&Entity> {
        self.neighbours(id, Direction::Incoming, &[RelationshipKind::Calls])
    }

    pub fn get_callees(&self, id: &str) -> Vec<&Entity> {
        self.neighbours(id, Direction::Outgoing, &[RelationshipKind::Calls])
    }

    pub fn get_children(&self, id: &str) -> Vec<&Entity> {
        self.neighbours(id, Direction::Outgoing, &[RelationshipKind::Contains])
    }

    /// First CONTAINS parent in relationship order
    pub fn get_parent(&self, id: &str) -> Option<&Entity> {
        self.get_parents(id).into_iter().next()
    }

    /// Every CONTAINS parent in relationship order
    pub fn get_parents(&self, id: &str) -> Vec<&Entity> {
        self.neighbours(id, Direction::Incoming, &[RelationshipKind::Contains])
    }

    pub fn get_imports(&self, id: &str) -> Vec<&Entity> {
        self.neighbours(id, Direction::Outgoing, &[RelationshipKind::Imports])
    }

    /// Entities this one calls or imports
    pub fn get_dependencies(&self, id: &str) -> Vec<&Entity> {
        self.neighbours(id, Direction::Outgoing, DEPENDENCY_KINDS)
    }

    /// Entities that call or import this one
    pub fn get_dependents(&self, id: &str) -> Vec<&Entity> {
        self.neighbours(id, Direction::Incoming, DEPENDENCY_KINDS)
    }

    fn node(&self, id: &str) -> Result<NodeIndex> {
        self.nodes
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::EntityNotFound(id.to_string()))
    }

    /// Breadth-first walk along CALLS edges
    ///
    /// `depth` is clamped to `1..=5` and `max_results` to `1..=100`. The
    /// origin itself is never part of the result.
    pub fn trace_calls(
        &self,
        id: &str,
        direction: TraceDirection,
        depth: usize,
        max_results: usize,
    ) -> Result<Vec<TracedEntity>> {
        let start = self.node(id)?;
        let depth = depth.clamp(1, MAX_TRACE_DEPTH);
        let max_results = max_results.clamp(1, MAX_TRACE_RESULTS);
        let direction = match direction {
            TraceDirection::Callers => Direction::Incoming,
            TraceDirection::Callees => Direction::Outgoing,
        };

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0)]);
        let mut out = Vec::new();

        while let Some((current, level)) = queue.pop_front() {
            if level >= depth {
                continue;
            }
            for next in self.linked(current, direction, &[RelationshipKind::Calls]) {
                if !visited.insert(next) {
                    continue;
                }
                out.push(TracedEntity {
                    entity: self.graph[next].clone(),
                    call_depth: level + 1,
                });
                if out.len() >= max_results {
                    return Ok(out);
                }
                queue.push_back((next, level + 1));
            }
        }
        Ok(out)
    }

    /// Direct and transitive dependents of an entity
    pub fn get_impact(&self, id: &str, max_depth: usize) -> Result<ImpactReport> {
        let start = self.node(id)?;
        let max_depth = max_depth.max(1);

        let mut visited = HashSet::from([start]);
        let mut frontier = vec![start];
        let mut direct = Vec::new();
        let mut transitive = Vec::new();
        let mut files = Vec::new();
        let mut seen_files = HashSet::new();

        for level in 1..=max_depth {
            let mut next = Vec::new();
            for current in frontier {
                for dependent in self.linked(current, Direction::Incoming, DEPENDENCY_KINDS) {
                    if !visited.insert(dependent) {
                        continue;
                    }
                    let entity = &self.graph[dependent];
                    if seen_files.insert(entity.file_path()) {
                        files.push(entity.file_path().to_string());
                    }
                    if level == 1 {
                        direct.push(entity.id.clone());
                    } else {
                        transitive.push(entity.id.clone());
                    }
                    next.push(dependent);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let risk_score = risk_score(direct.len(), transitive.len());
        Ok(ImpactReport {
            entity_id: id.to_string(),
            direct_dependents: direct,
            transitive_dependents: transitive,
            affected_files: files,
            risk_score,
        })
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            total_entities: self.graph.node_count(),
            total_relationships: self.relationships.len(),
            ..GraphStats::default()
        };
        for entity in self.entities() {
            *stats
                .entities_by_kind
                .entry(entity.kind.as_str().to_string())
                .or_insert(0) += 1;
        }
        for rel in &self.relationships {
            *stats
                .relationships_by_kind
                .entry(rel.kind.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Write a versioned JSON snapshot; returns the file actually written
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = resolve_store_path(path.as_ref());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            metadata: &self.metadata,
            entities: EntityMap(self),
            relationships: &self.relationships,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&path, json)?;
        log::info!(
            "Saved knowledge store to {} ({} entities, {} relationships)",
            path.display(),
            self.graph.node_count(),
            self.relationships.len()
        );
        Ok(path)
    }

    /// Load a snapshot written by [`save`](Self::save)
    ///
    /// Unknown entity or relationship kinds fail the load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = resolve_store_path(path.as_ref());
        let raw = fs::read_to_string(&path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: RawSnapshot = serde_json::from_str(raw)?;
        if let Some(version) = snapshot.version.as_deref() {
            if !version.starts_with("1.") && version != "1" {
                return Err(GraphError::UnsupportedVersion(version.to_string()));
            }
        }

        let mut store = Self::new();
        if !snapshot.metadata.is_null() {
            store.metadata = snapshot.metadata;
        }
        for (key, record) in snapshot.entities.0 {
            store.insert_entity(record.into_entity(key)?);
        }
        for record in snapshot.relationships {
            store.add_relationship(record.into_relationship()?);
        }
        Ok(store)
    }
}

/// Append the default file name when `path` is a directory
pub fn resolve_store_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DEFAULT_STORE_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Monotone in both counts, bounded to `[0, 1]`
fn risk_score(direct: usize, transitive: usize) -> f64 {
    let raw = 0.1 * direct as f64 + 0.05 * transitive as f64;
    (raw.min(1.0) * 100.0).round() / 100.0
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: &'a str,
    metadata: &'a serde_json::Value,
    entities: EntityMap<'a>,
    relationships: &'a [Relationship],
}

/// Serializes entities as an id-keyed map in insertion order
struct EntityMap<'a>(&'a KnowledgeStore);

impl Serialize for EntityMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.graph.node_count()))?;
        for entity in self.0.entities() {
            map.serialize_entry(&entity.id, entity)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    entities: OrderedRecords,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

/// Entity records in document order
#[derive(Default)]
struct OrderedRecords(Vec<(String, RawEntity)>);

impl<'de> Deserialize<'de> for OrderedRecords {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = OrderedRecords;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of entity id to entity record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, RawEntity>()? {
                    out.push((key, value));
                }
                Ok(OrderedRecords(out))
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    id: Option<String>,
    kind: String,
    name: String,
    qualified_name: String,
    location: Location,
    #[serde(default)]
    docstring: Option<String>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    source_code: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl RawEntity {
    fn into_entity(self, key: String) -> Result<Entity> {
        Ok(Entity {
            id: self.id.unwrap_or(key),
            kind: self.kind.parse()?,
            name: self.name,
            qualified_name: self.qualified_name,
            location: self.location,
            docstring: self.docstring,
            signature: self.signature,
            source_code: self.source_code,
            metadata: self.metadata,
        })
    }
}

#[derive(Deserialize)]
struct RawRelationship {
    source_id: String,
    target_id: String,
    kind: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl RawRelationship {
    fn into_relationship(self) -> Result<Relationship> {
        Ok(Relationship {
            source_id: self.source_id,
            target: RelationshipTarget::from(self.target_id),
            kind: self.kind.parse()?,
            metadata: self.metadata,
        })
    }
}
