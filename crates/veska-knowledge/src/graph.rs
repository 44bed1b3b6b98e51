use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use veska_core::error::{Result, VeskaError};

use crate::threads::ThreadEntry;

/// BFS result cap for `related`.
const MAX_RELATED: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    pub label: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GraphState {
    entities: HashMap<String, Entity>,
    edges: Vec<Edge>,
    /// src -> edge indexes, rebuilt on load.
    #[serde(skip)]
    adjacency: HashMap<String, Vec<usize>>,
}

impl GraphState {
    fn rebuild_adjacency(&mut self) {
        self.adjacency.clear();
        for (idx, edge) in self.edges.iter().enumerate() {
            self.adjacency.entry(edge.src.clone()).or_default().push(idx);
        }
    }
}

/// Directed labeled multigraph of entities referenced across dispatcher
/// calls. Cycles are allowed; traversal uses a visited set.
pub struct KnowledgeGraph {
    state: RwLock<GraphState>,
    persist_path: Option<PathBuf>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            persist_path: None,
        }
    }

    /// Enable persistence to `graph.json`, loading existing state first.
    pub fn with_persist_path(mut self, path: PathBuf) -> Self {
        if path.exists() {
            match std::fs::read_to_string(&path)
                .map_err(VeskaError::from)
                .and_then(|s| Ok(serde_json::from_str::<GraphState>(&s)?))
            {
                Ok(mut state) => {
                    state.rebuild_adjacency();
                    self.state = RwLock::new(state);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "graph state unreadable, starting empty"),
            }
        }
        self.persist_path = Some(path);
        self
    }

    /// Insert or replace an entity.
    pub fn upsert_entity(
        &self,
        id: &str,
        kind: &str,
        attributes: HashMap<String, String>,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.entities.insert(
            id.to_string(),
            Entity {
                id: id.to_string(),
                kind: kind.to_string(),
                attributes,
            },
        );
        drop(state);
        self.persist();
        Ok(())
    }

    /// Add a directed edge. Both endpoints must exist.
    pub fn add_edge(
        &self,
        src: &str,
        dst: &str,
        label: &str,
        attributes: HashMap<String, String>,
    ) -> Result<()> {
        let mut state = self.write()?;
        if !state.entities.contains_key(src) {
            return Err(VeskaError::NotFound(format!("entity {}", src)));
        }
        if !state.entities.contains_key(dst) {
            return Err(VeskaError::NotFound(format!("entity {}", dst)));
        }
        let idx = state.edges.len();
        state.edges.push(Edge {
            src: src.to_string(),
            dst: dst.to_string(),
            label: label.to_string(),
            attributes,
        });
        state.adjacency.entry(src.to_string()).or_default().push(idx);
        drop(state);
        self.persist();
        Ok(())
    }

    pub fn entity(&self, id: &str) -> Result<Option<Entity>> {
        Ok(self.read()?.entities.get(id).cloned())
    }

    pub fn entity_count(&self) -> usize {
        self.read().map(|s| s.entities.len()).unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.read().map(|s| s.edges.len()).unwrap_or(0)
    }

    /// Create graph records for a task thread: one thread entity, one entity
    /// per entry, and one entity per reference mentioned by an entry.
    /// Idempotent over re-ingestion of the same thread.
    pub fn ingest_thread(
        &self,
        thread_id: &str,
        title: &str,
        entries: &[ThreadEntry],
    ) -> Result<()> {
        let mut state = self.write()?;
        state.entities.insert(
            thread_id.to_string(),
            Entity {
                id: thread_id.to_string(),
                kind: "thread".to_string(),
                attributes: HashMap::from([("title".to_string(), title.to_string())]),
            },
        );

        for entry in entries {
            let label: String = entry.text.chars().take(80).collect();
            let already_ingested = state.entities.contains_key(&entry.entry_id);
            state.entities.insert(
                entry.entry_id.clone(),
                Entity {
                    id: entry.entry_id.clone(),
                    kind: "entry".to_string(),
                    attributes: HashMap::from([("text".to_string(), label)]),
                },
            );
            if !already_ingested {
                let idx = state.edges.len();
                state.edges.push(Edge {
                    src: thread_id.to_string(),
                    dst: entry.entry_id.clone(),
                    label: "HAS_ENTRY".to_string(),
                    attributes: HashMap::new(),
                });
                state
                    .adjacency
                    .entry(thread_id.to_string())
                    .or_default()
                    .push(idx);

                for reference in &entry.references {
                    state
                        .entities
                        .entry(reference.clone())
                        .or_insert_with(|| Entity {
                            id: reference.clone(),
                            kind: "reference".to_string(),
                            attributes: HashMap::new(),
                        });
                    let idx = state.edges.len();
                    state.edges.push(Edge {
                        src: entry.entry_id.clone(),
                        dst: reference.clone(),
                        label: "REFERENCES".to_string(),
                        attributes: HashMap::new(),
                    });
                    state
                        .adjacency
                        .entry(entry.entry_id.clone())
                        .or_default()
                        .push(idx);
                }
            }
        }
        drop(state);
        self.persist();
        Ok(())
    }

    /// Entities reachable within `depth` hops, starting entity included.
    /// Result is capped at 64 entities.
    pub fn related(&self, id: &str, depth: usize) -> Result<Vec<Entity>> {
        let state = self.read()?;
        let Some(start) = state.entities.get(id) else {
            return Err(VeskaError::NotFound(format!("entity {}", id)));
        };

        let mut visited: HashSet<String> = HashSet::from([id.to_string()]);
        let mut result: Vec<Entity> = vec![start.clone()];
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(id.to_string(), 0)]);

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth || result.len() >= MAX_RELATED {
                continue;
            }
            for &edge_idx in state.adjacency.get(&current).into_iter().flatten() {
                let dst = &state.edges[edge_idx].dst;
                if visited.contains(dst) {
                    continue;
                }
                visited.insert(dst.clone());
                if let Some(entity) = state.entities.get(dst) {
                    result.push(entity.clone());
                    if result.len() >= MAX_RELATED {
                        break;
                    }
                }
                queue.push_back((dst.clone(), hops + 1));
            }
        }

        Ok(result)
    }

    fn persist(&self) {
        let Some(ref path) = self.persist_path else {
            return;
        };
        let result = self
            .read()
            .and_then(|state| Ok(serde_json::to_string(&*state)?))
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json).map_err(VeskaError::from)
            });
        if let Err(e) = result {
            warn!(error = %e, "graph persistence failed");
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, GraphState>> {
        self.state
            .read()
            .map_err(|e| VeskaError::Internal(format!("graph lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, GraphState>> {
        self.state
            .write()
            .map_err(|e| VeskaError::Internal(format!("graph lock poisoned: {}", e)))
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, text: &str, refs: &[&str]) -> ThreadEntry {
        ThreadEntry {
            entry_id: id.to_string(),
            timestamp: Utc::now(),
            text: text.to_string(),
            references: refs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn related_depth_zero_is_self() {
        let graph = KnowledgeGraph::new();
        graph.upsert_entity("a", "thing", HashMap::new()).unwrap();
        let related = graph.related("a", 0).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, "a");
    }

    #[test]
    fn related_is_monotonic_in_depth() {
        let graph = KnowledgeGraph::new();
        for id in ["a", "b", "c", "d"] {
            graph.upsert_entity(id, "thing", HashMap::new()).unwrap();
        }
        graph.add_edge("a", "b", "L", HashMap::new()).unwrap();
        graph.add_edge("b", "c", "L", HashMap::new()).unwrap();
        graph.add_edge("c", "d", "L", HashMap::new()).unwrap();

        let mut previous = 0;
        for depth in 0..=4 {
            let count = graph.related("a", depth).unwrap().len();
            assert!(count >= previous);
            previous = count;
        }
        assert_eq!(graph.related("a", 4).unwrap().len(), 4);
    }

    #[test]
    fn cycles_terminate() {
        let graph = KnowledgeGraph::new();
        graph.upsert_entity("x", "t", HashMap::new()).unwrap();
        graph.upsert_entity("y", "t", HashMap::new()).unwrap();
        graph.add_edge("x", "y", "L", HashMap::new()).unwrap();
        graph.add_edge("y", "x", "L", HashMap::new()).unwrap();

        let related = graph.related("x", 10).unwrap();
        assert_eq!(related.len(), 2);
    }

    #[test]
    fn edge_requires_both_endpoints() {
        let graph = KnowledgeGraph::new();
        graph.upsert_entity("a", "t", HashMap::new()).unwrap();
        let err = graph.add_edge("a", "ghost", "L", HashMap::new()).unwrap_err();
        assert!(matches!(err, VeskaError::NotFound(_)));
    }

    #[test]
    fn ingest_thread_links_entries_and_references() {
        let graph = KnowledgeGraph::new();
        graph
            .ingest_thread(
                "thread-1",
                "Ship it",
                &[entry("entry-1", "Task created", &["mem-1"])],
            )
            .unwrap();

        let related = graph.related("thread-1", 2).unwrap();
        let ids: Vec<&str> = related.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&"entry-1"));
        assert!(ids.contains(&"mem-1"));

        // Re-ingesting the same thread does not duplicate edges.
        let edges_before = graph.edge_count();
        graph
            .ingest_thread(
                "thread-1",
                "Ship it",
                &[entry("entry-1", "Task created", &["mem-1"])],
            )
            .unwrap();
        assert_eq!(graph.edge_count(), edges_before);
    }

    #[test]
    fn persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        {
            let graph = KnowledgeGraph::new().with_persist_path(path.clone());
            graph.upsert_entity("a", "t", HashMap::new()).unwrap();
            graph.upsert_entity("b", "t", HashMap::new()).unwrap();
            graph.add_edge("a", "b", "L", HashMap::new()).unwrap();
        }
        let graph = KnowledgeGraph::new().with_persist_path(path);
        assert_eq!(graph.entity_count(), 2);
        assert_eq!(graph.related("a", 1).unwrap().len(), 2);
    }
}
