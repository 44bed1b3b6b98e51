use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use veska_core::error::{Result, VeskaError};
use veska_core::traits::Embedder;

use crate::embeddings::cosine_similarity;
use crate::item::{MemoryItem, MemoryKind};

/// Append-only, process-wide memory store.
///
/// Reads proceed concurrently; `add` takes the write lock. Vector search is
/// used when an embedder is configured and degrades to token containment
/// without error otherwise.
pub struct MemoryStore {
    items: RwLock<Vec<MemoryItem>>,
    embedder: Option<Arc<dyn Embedder>>,
    /// JSONL persistence root (one file per kind). `None` keeps everything
    /// in-memory.
    persist_dir: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            embedder: None,
            persist_dir: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_persist_dir(mut self, dir: PathBuf) -> Self {
        self.persist_dir = Some(dir);
        self
    }

    /// Append an item and return its id. Identical content always yields a
    /// new record.
    pub fn add(&self, item: MemoryItem) -> Result<String> {
        let id = item.id.clone();
        if let Some(ref dir) = self.persist_dir {
            if let Err(e) = append_jsonl(dir, &item) {
                warn!(error = %e, "memory persistence failed, keeping item in-memory only");
            }
        }
        let mut items = self
            .items
            .write()
            .map_err(|e| VeskaError::Internal(format!("memory lock poisoned: {}", e)))?;
        debug!(id = %id, kind = %item.kind, "memory item added");
        items.push(item);
        Ok(id)
    }

    /// Embed the item text first when an embedder is configured, then append.
    pub async fn add_embedded(&self, mut item: MemoryItem) -> Result<String> {
        if let Some(ref embedder) = self.embedder {
            match embedder.embed(&item.text).await {
                Ok(vector) => item.embedding = Some(vector),
                Err(e) => warn!(error = %e, "embedding failed, storing without vector"),
            }
        }
        self.add(item)
    }

    pub fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        let items = self.read()?;
        Ok(items.iter().find(|i| i.id == id).cloned())
    }

    pub fn len(&self) -> usize {
        self.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Search by text. Filters by kind and tags first, then ranks: cosine
    /// similarity against the query embedding when an embedder is available,
    /// token containment ordered by recency otherwise.
    pub async fn search(
        &self,
        query: &str,
        kind: Option<MemoryKind>,
        tags: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        let candidates: Vec<MemoryItem> = {
            let items = self.read()?;
            items
                .iter()
                .filter(|i| kind.map_or(true, |k| i.kind == k))
                .filter(|i| {
                    tags.map_or(true, |wanted| {
                        wanted.iter().any(|t| i.tags.contains(t))
                    })
                })
                .cloned()
                .collect()
        };

        if let Some(ref embedder) = self.embedder {
            match embedder.embed(query).await {
                Ok(query_vec) => return Ok(rank_by_similarity(candidates, &query_vec, query, limit)),
                Err(e) => {
                    warn!(error = %e, "query embedding failed, falling back to text search");
                }
            }
        }

        Ok(rank_by_containment(candidates, query, limit))
    }

    pub fn list_by_kind(&self, kind: MemoryKind, limit: usize) -> Result<Vec<MemoryItem>> {
        let items = self.read()?;
        let mut matched: Vec<MemoryItem> =
            items.iter().filter(|i| i.kind == kind).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit);
        Ok(matched)
    }

    pub fn list_by_tags(&self, tags: &[String]) -> Result<Vec<MemoryItem>> {
        let items = self.read()?;
        Ok(items
            .iter()
            .filter(|i| tags.iter().any(|t| i.tags.contains(t)))
            .cloned()
            .collect())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<MemoryItem>>> {
        self.items
            .read()
            .map_err(|e| VeskaError::Internal(format!("memory lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// All whitespace-separated query tokens must appear in the text,
/// case-insensitively.
fn contains_all_tokens(text: &str, query: &str) -> bool {
    let haystack = text.to_lowercase();
    query
        .split_whitespace()
        .all(|token| haystack.contains(&token.to_lowercase()))
}

fn rank_by_containment(candidates: Vec<MemoryItem>, query: &str, limit: usize) -> Vec<MemoryItem> {
    let mut matched: Vec<MemoryItem> = candidates
        .into_iter()
        .filter(|i| contains_all_tokens(&i.text, query))
        .collect();
    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matched.truncate(limit);
    matched
}

/// Embedded items sort by cosine similarity; items without vectors fall back
/// to containment ranking and append after them.
fn rank_by_similarity(
    candidates: Vec<MemoryItem>,
    query_vec: &[f32],
    query: &str,
    limit: usize,
) -> Vec<MemoryItem> {
    let (embedded, plain): (Vec<MemoryItem>, Vec<MemoryItem>) = candidates
        .into_iter()
        .partition(|i| i.embedding.is_some());

    let mut scored: Vec<(f32, MemoryItem)> = embedded
        .into_iter()
        .map(|item| {
            let score = item
                .embedding
                .as_deref()
                .map(|v| cosine_similarity(query_vec, v))
                .unwrap_or(0.0);
            (score, item)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut results: Vec<MemoryItem> = scored.into_iter().map(|(_, item)| item).collect();
    results.extend(rank_by_containment(plain, query, limit));
    results.truncate(limit);
    results
}

fn append_jsonl(dir: &PathBuf, item: &MemoryItem) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.jsonl", item.kind));
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(item)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
