use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use veska_core::error::{Result, VeskaError};

/// Append-only update inside a task thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadEntry {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    /// Ids of records this entry points at (memory items, repos, people).
    #[serde(default)]
    pub references: Vec<String>,
}

/// One long-running user project with its running history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskThread {
    pub thread_id: String,
    pub project: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<ThreadEntry>,
}

/// In-memory thread store with optional one-file-per-thread JSON persistence.
/// Writes are exclusive; reads clone snapshots.
pub struct ThreadStore {
    threads: RwLock<HashMap<String, TaskThread>>,
    persist_dir: Option<PathBuf>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            persist_dir: None,
        }
    }

    /// Enable persistence and load any threads already on disk.
    pub fn with_persist_dir(mut self, dir: PathBuf) -> Self {
        let mut loaded = HashMap::new();
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "json") {
                    match std::fs::read_to_string(&path)
                        .map_err(VeskaError::from)
                        .and_then(|s| Ok(serde_json::from_str::<TaskThread>(&s)?))
                    {
                        Ok(thread) => {
                            loaded.insert(thread.thread_id.clone(), thread);
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "skipping unreadable thread file");
                        }
                    }
                }
            }
        }
        self.threads = RwLock::new(loaded);
        self.persist_dir = Some(dir);
        self
    }

    pub fn create(&self, project: &str, title: &str) -> Result<TaskThread> {
        let now = Utc::now();
        let thread = TaskThread {
            thread_id: Uuid::new_v4().to_string(),
            project: project.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            entries: Vec::new(),
        };
        let mut threads = self.write()?;
        threads.insert(thread.thread_id.clone(), thread.clone());
        self.persist(&thread);
        Ok(thread)
    }

    pub fn get(&self, thread_id: &str) -> Result<Option<TaskThread>> {
        Ok(self.read()?.get(thread_id).cloned())
    }

    /// Append an entry; advances `updated_at`.
    pub fn add_entry(
        &self,
        thread_id: &str,
        text: &str,
        references: Vec<String>,
    ) -> Result<ThreadEntry> {
        let entry = ThreadEntry {
            entry_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            text: text.to_string(),
            references,
        };
        let mut threads = self.write()?;
        let thread = threads
            .get_mut(thread_id)
            .ok_or_else(|| VeskaError::NotFound(format!("thread {}", thread_id)))?;
        thread.entries.push(entry.clone());
        thread.updated_at = entry.timestamp;
        let snapshot = thread.clone();
        drop(threads);
        self.persist(&snapshot);
        Ok(entry)
    }

    /// Most recently updated thread for a project, if any.
    pub fn find_by_project(&self, project: &str) -> Result<Option<TaskThread>> {
        let threads = self.read()?;
        Ok(threads
            .values()
            .filter(|t| t.project == project)
            .max_by_key(|t| t.updated_at)
            .cloned())
    }

    pub fn list(&self, limit: usize) -> Result<Vec<TaskThread>> {
        let threads = self.read()?;
        let mut all: Vec<TaskThread> = threads.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all.truncate(limit);
        Ok(all)
    }

    fn persist(&self, thread: &TaskThread) {
        let Some(ref dir) = self.persist_dir else {
            return;
        };
        let result = std::fs::create_dir_all(dir)
            .map_err(VeskaError::from)
            .and_then(|_| Ok(serde_json::to_string_pretty(thread)?))
            .and_then(|json| {
                std::fs::write(dir.join(format!("{}.json", thread.thread_id)), json)
                    .map_err(VeskaError::from)
            });
        if let Err(e) = result {
            warn!(thread = %thread.thread_id, error = %e, "thread persistence failed");
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, TaskThread>>> {
        self.threads
            .read()
            .map_err(|e| VeskaError::Internal(format!("thread lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, TaskThread>>> {
        self.threads
            .write()
            .map_err(|e| VeskaError::Internal(format!("thread lock poisoned: {}", e)))
    }
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_append() {
        let store = ThreadStore::new();
        let thread = store.create("veska-site", "Ship the landing page").unwrap();
        assert!(thread.entries.is_empty());

        let entry = store
            .add_entry(&thread.thread_id, "Task created", vec!["mem-1".into()])
            .unwrap();
        assert_eq!(entry.references, vec!["mem-1"]);

        let reloaded = store.get(&thread.thread_id).unwrap().unwrap();
        assert_eq!(reloaded.entries.len(), 1);
        assert!(reloaded.updated_at >= reloaded.created_at);
    }

    #[test]
    fn missing_thread_is_not_found() {
        let store = ThreadStore::new();
        let err = store.add_entry("nope", "text", vec![]).unwrap_err();
        assert!(matches!(err, VeskaError::NotFound(_)));
    }

    #[test]
    fn find_by_project_prefers_most_recent() {
        let store = ThreadStore::new();
        let old = store.create("ops", "old thread").unwrap();
        let new = store.create("ops", "new thread").unwrap();
        store.add_entry(&new.thread_id, "update", vec![]).unwrap();

        let found = store.find_by_project("ops").unwrap().unwrap();
        assert_eq!(found.thread_id, new.thread_id);
        assert_ne!(found.thread_id, old.thread_id);
        assert!(store.find_by_project("other").unwrap().is_none());
    }

    #[test]
    fn persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new().with_persist_dir(dir.path().to_path_buf());
        let thread = store.create("ops", "persisted").unwrap();
        store.add_entry(&thread.thread_id, "entry one", vec![]).unwrap();

        let store2 = ThreadStore::new().with_persist_dir(dir.path().to_path_buf());
        let reloaded = store2.get(&thread.thread_id).unwrap().unwrap();
        assert_eq!(reloaded.title, "persisted");
        assert_eq!(reloaded.entries.len(), 1);
    }
}
