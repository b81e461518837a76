use crate::store::{DocumentPath, DocumentStore, Snapshot, StoreError, WriteBatch};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// In-process document store. Batches are applied under one lock, so they are atomic with
/// respect to every other caller.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, Snapshot>>,
    fail_commits: AtomicUsize,
    commits: AtomicU64,
    interleaved: Mutex<Vec<(DocumentPath, Value)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commits fail with [`StoreError::Unavailable`] without applying anything.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Lands `data` at `path` as another writer would, immediately before the next commit is
    /// checked. The commit then sees a version it did not read.
    pub async fn interleave_before_next_commit(&self, path: DocumentPath, data: Value) {
        self.interleaved.lock().await.push((path, data));
    }

    /// Number of batches that were applied.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Overwrites a document the way another writer would, bumping its version.
    pub async fn write_behind(&self, path: &DocumentPath, data: Value) {
        bump(&mut *self.docs.lock().await, path, data);
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.lock().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.docs.lock().await.get(&path.to_string()).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;
        for (path, data) in self.interleaved.lock().await.drain(..) {
            bump(&mut docs, &path, data);
        }
        let pending = self.fail_commits.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_commits.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        // Check every precondition before touching anything.
        let mut staged: HashMap<String, Snapshot> = HashMap::new();
        for write in batch.writes() {
            let key = write.path.to_string();
            let current = staged.get(&key).or_else(|| docs.get(&key)).map_or(0, |s| s.version);
            if current != write.expected_version {
                return Err(StoreError::Conflict { path: key });
            }
            staged.insert(key, Snapshot { data: write.data.clone(), version: current + 1 });
        }
        docs.extend(staged);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn bump(docs: &mut HashMap<String, Snapshot>, path: &DocumentPath, data: Value) {
    let version = docs.get(&path.to_string()).map_or(0, |s| s.version);
    docs.insert(path.to_string(), Snapshot { data, version: version + 1 });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{read_array, Collection};
    use serde_json::json;

    fn cart_path() -> DocumentPath {
        DocumentPath::new("a@b.c", Collection::Cart, "uid")
    }

    #[tokio::test]
    async fn missing_document_reads_as_empty_list() {
        let store = MemoryStore::new();
        let (items, version) = read_array::<Value>(&store, &cart_path()).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(version, 0);
    }

    #[tokio::test]
    async fn versions_advance_per_write() {
        let store = MemoryStore::new();
        store.commit(WriteBatch::new().put(cart_path(), json!({ "cart": [] }), 0)).await.unwrap();
        store.commit(WriteBatch::new().put(cart_path(), json!({ "cart": [1] }), 1)).await.unwrap();
        let (items, version) = read_array::<i64>(&store, &cart_path()).await.unwrap();
        assert_eq!(items, vec![1]);
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn stale_write_rejects_whole_batch() {
        let store = MemoryStore::new();
        let orders = DocumentPath::new("a@b.c", Collection::Orders, "uid");
        store.commit(WriteBatch::new().put(orders.clone(), json!({ "orders": [1] }), 0)).await.unwrap();

        let batch = WriteBatch::new()
            .put(cart_path(), json!({ "cart": [9] }), 0)
            .put(orders.clone(), json!({ "orders": [] }), 7);
        let err = store.commit(batch).await.unwrap_err();

        assert!(err.is_conflict());
        assert!(store.get(&cart_path()).await.unwrap().is_none());
        assert_eq!(store.get(&orders).await.unwrap().unwrap().data, json!({ "orders": [1] }));
    }

    #[tokio::test]
    async fn interleaved_write_beats_the_pending_commit() {
        let store = MemoryStore::new();
        store.interleave_before_next_commit(cart_path(), json!({ "cart": [1] })).await;
        let err = store.commit(WriteBatch::new().put(cart_path(), json!({ "cart": [2] }), 0)).await.unwrap_err();
        assert!(err.is_conflict());
        let (items, version) = read_array::<i64>(&store, &cart_path()).await.unwrap();
        assert_eq!((items, version), (vec![1], 1));
    }

    #[tokio::test]
    async fn injected_failures_apply_nothing() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        assert!(store.commit(WriteBatch::new().put(cart_path(), json!({}), 0)).await.is_err());
        assert!(store.is_empty().await);
        store.commit(WriteBatch::new().put(cart_path(), json!({}), 0)).await.unwrap();
        assert_eq!(store.commit_count(), 1);
    }
}
