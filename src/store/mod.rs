//! Durable page memory backed by SQLite, plus the in-memory vector index
//! derived from it.
//!
//! Lifecycle: [`Store::open`] returns immediately and opens the database in
//! the background. Every operation waits for the open to finish and fails
//! with [`StoreError::Unavailable`] if it did not succeed. Once open, stored
//! embeddings are loaded into the index in batches without blocking callers.
//!
//! Lock order is connection first, then index. Index mutations happen while
//! the connection lock is held so the index always reflects the last
//! committed write for a node.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::IndexConfig;
use crate::ids::NodeId;
use crate::index::{build_index, AnnIndex, IndexError, SearchResult};

mod embeddings;
mod errors;
mod graph;
mod nodes;
mod schema;
mod settings;

pub use embeddings::{bytes_to_f32_vec, f32_vec_to_bytes};
pub use errors::StoreError;

/// Embeddings loaded into the index per connection lock.
const HYDRATE_BATCH: usize = 500;

#[derive(Clone, Debug)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

#[derive(Clone, Debug)]
enum OpenState {
    Opening,
    Ready,
    Failed(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub page_count: u64,
    pub cluster_count: u64,
    pub edge_count: u64,
    /// Best-effort database size in bytes, 0 when unknown
    pub storage_size: u64,
}

#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

struct Shared {
    conn: OnceLock<Mutex<Connection>>,
    index: RwLock<Box<dyn AnnIndex>>,
    state: watch::Sender<OpenState>,
    hydrated: watch::Sender<bool>,
}

impl Store {
    /// Start opening the store. Must be called inside a tokio runtime.
    pub fn open(location: StoreLocation, index_config: &IndexConfig) -> Store {
        let (state, _) = watch::channel(OpenState::Opening);
        let (hydrated, _) = watch::channel(false);

        let store = Store {
            shared: Arc::new(Shared {
                conn: OnceLock::new(),
                index: RwLock::new(build_index(index_config)),
                state,
                hydrated,
            }),
        };

        let background = store.clone();
        tokio::spawn(async move { background.initialize(location).await });

        store
    }

    /// Open and wait until the database is usable.
    pub async fn open_ready(
        location: StoreLocation,
        index_config: &IndexConfig,
    ) -> Result<Store, StoreError> {
        let store = Store::open(location, index_config);
        store.ready().await?;
        Ok(store)
    }

    async fn initialize(&self, location: StoreLocation) {
        let opened = tokio::task::spawn_blocking(move || open_connection(&location)).await;

        let conn = match opened {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return self.fail(e.to_string()),
            Err(e) => return self.fail(format!("open task failed: {e}")),
        };

        if self.shared.conn.set(Mutex::new(conn)).is_err() {
            return self.fail("store opened twice".to_string());
        }
        self.shared.state.send_replace(OpenState::Ready);
        log::info!("store ready");

        let hydrating = self.clone();
        match tokio::task::spawn_blocking(move || hydrating.hydrate()).await {
            Ok(Ok(count)) => log::info!("vector index hydrated with {count} embeddings"),
            Ok(Err(e)) => log::error!("vector index hydration failed: {e}"),
            Err(e) => log::error!("vector index hydration task failed: {e}"),
        }
        self.shared.hydrated.send_replace(true);
    }

    fn fail(&self, reason: String) {
        log::error!("failed to open store: {reason}");
        self.shared.state.send_replace(OpenState::Failed(reason));
        self.shared.hydrated.send_replace(true);
    }

    async fn ready(&self) -> Result<&Mutex<Connection>, StoreError> {
        let mut rx = self.shared.state.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, OpenState::Opening))
            .await
            .map_err(|_| StoreError::Unavailable("store closed".to_string()))?
            .clone();

        match state {
            OpenState::Failed(reason) => Err(StoreError::Unavailable(reason)),
            _ => self
                .shared
                .conn
                .get()
                .ok_or_else(|| StoreError::Unavailable("connection missing".to_string())),
        }
    }

    /// Wait for readiness and take the connection lock.
    ///
    /// Callers must not await while holding the guard.
    async fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        let conn = self.ready().await?;
        conn.lock()
            .map_err(|e| StoreError::Internal(format!("connection lock poisoned: {e}")))
    }

    fn conn_now(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.shared
            .conn
            .get()
            .ok_or_else(|| StoreError::Unavailable("store is not open".to_string()))?
            .lock()
            .map_err(|e| StoreError::Internal(format!("connection lock poisoned: {e}")))
    }

    fn index_read(&self) -> Result<RwLockReadGuard<'_, Box<dyn AnnIndex>>, StoreError> {
        self.shared
            .index
            .read()
            .map_err(|e| StoreError::Internal(format!("index lock poisoned: {e}")))
    }

    fn index_write(&self) -> Result<RwLockWriteGuard<'_, Box<dyn AnnIndex>>, StoreError> {
        self.shared
            .index
            .write()
            .map_err(|e| StoreError::Internal(format!("index lock poisoned: {e}")))
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), StoreError> {
        let expected = self.index_read()?.dimensions();
        if vector.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                got: vector.len(),
            }
            .into());
        }
        Ok(())
    }

    fn evict(&self, ids: &[NodeId]) -> Result<(), StoreError> {
        let mut index = self.index_write()?;
        for id in ids {
            index.remove(id);
        }
        Ok(())
    }

    fn hydrate(&self) -> Result<usize, StoreError> {
        let mut after = String::new();
        let mut total = 0;

        loop {
            let conn = self.conn_now()?;
            let batch = embeddings::embedding_batch(&conn, &after, HYDRATE_BATCH)?;
            let batch_len = batch.len();

            let mut index = self.index_write()?;
            for (id, vector) in batch {
                after = id.to_string();
                match index.add(id, vector) {
                    Ok(()) => total += 1,
                    Err(e) => log::warn!("skipping stored embedding for {after}: {e}"),
                }
            }

            if batch_len < HYDRATE_BATCH {
                break;
            }
        }

        Ok(total)
    }

    /// Resolves once the background index load has finished (or the open failed).
    pub async fn wait_hydrated(&self) {
        let mut rx = self.shared.hydrated.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub async fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>, StoreError> {
        self.ready().await?;
        Ok(self.index_read()?.search(query, k, threshold))
    }

    pub async fn index_len(&self) -> Result<usize, StoreError> {
        self.ready().await?;
        Ok(self.index_read()?.len())
    }

    pub async fn index_contains(&self, id: &NodeId) -> Result<bool, StoreError> {
        self.ready().await?;
        Ok(self.index_read()?.contains(id))
    }

    pub async fn get_stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn().await?;

        let count = |table: &str| -> Result<u64, StoreError> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
            Ok(n.max(0) as u64)
        };

        Ok(StoreStats {
            page_count: count("nodes")?,
            cluster_count: count("clusters")?,
            edge_count: count("edges")?,
            storage_size: storage_size(&conn),
        })
    }

    /// Empty every collection and reset the index.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        let tx = conn.transaction()?;
        for table in schema::ALL_TABLES {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        tx.commit()?;

        self.index_write()?.clear();
        log::info!("cleared all stored data");

        Ok(())
    }
}

fn open_connection(location: &StoreLocation) -> Result<Connection, StoreError> {
    let conn = match location {
        StoreLocation::Memory => Connection::open_in_memory()?,
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let conn = Connection::open(path)?;
            if let Err(e) = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            }) {
                log::warn!("could not enable WAL journal: {e}");
            }
            conn
        }
    };

    schema::migrate(&conn)?;
    Ok(conn)
}

fn storage_size(conn: &Connection) -> u64 {
    let pages = conn.query_row("PRAGMA page_count", [], |r| r.get::<_, i64>(0));
    let size = conn.query_row("PRAGMA page_size", [], |r| r.get::<_, i64>(0));

    match (pages, size) {
        (Ok(pages), Ok(size)) => (pages * size).max(0) as u64,
        _ => 0,
    }
}


#[cfg(test)]
mod tests {
    use super::test_store::*;
    use super::*;
    use crate::memory::{Embedding, MemoryNode};

    fn node_with_vector(url: &str, vector: Vec<f32>) -> MemoryNode {
        let mut node = MemoryNode::new(url, "title", "text", 1, "a.com");
        node.embedding = Some(Embedding {
            vector,
            model: "fallback".to_string(),
            timestamp: 1,
        });
        node
    }

    #[tokio::test]
    async fn test_open_failure_makes_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened as a database file
        let store = Store::open(StoreLocation::File(dir.path().to_path_buf()), &index_config(3));

        let result = store.get_stats().await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.list_nodes(None).await,
            Err(StoreError::Unavailable(_))
        ));
        store.wait_hydrated().await;
    }

    #[tokio::test]
    async fn test_stats_on_empty_store() {
        let store = memory_store(3).await;
        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.page_count, 0);
        assert_eq!(stats.cluster_count, 0);
        assert_eq!(stats.edge_count, 0);
    }

    #[tokio::test]
    async fn test_hydrates_index_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("cortex.db");

        {
            let store = Store::open_ready(StoreLocation::File(path.clone()), &index_config(3))
                .await
                .unwrap();
            store
                .upsert_node(&node_with_vector("https://a.com/1", vec![1.0, 0.0, 0.0]))
                .await
                .unwrap();
            store
                .upsert_node(&node_with_vector("https://a.com/2", vec![0.0, 1.0, 0.0]))
                .await
                .unwrap();
        }

        let reopened = Store::open(StoreLocation::File(path), &index_config(3));
        reopened.wait_hydrated().await;

        assert_eq!(reopened.index_len().await.unwrap(), 2);
        let results = reopened
            .vector_search(&[1.0, 0.0, 0.0], 1, 0.5)
            .await
            .unwrap();
        assert_eq!(results[0].id, NodeId::from_url("https://a.com/1"));
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected_before_write() {
        let store = memory_store(3).await;
        let node = node_with_vector("https://a.com/1", vec![1.0, 0.0]);

        let result = store.upsert_node(&node).await;
        assert!(matches!(result, Err(StoreError::Index(_))));
        assert!(store.get_node(&node.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_all_resets_everything() {
        let store = memory_store(3).await;
        store
            .upsert_node(&node_with_vector("https://a.com/1", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();

        store.clear_all().await.unwrap();

        assert_eq!(store.get_stats().await.unwrap().page_count, 0);
        assert_eq!(store.index_len().await.unwrap(), 0);
    }
}
