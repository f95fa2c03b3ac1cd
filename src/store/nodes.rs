use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{embeddings, Store, StoreError};
use crate::ids::NodeId;
use crate::memory::{MemoryNode, NodeMetadata};

const NODE_COLUMNS: &str = "id, url, title, readable_text, timestamp, keywords, domain, favicon";

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryNode> {
    let keywords: String = row.get(5)?;
    let keywords: Vec<String> = serde_json::from_str(&keywords).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(MemoryNode {
        id: NodeId::from(row.get::<_, String>(0)?),
        url: row.get(1)?,
        title: row.get(2)?,
        readable_text: row.get(3)?,
        timestamp: row.get(4)?,
        keywords,
        metadata: NodeMetadata {
            domain: row.get(6)?,
            favicon: row.get(7)?,
        },
        embedding: None,
    })
}

fn ids_where<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<NodeId>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .map(|id| id.map(NodeId::from))
        .collect();
    ids
}

/// Delete nodes with their embeddings and edges. Returns the number of node
/// rows removed.
fn delete_ids(conn: &Connection, ids: &[NodeId]) -> rusqlite::Result<usize> {
    let mut removed = 0;
    for id in ids {
        conn.execute("DELETE FROM embeddings WHERE node_id = ?1", params![id.as_str()])?;
        conn.execute(
            "DELETE FROM edges WHERE from_node = ?1 OR to_node = ?1",
            params![id.as_str()],
        )?;
        removed += conn.execute("DELETE FROM nodes WHERE id = ?1", params![id.as_str()])?;
    }
    Ok(removed)
}

impl Store {
    /// Insert or overwrite a node. A carried embedding is written in the same
    /// transaction and indexed.
    pub async fn upsert_node(&self, node: &MemoryNode) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        if let Some(embedding) = &node.embedding {
            self.check_dimensions(&embedding.vector)?;
        }

        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO nodes ({NODE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                node.id.as_str(),
                node.url,
                node.title,
                node.readable_text,
                node.timestamp,
                serde_json::to_string(&node.keywords)?,
                node.metadata.domain,
                node.metadata.favicon,
            ],
        )?;
        if let Some(embedding) = &node.embedding {
            // links computed from the previous embedding no longer hold
            tx.execute(
                "DELETE FROM edges WHERE from_node = ?1 OR to_node = ?1",
                params![node.id.as_str()],
            )?;
            embeddings::write_embedding(&tx, &node.id, embedding)?;
        }
        tx.commit()?;

        if let Some(embedding) = &node.embedding {
            self.index_write()?
                .add(node.id.clone(), embedding.vector.clone())?;
        }

        Ok(())
    }

    pub async fn get_node(&self, id: &NodeId) -> Result<Option<MemoryNode>, StoreError> {
        let conn = self.conn().await?;
        let node = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![id.as_str()],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    /// Fetch several nodes, preserving the order of `ids` and skipping
    /// missing ones.
    pub async fn get_nodes(&self, ids: &[NodeId]) -> Result<Vec<MemoryNode>, StoreError> {
        let conn = self.conn().await?;
        let mut stmt = conn.prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"))?;

        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = stmt
                .query_row(params![id.as_str()], node_from_row)
                .optional()?
            {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Most recent capture of `url`.
    pub async fn find_by_url(&self, url: &str) -> Result<Option<MemoryNode>, StoreError> {
        let conn = self.conn().await?;
        let node = conn
            .query_row(
                &format!(
                    "SELECT {NODE_COLUMNS} FROM nodes WHERE url = ?1
                     ORDER BY timestamp DESC LIMIT 1"
                ),
                params![url],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    /// Newest first. `None` returns every node.
    pub async fn list_nodes(&self, limit: Option<usize>) -> Result<Vec<MemoryNode>, StoreError> {
        let conn = self.conn().await?;
        // sqlite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes ORDER BY timestamp DESC, id ASC LIMIT ?1"
        ))?;
        let nodes = stmt
            .query_map(params![limit], node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// Remove a node with its embedding and edges. Returns whether it existed.
    pub async fn delete_node(&self, id: &NodeId) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;

        let tx = conn.transaction()?;
        let removed = delete_ids(&tx, std::slice::from_ref(id))?;
        tx.commit()?;

        self.evict(std::slice::from_ref(id))?;
        Ok(removed > 0)
    }

    /// Domains are stored lowercased, so `domain` matches case-insensitively.
    pub async fn delete_by_domain(&self, domain: &str) -> Result<usize, StoreError> {
        let domain = domain.trim().to_lowercase();
        let mut conn = self.conn().await?;

        let tx = conn.transaction()?;
        let ids = ids_where(&tx, "SELECT id FROM nodes WHERE domain = ?1", params![domain])?;
        let removed = delete_ids(&tx, &ids)?;
        tx.commit()?;

        self.evict(&ids)?;
        log::info!("deleted {removed} pages from domain {domain}");
        Ok(removed)
    }

    /// Both bounds inclusive, epoch milliseconds.
    pub async fn delete_by_date_range(&self, start: i64, end: i64) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;

        let tx = conn.transaction()?;
        let ids = ids_where(
            &tx,
            "SELECT id FROM nodes WHERE timestamp >= ?1 AND timestamp <= ?2",
            params![start, end],
        )?;
        let removed = delete_ids(&tx, &ids)?;
        tx.commit()?;

        self.evict(&ids)?;
        log::info!("deleted {removed} pages captured between {start} and {end}");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::ids::NodeId;
    use crate::memory::{Embedding, GraphEdge, MemoryNode};
    use crate::store::test_store::memory_store;

    fn node(url: &str, domain: &str, timestamp: i64) -> MemoryNode {
        let mut node = MemoryNode::new(url, "Some title", "Some text", timestamp, domain);
        node.keywords = vec!["alpha".to_string(), "beta".to_string()];
        node
    }

    fn with_embedding(mut node: MemoryNode, vector: Vec<f32>) -> MemoryNode {
        node.embedding = Some(Embedding {
            vector,
            model: "fallback".to_string(),
            timestamp: node.timestamp,
        });
        node
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = memory_store(3).await;
        let mut n = node("https://a.com/x", "a.com", 10);
        n.metadata.favicon = Some("https://a.com/favicon.ico".to_string());
        store.upsert_node(&n).await.unwrap();

        let got = store.get_node(&n.id).await.unwrap().unwrap();
        assert_eq!(got, n);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = memory_store(3).await;
        assert!(store
            .get_node(&NodeId::from("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_id() {
        let store = memory_store(3).await;
        let first = node("https://a.com/x", "a.com", 10);
        let mut second = first.clone();
        second.title = "Updated".to_string();
        second.timestamp = 20;

        store.upsert_node(&first).await.unwrap();
        store.upsert_node(&second).await.unwrap();

        let all = store.list_nodes(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Updated");
    }

    #[tokio::test]
    async fn test_list_nodes_newest_first_with_limit() {
        let store = memory_store(3).await;
        for (i, ts) in [5, 30, 10, 20].iter().enumerate() {
            store
                .upsert_node(&node(&format!("https://a.com/{i}"), "a.com", *ts))
                .await
                .unwrap();
        }

        let all = store.list_nodes(None).await.unwrap();
        let timestamps: Vec<i64> = all.iter().map(|n| n.timestamp).collect();
        assert_eq!(timestamps, vec![30, 20, 10, 5]);

        let two = store.list_nodes(Some(2)).await.unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].timestamp, 30);
    }

    #[tokio::test]
    async fn test_delete_node_removes_embedding_edges_and_index_entry() {
        let store = memory_store(3).await;
        let a = with_embedding(node("https://a.com/1", "a.com", 1), vec![1.0, 0.0, 0.0]);
        let b = with_embedding(node("https://a.com/2", "a.com", 2), vec![0.0, 1.0, 0.0]);
        store.upsert_node(&a).await.unwrap();
        store.upsert_node(&b).await.unwrap();
        store
            .upsert_edge(&GraphEdge {
                from_node: b.id.clone(),
                to_node: a.id.clone(),
                strength: 0.7,
                timestamp: 3,
            })
            .await
            .unwrap();

        assert!(store.delete_node(&a.id).await.unwrap());

        assert!(store.get_node(&a.id).await.unwrap().is_none());
        assert!(store.get_embedding(&a.id).await.unwrap().is_none());
        assert!(!store.index_contains(&a.id).await.unwrap());
        assert!(store.edges_from(&b.id).await.unwrap().is_empty());
        assert!(store.index_contains(&b.id).await.unwrap());

        assert!(!store.delete_node(&a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_date_range_inclusive() {
        let store = memory_store(3).await;
        for ts in [100, 200, 300, 400] {
            store
                .upsert_node(&node(&format!("https://a.com/{ts}"), "a.com", ts))
                .await
                .unwrap();
        }

        let removed = store.delete_by_date_range(200, 300).await.unwrap();
        assert_eq!(removed, 2);

        let left: Vec<i64> = store
            .list_nodes(None)
            .await
            .unwrap()
            .iter()
            .map(|n| n.timestamp)
            .collect();
        assert_eq!(left, vec![400, 100]);
    }

    #[tokio::test]
    async fn test_find_by_url_and_get_nodes() {
        let store = memory_store(3).await;
        let a = node("https://a.com/1", "a.com", 1);
        let b = node("https://b.com/1", "b.com", 2);
        store.upsert_node(&a).await.unwrap();
        store.upsert_node(&b).await.unwrap();

        let found = store.find_by_url("https://b.com/1").await.unwrap().unwrap();
        assert_eq!(found.id, b.id);
        assert!(store.find_by_url("https://c.com").await.unwrap().is_none());

        let nodes = store
            .get_nodes(&[b.id.clone(), NodeId::from("missing"), a.id.clone()])
            .await
            .unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, b.id);
        assert_eq!(nodes[1].id, a.id);
    }

    #[tokio::test]
    async fn test_delete_by_domain_ignores_case() {
        let store = memory_store(3).await;
        for (url, domain, ts) in [
            ("https://example.com/a", "example.com", 1),
            ("https://example.com/b", "example.com", 2),
            ("https://other.com/c", "other.com", 3),
        ] {
            store.upsert_node(&node(url, domain, ts)).await.unwrap();
        }

        let removed = store.delete_by_domain(" Example.COM ").await.unwrap();
        assert_eq!(removed, 2);

        let left = store.list_nodes(None).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].domain(), "other.com");
    }

    #[tokio::test]
    async fn test_new_embedding_drops_old_edges() {
        let store = memory_store(3).await;
        let a = with_embedding(node("https://a.com/1", "a.com", 1), vec![1.0, 0.0, 0.0]);
        let b = with_embedding(node("https://a.com/2", "a.com", 2), vec![0.9, 0.1, 0.0]);
        store.upsert_node(&a).await.unwrap();
        store.upsert_node(&b).await.unwrap();
        for (from_node, to_node) in [(a.id.clone(), b.id.clone()), (b.id.clone(), a.id.clone())] {
            store
                .upsert_edge(&GraphEdge {
                    from_node,
                    to_node,
                    strength: 0.9,
                    timestamp: 3,
                })
                .await
                .unwrap();
        }

        // same node without an embedding keeps its links
        let unchanged = node("https://a.com/1", "a.com", 4);
        store.upsert_node(&unchanged).await.unwrap();
        assert_eq!(store.edges_from(&a.id).await.unwrap().len(), 1);

        let changed = with_embedding(node("https://a.com/1", "a.com", 5), vec![0.0, 0.0, 1.0]);
        store.upsert_node(&changed).await.unwrap();

        assert!(store.edges_from(&a.id).await.unwrap().is_empty());
        assert!(store.edges_from(&b.id).await.unwrap().is_empty());
        assert_eq!(store.get_stats().await.unwrap().edge_count, 0);
    }
}
