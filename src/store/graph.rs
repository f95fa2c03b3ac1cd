use rusqlite::{params, Row};

use super::{Store, StoreError};
use crate::ids::NodeId;
use crate::memory::{Cluster, GraphEdge};

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<GraphEdge> {
    Ok(GraphEdge {
        from_node: NodeId::from(row.get::<_, String>(0)?),
        to_node: NodeId::from(row.get::<_, String>(1)?),
        strength: row.get::<_, f64>(2)? as f32,
        timestamp: row.get(3)?,
    })
}

fn cluster_from_row(row: &Row<'_>) -> rusqlite::Result<Cluster> {
    let node_ids: String = row.get(2)?;
    let node_ids: Vec<NodeId> = serde_json::from_str(&node_ids).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Cluster {
        id: row.get(0)?,
        label: row.get(1)?,
        node_ids,
        created_at: row.get(3)?,
    })
}

impl Store {
    /// Insert or replace the edge keyed by `(from_node, to_node)`.
    pub async fn upsert_edge(&self, edge: &GraphEdge) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT OR REPLACE INTO edges (from_node, to_node, strength, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                edge.from_node.as_str(),
                edge.to_node.as_str(),
                edge.strength as f64,
                edge.timestamp,
            ],
        )?;
        Ok(())
    }

    /// Outgoing edges, strongest first.
    pub async fn edges_from(&self, node_id: &NodeId) -> Result<Vec<GraphEdge>, StoreError> {
        let conn = self.conn().await?;
        let mut stmt = conn.prepare(
            "SELECT from_node, to_node, strength, timestamp FROM edges
             WHERE from_node = ?1 ORDER BY strength DESC, to_node ASC",
        )?;
        let edges = stmt
            .query_map(params![node_id.as_str()], edge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// Incoming edges, strongest first.
    pub async fn edges_to(&self, node_id: &NodeId) -> Result<Vec<GraphEdge>, StoreError> {
        let conn = self.conn().await?;
        let mut stmt = conn.prepare(
            "SELECT from_node, to_node, strength, timestamp FROM edges
             WHERE to_node = ?1 ORDER BY strength DESC, from_node ASC",
        )?;
        let edges = stmt
            .query_map(params![node_id.as_str()], edge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    pub async fn upsert_cluster(&self, cluster: &Cluster) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT OR REPLACE INTO clusters (id, label, node_ids, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                cluster.id,
                cluster.label,
                serde_json::to_string(&cluster.node_ids)?,
                cluster.created_at,
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub async fn list_clusters(&self) -> Result<Vec<Cluster>, StoreError> {
        let conn = self.conn().await?;
        let mut stmt = conn.prepare(
            "SELECT id, label, node_ids, created_at FROM clusters ORDER BY created_at DESC, id ASC",
        )?;
        let clusters = stmt
            .query_map([], cluster_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clusters)
    }

    pub async fn delete_cluster(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn().await?;
        let removed = conn.execute("DELETE FROM clusters WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}
