use rusqlite::{params, Connection, OptionalExtension};

use super::{Store, StoreError};
use crate::ids::NodeId;
use crate::memory::Embedding;

/// Decode a little-endian f32 BLOB.
pub fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Encode a vector as a little-endian f32 BLOB.
pub fn f32_vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(node_id: &str, bytes: &[u8]) -> Vec<f32> {
    if bytes.len() % 4 != 0 {
        log::warn!(
            "embedding blob for {node_id} has {} bytes, trailing bytes ignored",
            bytes.len()
        );
    }
    bytes_to_f32_vec(bytes)
}

pub(super) fn write_embedding(
    conn: &Connection,
    node_id: &NodeId,
    embedding: &Embedding,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO embeddings (node_id, vector, model, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            node_id.as_str(),
            f32_vec_to_bytes(&embedding.vector),
            embedding.model,
            embedding.timestamp,
        ],
    )
}

/// Up to `limit` stored vectors with node ids greater than `after`.
pub(super) fn embedding_batch(
    conn: &Connection,
    after: &str,
    limit: usize,
) -> rusqlite::Result<Vec<(NodeId, Vec<f32>)>> {
    let mut stmt = conn.prepare(
        "SELECT node_id, vector FROM embeddings WHERE node_id > ?1 ORDER BY node_id LIMIT ?2",
    )?;
    let batch = stmt
        .query_map(params![after, limit as i64], |row| {
            let id: String = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            let vector = decode_vector(&id, &bytes);
            Ok((NodeId::from(id), vector))
        })?
        .collect();
    batch
}

impl Store {
    /// Insert or replace the embedding for a node and index it.
    pub async fn store_embedding(
        &self,
        node_id: &NodeId,
        embedding: &Embedding,
    ) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        self.check_dimensions(&embedding.vector)?;

        write_embedding(&conn, node_id, embedding)?;
        self.index_write()?
            .add(node_id.clone(), embedding.vector.clone())?;

        Ok(())
    }

    pub async fn get_embedding(&self, node_id: &NodeId) -> Result<Option<Embedding>, StoreError> {
        let conn = self.conn().await?;
        let embedding = conn
            .query_row(
                "SELECT vector, model, timestamp FROM embeddings WHERE node_id = ?1",
                params![node_id.as_str()],
                |row| {
                    let bytes: Vec<u8> = row.get(0)?;
                    Ok(Embedding {
                        vector: decode_vector(node_id.as_str(), &bytes),
                        model: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(embedding)
    }
}
