use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::dedup::SessionDedup;
use super::CaptureError;
use crate::config::CaptureConfig;
use crate::features::FeatureExtractor;
use crate::ids::NodeId;
use crate::memory::{now_millis, Embedding, GraphEdge, MemoryNode};
use crate::store::Store;

#[derive(Debug)]
pub enum Task {
    /// Extract features for an accepted capture and persist it
    Ingest(MemoryNode),
    /// Acknowledged once every earlier task has finished
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

pub struct Worker {
    pub store: Store,
    pub extractor: Arc<dyn FeatureExtractor>,
    pub config: CaptureConfig,
    pub dedup: Arc<SessionDedup>,
}

/// Run tasks one at a time until shutdown or until every sender is gone.
pub async fn start_queue(mut task_rx: mpsc::Receiver<Task>, worker: Worker) {
    log::debug!("capture queue started");

    while let Some(task) = task_rx.recv().await {
        match task {
            Task::Ingest(node) => {
                let url = node.url.clone();
                let id = node.id.clone();
                if let Err(err) = worker.ingest(node).await {
                    log::error!("failed to store capture of {url}: {err}");
                    // nothing was stored, so a retry must not count as a duplicate
                    worker.dedup.forget(&id);
                }
            }
            Task::Flush(done) => {
                let _ = done.send(());
            }
            Task::Shutdown(done) => {
                log::info!("capture queue stopped");
                let _ = done.send(());
                return;
            }
        }
    }

    log::debug!("capture queue closed");
}

impl Worker {
    pub async fn ingest(&self, mut node: MemoryNode) -> Result<(), CaptureError> {
        let features = self.extractor.extract(&node.title, &node.readable_text)?;
        node.keywords = features.keywords;
        node.embedding = Some(Embedding {
            vector: features.embedding.clone(),
            model: self.extractor.model_tag().to_string(),
            timestamp: now_millis(),
        });

        self.store.upsert_node(&node).await?;
        // neighbours still loading from disk would be missed for good
        self.store.wait_hydrated().await;
        let linked = self.link_similar(&node.id, &features.embedding).await?;

        log::info!(
            "stored {} ({} keywords, {linked} links)",
            node.url,
            node.keywords.len()
        );
        Ok(())
    }

    /// Connect a node to its most similar neighbours in both directions.
    async fn link_similar(&self, id: &NodeId, vector: &[f32]) -> Result<usize, CaptureError> {
        if self.config.related_edges == 0 {
            return Ok(0);
        }

        let hits = self
            .store
            .vector_search(vector, self.config.related_edges + 1, self.config.edge_threshold)
            .await?;

        let timestamp = now_millis();
        let mut linked = 0;
        for hit in hits
            .into_iter()
            .filter(|hit| &hit.id != id)
            .take(self.config.related_edges)
        {
            let directions = [(id.clone(), hit.id.clone()), (hit.id.clone(), id.clone())];
            for (from_node, to_node) in directions {
                self.store
                    .upsert_edge(&GraphEdge {
                        from_node,
                        to_node,
                        strength: hit.score,
                        timestamp,
                    })
                    .await?;
            }
            linked += 1;
        }

        Ok(linked)
    }
}
