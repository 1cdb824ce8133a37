//! In-memory [`Store`] for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CacheEntry, Chunk, Document, DocumentStatus, EmbeddedChunk};

use super::Store;

#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, Document>>,
    chunks: RwLock<HashMap<String, Vec<Chunk>>>,
    embeddings: RwLock<HashMap<i64, Vec<f32>>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    next_chunk_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_chunk_id: AtomicI64::new(1),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_document(&self, doc: &Document) -> Result<()> {
        self.documents
            .write()
            .unwrap()
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        text_length: Option<i64>,
        token_count: Option<i64>,
    ) -> Result<()> {
        if let Some(doc) = self.documents.write().unwrap().get_mut(id) {
            doc.status = status;
            if let Some(len) = text_length {
                doc.text_length = len;
            }
            if let Some(tokens) = token_count {
                doc.token_count = tokens;
            }
        }
        Ok(())
    }

    async fn save_chunks(
        &self,
        document_id: &str,
        texts: &[String],
        token_counts: &[i64],
    ) -> Result<Vec<i64>> {
        let mut all = self.chunks.write().unwrap();
        let entry = all.entry(document_id.to_string()).or_default();
        let mut ids = Vec::with_capacity(texts.len());
        for (text, tokens) in texts.iter().zip(token_counts.iter()) {
            let id = self.next_chunk_id.fetch_add(1, Ordering::SeqCst);
            entry.push(Chunk {
                id,
                document_id: document_id.to_string(),
                index: entry.len() as i64,
                content: text.clone(),
                token_count: *tokens,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .chunks
            .read()
            .unwrap()
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_embeddings(&self, chunk_ids: &[i64], vectors: &[Vec<f32>]) -> Result<()> {
        let mut all = self.embeddings.write().unwrap();
        for (id, vector) in chunk_ids.iter().zip(vectors.iter()) {
            all.insert(*id, vector.clone());
        }
        Ok(())
    }

    async fn embeddings_for_document(&self, document_id: &str) -> Result<Vec<EmbeddedChunk>> {
        let chunks = self.document_chunks(document_id).await?;
        let vectors = self.embeddings.read().unwrap();
        Ok(chunks
            .into_iter()
            .filter_map(|chunk| {
                vectors.get(&chunk.id).map(|vector| EmbeddedChunk {
                    chunk_id: chunk.id,
                    index: chunk.index,
                    content: chunk.content,
                    vector: vector.clone(),
                })
            })
            .collect())
    }

    async fn cached_result(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .cache
            .read()
            .unwrap()
            .get(key)
            .map(|entry| entry.result.clone()))
    }

    async fn save_cached_result(&self, entry: &CacheEntry) -> Result<()> {
        self.cache
            .write()
            .unwrap()
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let existed = self.documents.write().unwrap().remove(id).is_some();
        if let Some(chunks) = self.chunks.write().unwrap().remove(id) {
            let mut vectors = self.embeddings.write().unwrap();
            for chunk in chunks {
                vectors.remove(&chunk.id);
            }
        }
        self.cache
            .write()
            .unwrap()
            .retain(|_, entry| entry.document_id != id);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunk_ids_are_unique_across_documents() {
        let store = InMemoryStore::new();
        let a = Document::new("a");
        let b = Document::new("b");
        store.save_document(&a).await.unwrap();
        store.save_document(&b).await.unwrap();

        let ids_a = store
            .save_chunks(&a.id, &["x".to_string()], &[1])
            .await
            .unwrap();
        let ids_b = store
            .save_chunks(&b.id, &["y".to_string()], &[1])
            .await
            .unwrap();
        assert_ne!(ids_a[0], ids_b[0]);
    }

    #[tokio::test]
    async fn test_delete_removes_cache_entries() {
        let store = InMemoryStore::new();
        let doc = Document::new("doc");
        store.save_document(&doc).await.unwrap();
        store
            .save_cached_result(&CacheEntry {
                key: "k".to_string(),
                document_id: doc.id.clone(),
                task: crate::models::TaskKind::Ask,
                result: serde_json::json!({"answer": "hi"}),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        store.delete_document(&doc.id).await.unwrap();
        assert!(store.cached_result("k").await.unwrap().is_none());
    }
}
