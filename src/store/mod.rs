//! Storage abstraction for docsage.
//!
//! The [`Store`] trait is the narrow interface the RAG core needs from
//! persistence: document lookup, chunk and embedding get/set keyed by
//! document or chunk id, and the task-result cache. The core never
//! manages schema or document lifecycle beyond what these operations
//! express.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CacheEntry, Chunk, Document, DocumentStatus, EmbeddedChunk};

/// Abstract storage backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace a document row.
    async fn save_document(&self, doc: &Document) -> Result<()>;

    /// Fetch a document by id; `None` when absent.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Update a document's lifecycle status, optionally recording the
    /// extracted text size.
    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        text_length: Option<i64>,
        token_count: Option<i64>,
    ) -> Result<()>;

    /// Append chunks for a document in order; returns their ids.
    async fn save_chunks(
        &self,
        document_id: &str,
        texts: &[String],
        token_counts: &[i64],
    ) -> Result<Vec<i64>>;

    /// All chunks for a document, ordered by index ascending.
    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Store one embedding vector per chunk id.
    async fn save_embeddings(&self, chunk_ids: &[i64], vectors: &[Vec<f32>]) -> Result<()>;

    /// All (chunk, vector) pairs for a document, ordered by chunk index.
    async fn embeddings_for_document(&self, document_id: &str) -> Result<Vec<EmbeddedChunk>>;

    /// Fetch a cached task result by key.
    async fn cached_result(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Write a task result; a later write with the same key wins.
    async fn save_cached_result(&self, entry: &CacheEntry) -> Result<()>;

    /// Delete a document and everything hanging off it. Returns whether
    /// a document existed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Reconstruct the document text by joining chunk contents in index
    /// order.
    async fn full_text(&self, document_id: &str) -> Result<String> {
        let chunks = self.document_chunks(document_id).await?;
        Ok(chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
