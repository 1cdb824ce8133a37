//! Document indexing pipeline.
//!
//! Splitting and token accounting are synchronous; embedding is a
//! best-effort network call whose failure downgrades retrieval quality
//! instead of failing the ingest.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chunk::{estimate_tokens, split_text};
use crate::config::RagConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::DocumentStatus;
use crate::store::Store;

/// Totals recorded on the document row once indexing finishes.
#[derive(Debug, Clone, Copy)]
pub struct IndexOutcome {
    pub chunk_count: usize,
    pub text_length: i64,
    pub token_count: i64,
    pub embedded: bool,
}

/// Split `text`, persist the chunks, and attach embeddings when the
/// embedding backend yields them.
pub async fn index_document(
    store: &dyn Store,
    embedder: &Embedder,
    rag: &RagConfig,
    document_id: &str,
    text: &str,
) -> Result<IndexOutcome> {
    let chunks = split_text(text, rag.chunk_size, rag.chunk_overlap);
    let token_counts: Vec<i64> = chunks
        .iter()
        .map(|chunk| estimate_tokens(chunk) as i64)
        .collect();
    let token_count: i64 = token_counts.iter().sum();

    let chunk_ids = store.save_chunks(document_id, &chunks, &token_counts).await?;

    let mut embedded = false;
    if embedder.is_enabled() {
        match embedder.embed(&chunks).await? {
            Some(vectors) => {
                store.save_embeddings(&chunk_ids, &vectors).await?;
                embedded = true;
            }
            None => {
                warn!(document_id, "embedding backend unavailable, indexing without vectors");
            }
        }
    }

    Ok(IndexOutcome {
        chunk_count: chunks.len(),
        text_length: text.len() as i64,
        token_count,
        embedded,
    })
}

/// Run the full pending → processing → ready/error lifecycle for one
/// document.
pub async fn process_document(
    store: &dyn Store,
    embedder: &Embedder,
    rag: &RagConfig,
    document_id: &str,
    text: &str,
) -> Result<IndexOutcome> {
    store
        .update_status(document_id, DocumentStatus::Processing, None, None)
        .await?;

    match index_document(store, embedder, rag, document_id, text).await {
        Ok(outcome) => {
            store
                .update_status(
                    document_id,
                    DocumentStatus::Ready,
                    Some(outcome.text_length),
                    Some(outcome.token_count),
                )
                .await?;
            info!(
                document_id,
                chunks = outcome.chunk_count,
                tokens = outcome.token_count,
                embedded = outcome.embedded,
                "document indexed"
            );
            Ok(outcome)
        }
        Err(e) => {
            error!(document_id, error = %e, "indexing failed");
            store
                .update_status(document_id, DocumentStatus::Error, None, None)
                .await?;
            Err(e)
        }
    }
}

/// Fire-and-forget variant for callers that should not block on
/// indexing.
pub fn spawn_indexing(
    store: Arc<dyn Store>,
    embedder: Arc<Embedder>,
    rag: RagConfig,
    document_id: String,
    text: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let _ = process_document(store.as_ref(), &embedder, &rag, &document_id, &text).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_process_document_reaches_ready_with_totals() {
        let store = InMemoryStore::new();
        let doc = Document::new("doc");
        store.save_document(&doc).await.unwrap();

        let text = "First sentence here. Second sentence follows. Third one closes.";
        let outcome = process_document(
            &store,
            &Embedder::Disabled,
            &RagConfig::default(),
            &doc.id,
            text,
        )
        .await
        .unwrap();

        assert_eq!(outcome.chunk_count, 1);
        assert!(!outcome.embedded);

        let doc = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.text_length, text.len() as i64);
        assert!(doc.token_count > 0);
    }

    #[tokio::test]
    async fn test_chunks_persist_in_order() {
        let store = InMemoryStore::new();
        let doc = Document::new("doc");
        store.save_document(&doc).await.unwrap();

        let text = "One sentence here. Two sentences now. Three in total. Four to be safe.";
        let rag = RagConfig {
            chunk_size: 45,
            chunk_overlap: 0,
            ..Default::default()
        };
        let outcome = index_document(&store, &Embedder::Disabled, &rag, &doc.id, text)
            .await
            .unwrap();
        assert!(outcome.chunk_count > 1);

        let chunks = store.document_chunks(&doc.id).await.unwrap();
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[tokio::test]
    async fn test_embeddings_stored_when_backend_responds() {
        use crate::config::EmbeddingConfig;
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embeddings");
                then.status(200)
                    .json_body(serde_json::json!({"embedding": [0.1, 0.2, 0.3]}));
            })
            .await;

        let embedder = Embedder::from_config(&EmbeddingConfig {
            provider: "ollama".to_string(),
            base_url: server.base_url(),
            model: "nomic-embed-text".to_string(),
            timeout_secs: 5,
        })
        .unwrap();

        let store = InMemoryStore::new();
        let doc = Document::new("doc");
        store.save_document(&doc).await.unwrap();

        let outcome = index_document(
            &store,
            &embedder,
            &RagConfig::default(),
            &doc.id,
            "Short text.",
        )
        .await
        .unwrap();
        assert!(outcome.embedded);

        let stored = store.embeddings_for_document(&doc.id).await.unwrap();
        assert_eq!(stored.len(), outcome.chunk_count);
        assert_eq!(stored[0].vector, vec![0.1, 0.2, 0.3]);
    }
}
