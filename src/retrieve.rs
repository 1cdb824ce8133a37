//! Chunk retrieval for question answering.
//!
//! Ranks a document's chunks against a query by cosine similarity over
//! stored embeddings. Degrades deliberately: when no vectors exist (the
//! embedding backend was down or disabled at index time) or the query
//! itself cannot be embedded, the leading chunks stand in as context so
//! answering still works, just less precisely.

use tracing::debug;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::store::Store;

pub async fn retrieve_relevant_chunks(
    store: &dyn Store,
    embedder: &Embedder,
    document_id: &str,
    query: &str,
    top_k: usize,
) -> Result<Vec<String>> {
    let embedded = store.embeddings_for_document(document_id).await?;

    if embedded.is_empty() {
        let chunks = store.document_chunks(document_id).await?;
        if chunks.is_empty() {
            return Err(Error::NoContent(document_id.to_string()));
        }
        debug!(document_id, "no stored embeddings, using positional fallback");
        return Ok(chunks
            .into_iter()
            .take(top_k)
            .map(|chunk| chunk.content)
            .collect());
    }

    let query_vector = match embedder.embed_one(query).await? {
        Some(vector) => vector,
        None => {
            // Same degraded mode as the no-vectors case: leading document
            // chunks, not just the subset that happens to carry embeddings.
            debug!(document_id, "query embedding unavailable, using positional fallback");
            let chunks = store.document_chunks(document_id).await?;
            return Ok(chunks
                .into_iter()
                .take(top_k)
                .map(|chunk| chunk.content)
                .collect());
        }
    };

    let mut scored: Vec<(f32, i64, String)> = embedded
        .into_iter()
        .map(|chunk| {
            let score = cosine_similarity(&query_vector, &chunk.vector);
            (score, chunk.index, chunk.content)
        })
        .collect();

    // Highest similarity first; equal scores keep document order.
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    Ok(scored
        .into_iter()
        .take(top_k)
        .map(|(_, _, content)| content)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::store::memory::InMemoryStore;

    async fn store_with_chunks(texts: &[&str]) -> (InMemoryStore, Document, Vec<i64>) {
        let store = InMemoryStore::new();
        let doc = Document::new("doc");
        store.save_document(&doc).await.unwrap();
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let tokens: Vec<i64> = texts.iter().map(|_| 1).collect();
        let ids = store.save_chunks(&doc.id, &texts, &tokens).await.unwrap();
        (store, doc, ids)
    }

    #[tokio::test]
    async fn test_no_embeddings_returns_leading_chunks() {
        let (store, doc, _) = store_with_chunks(&["first", "second", "third"]).await;
        let chunks =
            retrieve_relevant_chunks(&store, &Embedder::Disabled, &doc.id, "anything", 2)
                .await
                .unwrap();
        assert_eq!(chunks, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_empty_document_is_no_content() {
        let store = InMemoryStore::new();
        let doc = Document::new("empty");
        store.save_document(&doc).await.unwrap();
        let err = retrieve_relevant_chunks(&store, &Embedder::Disabled, &doc.id, "q", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoContent(_)));
    }

    #[tokio::test]
    async fn test_disabled_embedder_falls_back_even_with_stored_vectors() {
        let (store, doc, ids) = store_with_chunks(&["a", "b", "c"]).await;
        store
            .save_embeddings(&ids, &[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
            .await
            .unwrap();

        let chunks = retrieve_relevant_chunks(&store, &Embedder::Disabled, &doc.id, "q", 2)
            .await
            .unwrap();
        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_query_fallback_uses_document_order_with_partial_vectors() {
        // Only the later chunks were embedded; the fallback must still
        // return the leading chunks of the document, not the embedded subset.
        let (store, doc, ids) = store_with_chunks(&["first", "second", "third"]).await;
        store
            .save_embeddings(&ids[1..], &[vec![0.0, 1.0], vec![1.0, 1.0]])
            .await
            .unwrap();

        let chunks = retrieve_relevant_chunks(&store, &Embedder::Disabled, &doc.id, "q", 2)
            .await
            .unwrap();
        assert_eq!(chunks, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_cosine_ranking_orders_by_similarity() {
        use crate::config::EmbeddingConfig;
        use httpmock::prelude::*;

        let (store, doc, ids) = store_with_chunks(&["east", "north", "northeast"]).await;
        store
            .save_embeddings(
                &ids,
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            )
            .await
            .unwrap();

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embeddings");
                then.status(200)
                    .json_body(serde_json::json!({"embedding": [0.0, 1.0]}));
            })
            .await;
        let embedder = Embedder::from_config(&EmbeddingConfig {
            provider: "ollama".to_string(),
            base_url: server.base_url(),
            model: "nomic-embed-text".to_string(),
            timeout_secs: 5,
        })
        .unwrap();

        let chunks = retrieve_relevant_chunks(&store, &embedder, &doc.id, "which way", 2)
            .await
            .unwrap();
        assert_eq!(chunks, vec!["north", "northeast"]);
    }
}
