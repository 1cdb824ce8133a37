//! Task orchestration: wires documents, retrieval, prompts, providers,
//! and the result cache together.
//!
//! Every finished task returns a JSON payload carrying the result plus
//! provenance (`provider`, `model`, `truncated`, `cached`). Payloads are
//! cached under a deterministic key; a cache hit returns the stored
//! payload with its `cached` flag flipped to `true`. Streaming answers
//! bypass the cache entirely.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cache::cache_key;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::ingest;
use crate::models::{CacheEntry, Document, DocumentStatus, TaskKind};
use crate::prompt::{
    build_highlights_prompt, build_presentation_prompt, build_qa_prompt, build_summary_prompt,
    truncate_middle, SummaryStyle,
};
use crate::providers::{GenerationOptions, TokenStream};
use crate::registry::{ProviderRegistry, ProviderStatus};
use crate::retrieve::retrieve_relevant_chunks;
use crate::store::Store;

pub struct Service {
    store: Arc<dyn Store>,
    registry: ProviderRegistry,
    embedder: Arc<Embedder>,
    config: Config,
}

impl Service {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let embedder = Arc::new(Embedder::from_config(&config.embedding)?);
        let registry = ProviderRegistry::new(config.llm.clone());
        Ok(Self {
            store,
            registry,
            embedder,
            config,
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Save a new document and index it before returning.
    pub async fn add_document(&self, title: &str, text: &str) -> Result<Document> {
        let doc = Document::new(title);
        self.store.save_document(&doc).await?;
        ingest::process_document(
            self.store.as_ref(),
            &self.embedder,
            &self.config.rag,
            &doc.id,
            text,
        )
        .await?;
        self.store
            .get_document(&doc.id)
            .await?
            .ok_or_else(|| Error::NotFound(doc.id.clone()))
    }

    /// Save a new document and index it on a background task. The
    /// returned document is still `pending`; poll `document_status`.
    pub async fn add_document_background(&self, title: &str, text: &str) -> Result<Document> {
        let doc = Document::new(title);
        self.store.save_document(&doc).await?;
        ingest::spawn_indexing(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            self.config.rag.clone(),
            doc.id.clone(),
            text.to_string(),
        );
        Ok(doc)
    }

    pub async fn document_status(&self, id: &str) -> Result<Document> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub async fn delete_document(&self, id: &str) -> Result<()> {
        if !self.store.delete_document(id).await? {
            return Err(Error::NotFound(id.to_string()));
        }
        info!(document_id = id, "document deleted");
        Ok(())
    }

    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.registry.list()
    }

    pub fn switch_provider(&self, name: &str, model: Option<&str>) -> Result<Vec<ProviderStatus>> {
        self.registry.switch(name, model)?;
        Ok(self.registry.list())
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.registry.active()?.list_models().await)
    }

    pub async fn summarize(&self, id: &str, style: SummaryStyle, language: &str) -> Result<Value> {
        self.ensure_ready(id).await?;
        let provider = self.registry.active()?;
        let extra = format!("{}:{}", style, language);
        let key = cache_key(id, TaskKind::Summarize, provider.model(), &extra);

        if let Some(hit) = self.cache_hit(&key).await? {
            return Ok(hit);
        }

        let text = self.store.full_text(id).await?;
        let (text, truncated) = truncate_middle(&text, self.config.rag.max_prompt_chars);
        if truncated {
            warn!(document_id = id, "document text truncated for prompt");
        }
        let prompt = build_summary_prompt(&text, style, language);
        let summary = provider
            .generate(&prompt, &GenerationOptions::default())
            .await?;

        let payload = json!({
            "task": TaskKind::Summarize.as_str(),
            "document_id": id,
            "summary": summary,
            "style": style.as_str(),
            "language": language,
            "truncated": truncated,
            "provider": provider.name(),
            "model": provider.model(),
            "cached": false,
        });
        self.save_result(&key, id, TaskKind::Summarize, &payload)
            .await?;
        Ok(payload)
    }

    pub async fn highlights(&self, id: &str, language: &str) -> Result<Value> {
        self.structured_task(
            id,
            TaskKind::Highlights,
            language,
            build_highlights_prompt,
        )
        .await
    }

    pub async fn presentation(&self, id: &str, language: &str) -> Result<Value> {
        self.structured_task(
            id,
            TaskKind::Presentation,
            language,
            build_presentation_prompt,
        )
        .await
    }

    /// Shared flow for the tasks that expect a JSON object back from
    /// the model.
    async fn structured_task(
        &self,
        id: &str,
        task: TaskKind,
        language: &str,
        build_prompt: fn(&str, &str) -> String,
    ) -> Result<Value> {
        self.ensure_ready(id).await?;
        let provider = self.registry.active()?;
        let key = cache_key(id, task, provider.model(), language);

        if let Some(hit) = self.cache_hit(&key).await? {
            return Ok(hit);
        }

        let text = self.store.full_text(id).await?;
        let (text, truncated) = truncate_middle(&text, self.config.rag.max_prompt_chars);
        if truncated {
            warn!(document_id = id, "document text truncated for prompt");
        }
        let prompt = build_prompt(&text, language);
        let raw = provider
            .generate(&prompt, &GenerationOptions::default())
            .await?;

        // The model's keys (key_concepts/topics/..., or "raw" when
        // unparseable) sit at the top level of the payload, with the
        // provenance fields written over any collisions.
        let mut payload = parse_structured(&raw);
        let meta = json!({
            "task": task.as_str(),
            "document_id": id,
            "language": language,
            "truncated": truncated,
            "provider": provider.name(),
            "model": provider.model(),
            "cached": false,
        });
        if let (Some(object), Some(meta)) = (payload.as_object_mut(), meta.as_object()) {
            for (key, value) in meta {
                object.insert(key.clone(), value.clone());
            }
        }
        self.save_result(&key, id, task, &payload).await?;
        Ok(payload)
    }

    pub async fn ask(&self, id: &str, question: &str) -> Result<Value> {
        self.ensure_ready(id).await?;
        let provider = self.registry.active()?;
        let key = cache_key(id, TaskKind::Ask, provider.model(), question);

        if let Some(hit) = self.cache_hit(&key).await? {
            return Ok(hit);
        }

        let chunks = retrieve_relevant_chunks(
            self.store.as_ref(),
            &self.embedder,
            id,
            question,
            self.config.rag.top_k,
        )
        .await?;
        let prompt = build_qa_prompt(&chunks, question);
        let answer = provider
            .generate(&prompt, &GenerationOptions::default())
            .await?;

        let payload = json!({
            "task": TaskKind::Ask.as_str(),
            "document_id": id,
            "question": question,
            "answer": answer,
            "sources_used": chunks.len(),
            "provider": provider.name(),
            "model": provider.model(),
            "cached": false,
        });
        self.save_result(&key, id, TaskKind::Ask, &payload).await?;
        Ok(payload)
    }

    /// Streamed variant of [`ask`](Self::ask). Fragments are forwarded
    /// as the backend produces them and nothing is cached.
    pub async fn ask_stream(&self, id: &str, question: &str) -> Result<TokenStream> {
        self.ensure_ready(id).await?;
        let provider = self.registry.active()?;
        let chunks = retrieve_relevant_chunks(
            self.store.as_ref(),
            &self.embedder,
            id,
            question,
            self.config.rag.top_k,
        )
        .await?;
        let prompt = build_qa_prompt(&chunks, question);
        provider
            .stream_generate(&prompt, &GenerationOptions::default())
            .await
    }

    async fn ensure_ready(&self, id: &str) -> Result<Document> {
        let doc = self.document_status(id).await?;
        if doc.status != DocumentStatus::Ready {
            return Err(Error::NotReady {
                id: id.to_string(),
                status: doc.status,
            });
        }
        Ok(doc)
    }

    async fn cache_hit(&self, key: &str) -> Result<Option<Value>> {
        match self.store.cached_result(key).await? {
            Some(mut payload) => {
                debug!(key, "cache hit");
                payload["cached"] = Value::Bool(true);
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    async fn save_result(&self, key: &str, id: &str, task: TaskKind, payload: &Value) -> Result<()> {
        self.store
            .save_cached_result(&CacheEntry {
                key: key.to_string(),
                document_id: id.to_string(),
                task,
                result: payload.clone(),
                created_at: Utc::now(),
            })
            .await
    }
}

/// Interpret a model reply that should be a JSON object.
///
/// Models wrap JSON in markdown fences or pad it with prose often enough
/// that plain parsing is not enough: fences are stripped first, then the
/// first balanced `{…}` is extracted. A reply with no parseable object
/// comes back verbatim as `{"raw": <reply>}`.
pub fn parse_structured(raw: &str) -> Value {
    let stripped = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(stripped) {
        if value.is_object() {
            return value;
        }
    }
    if let Some(object) = extract_json_object(stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(object) {
            return value;
        }
    }
    json!({ "raw": raw })
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) on the opening fence.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => return trimmed,
    };
    body.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

/// First balanced top-level JSON object in `s`, respecting strings and
/// escapes.
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::finalize;
    use crate::store::memory::InMemoryStore;
    use futures_util::StreamExt;
    use httpmock::prelude::*;

    fn service_against(server: &MockServer) -> Service {
        let toml_str = format!(
            r#"
[db]
path = "/tmp/docsage-test.sqlite"

[llm]
default_provider = "lm_studio"

[llm.providers.lm_studio]
enabled = true
base_url = "{}"
default_model = "local-model"
timeout_secs = 5
"#,
            server.base_url()
        );
        let config = finalize(toml::from_str(&toml_str).expect("valid toml")).unwrap();
        Service::new(config, Arc::new(InMemoryStore::new())).unwrap()
    }

    fn mock_completion<'a>(server: &'a MockServer, content: &str) -> httpmock::Mock<'a> {
        let content = content.to_string();
        server.mock(move |when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            }));
        })
    }

    #[tokio::test]
    async fn test_summarize_caches_and_flips_flag_on_hit() {
        let server = MockServer::start_async().await;
        let mock = mock_completion(&server, "a short summary");
        let service = service_against(&server);

        let doc = service
            .add_document("notes.txt", "Some document text. More text here.")
            .await
            .unwrap();

        let first = service
            .summarize(&doc.id, SummaryStyle::Paragraph, "en")
            .await
            .unwrap();
        assert_eq!(first["summary"], "a short summary");
        assert_eq!(first["cached"], false);
        assert_eq!(first["provider"], "lm_studio");

        let second = service
            .summarize(&doc.id, SummaryStyle::Paragraph, "en")
            .await
            .unwrap();
        assert_eq!(second["cached"], true);
        assert_eq!(second["summary"], first["summary"]);
        // Only the first call reached the backend
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_different_style_misses_cache() {
        let server = MockServer::start_async().await;
        let mock = mock_completion(&server, "summary");
        let service = service_against(&server);
        let doc = service.add_document("d", "Text body.").await.unwrap();

        service
            .summarize(&doc.id, SummaryStyle::Paragraph, "en")
            .await
            .unwrap();
        service
            .summarize(&doc.id, SummaryStyle::Bullets, "en")
            .await
            .unwrap();
        mock.assert_hits(2);
    }

    #[tokio::test]
    async fn test_highlights_parses_fenced_json() {
        let server = MockServer::start_async().await;
        mock_completion(
            &server,
            "```json\n{\"key_concepts\": [\"alpha\"], \"topics\": [\"beta\"]}\n```",
        );
        let service = service_against(&server);
        let doc = service.add_document("d", "Text body.").await.unwrap();

        let payload = service.highlights(&doc.id, "en").await.unwrap();
        assert_eq!(payload["key_concepts"][0], "alpha");
        assert_eq!(payload["topics"][0], "beta");
        assert_eq!(payload["task"], "highlights");
        assert_eq!(payload["cached"], false);
    }

    #[tokio::test]
    async fn test_ask_uses_retrieval_and_counts_chunks() {
        let server = MockServer::start_async().await;
        mock_completion(&server, "the answer");
        let service = service_against(&server);
        let doc = service
            .add_document("d", "First fact. Second fact. Third fact.")
            .await
            .unwrap();

        let payload = service.ask(&doc.id, "what is the first fact?").await.unwrap();
        assert_eq!(payload["answer"], "the answer");
        assert!(payload["sources_used"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_pending_document_is_rejected() {
        let server = MockServer::start_async().await;
        let service = service_against(&server);
        let doc = Document::new("pending.txt");
        service.store.save_document(&doc).await.unwrap();

        let err = service.ask(&doc.id, "q").await.unwrap_err();
        assert!(matches!(err, Error::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let server = MockServer::start_async().await;
        let service = service_against(&server);
        let err = service
            .summarize("no-such-id", SummaryStyle::Paragraph, "en")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ask_stream_forwards_fragments_without_caching() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .json_body_partial(r#"{"stream": true}"#);
                then.status(200).body(concat!(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"str\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"eamed\"}}]}\n\n",
                    "data: [DONE]\n\n",
                ));
            })
            .await;
        let service = service_against(&server);
        let doc = service.add_document("d", "Body text.").await.unwrap();

        let stream = service.ask_stream(&doc.id, "q").await.unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "streamed");

        // Streaming never wrote to the cache: a later non-stream ask is
        // a miss and hits the backend.
        mock_completion(&server, "plain");
        let payload = service.ask(&doc.id, "q").await.unwrap();
        assert_eq!(payload["cached"], false);
    }

    #[test]
    fn test_parse_structured_plain_object() {
        let value = parse_structured(r#"{"title": "Deck"}"#);
        assert_eq!(value["title"], "Deck");
    }

    #[test]
    fn test_parse_structured_object_embedded_in_prose() {
        let value = parse_structured("Here you go:\n{\"a\": {\"b\": \"c}d\"}} trailing");
        assert_eq!(value["a"]["b"], "c}d");
    }

    #[test]
    fn test_parse_structured_unparseable_wraps_raw() {
        let value = parse_structured("I cannot produce JSON today");
        assert_eq!(value["raw"], "I cannot produce JSON today");
    }

    #[test]
    fn test_parse_structured_fenced_equals_unfenced() {
        let unfenced = r#"{"key_concepts": ["a"], "topics": ["b"]}"#;
        let fenced = format!("```json\n{unfenced}\n```");
        assert_eq!(parse_structured(&fenced), parse_structured(unfenced));
    }

    #[test]
    fn test_strip_code_fences_with_info_string() {
        assert_eq!(strip_code_fences("```json\n{\"x\":1}\n```"), "{\"x\":1}");
        assert_eq!(strip_code_fences("{\"x\":1}"), "{\"x\":1}");
    }
}
