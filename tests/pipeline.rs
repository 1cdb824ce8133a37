//! End-to-end pipeline tests: ingest into SQLite, run tasks against a
//! mocked backend, and exercise provider switching and cache
//! persistence across store reopens.

use std::sync::Arc;

use httpmock::prelude::*;

use docsage::config::{finalize, Config};
use docsage::prompt::SummaryStyle;
use docsage::service::Service;
use docsage::store::sqlite::SqliteStore;

fn config_for(db_path: &std::path::Path, ollama_url: &str, lm_studio_url: &str) -> Config {
    let toml_str = format!(
        r#"
[db]
path = "{}"

[rag]
chunk_size = 80
chunk_overlap = 10

[llm]
default_provider = "ollama"

[llm.providers.ollama]
enabled = true
base_url = "{}"
default_model = "llama3.2:latest"
timeout_secs = 5

[llm.providers.lm_studio]
enabled = true
base_url = "{}"
default_model = "local-model"
timeout_secs = 5
"#,
        db_path.display(),
        ollama_url,
        lm_studio_url
    );
    finalize(toml::from_str(&toml_str).expect("valid toml")).expect("valid config")
}

async fn service_at(
    db_path: &std::path::Path,
    ollama_url: &str,
    lm_studio_url: &str,
) -> Service {
    let store = Arc::new(SqliteStore::connect(db_path).await.expect("store opens"));
    Service::new(config_for(db_path, ollama_url, lm_studio_url), store).expect("service builds")
}

#[tokio::test]
async fn ingest_then_summarize_and_ask() {
    let ollama = MockServer::start_async().await;
    let lm_studio = MockServer::start_async().await;
    ollama
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200)
                .json_body(serde_json::json!({"response": "a concise summary", "done": true}));
        })
        .await;

    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("docsage.sqlite");
    let service = service_at(&db_path, &ollama.base_url(), &lm_studio.base_url()).await;

    let doc = service
        .add_document(
            "quarterly.txt",
            "Revenue grew in the third quarter. Costs were flat. Margins improved overall.",
        )
        .await
        .unwrap();
    let status = service.document_status(&doc.id).await.unwrap();
    assert_eq!(status.status.to_string(), "ready");
    assert!(status.token_count > 0);

    let summary = service
        .summarize(&doc.id, SummaryStyle::Paragraph, "en")
        .await
        .unwrap();
    assert_eq!(summary["summary"], "a concise summary");
    assert_eq!(summary["provider"], "ollama");
    assert_eq!(summary["truncated"], false);

    let answer = service.ask(&doc.id, "did margins improve?").await.unwrap();
    assert_eq!(answer["answer"], "a concise summary");
    assert!(answer["sources_used"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn switching_provider_changes_backend_and_cache_identity() {
    let ollama = MockServer::start_async().await;
    let lm_studio = MockServer::start_async().await;
    ollama
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200)
                .json_body(serde_json::json!({"response": "from ollama", "done": true}));
        })
        .await;
    lm_studio
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "from lm studio"}}]
            }));
        })
        .await;

    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("docsage.sqlite");
    let service = service_at(&db_path, &ollama.base_url(), &lm_studio.base_url()).await;
    let doc = service.add_document("doc", "Body of text.").await.unwrap();

    let first = service
        .summarize(&doc.id, SummaryStyle::Paragraph, "en")
        .await
        .unwrap();
    assert_eq!(first["summary"], "from ollama");

    service.switch_provider("lm_studio", None).unwrap();

    // Different model identity means a cache miss, not a stale hit.
    let second = service
        .summarize(&doc.id, SummaryStyle::Paragraph, "en")
        .await
        .unwrap();
    assert_eq!(second["summary"], "from lm studio");
    assert_eq!(second["cached"], false);
}

#[tokio::test]
async fn cached_results_survive_a_store_reopen() {
    let ollama = MockServer::start_async().await;
    let lm_studio = MockServer::start_async().await;
    let mock = ollama
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200)
                .json_body(serde_json::json!({"response": "persisted summary", "done": true}));
        })
        .await;

    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("docsage.sqlite");

    let service = service_at(&db_path, &ollama.base_url(), &lm_studio.base_url()).await;
    let doc = service.add_document("doc", "Some text here.").await.unwrap();
    let first = service
        .summarize(&doc.id, SummaryStyle::Paragraph, "en")
        .await
        .unwrap();
    assert_eq!(first["cached"], false);
    drop(service);

    // Fresh pool over the same database file.
    let service = service_at(&db_path, &ollama.base_url(), &lm_studio.base_url()).await;
    let second = service
        .summarize(&doc.id, SummaryStyle::Paragraph, "en")
        .await
        .unwrap();
    assert_eq!(second["cached"], true);
    assert_eq!(second["summary"], "persisted summary");
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn unknown_switch_target_lists_known_providers() {
    let ollama = MockServer::start_async().await;
    let lm_studio = MockServer::start_async().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("docsage.sqlite");
    let service = service_at(&db_path, &ollama.base_url(), &lm_studio.base_url()).await;

    let err = service.switch_provider("gpt5-ultra", None).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("gpt5-ultra"));
    assert!(message.contains("ollama"));
    assert!(message.contains("lm_studio"));
}
