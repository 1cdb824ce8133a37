//! Embedding backend abstraction.
//!
//! The [`Embedder`] capability is resolved once at construction from the
//! `[embedding]` config section: either `Disabled` or an Ollama-native
//! HTTP backend. Unavailability is a first-class state, not an error:
//! [`Embedder::embed`] returns `Ok(None)` both when the backend is
//! disabled and when it cannot be reached at call time, and retrieval
//! silently downgrades to positional selection in response.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — relevance score between two vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 encoding for
//!   SQLite BLOB storage

use std::time::Duration;

use serde_json::json;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Embedding capability, fixed at construction.
pub enum Embedder {
    /// No embedding backend configured; every call reports unavailable.
    Disabled,
    /// Ollama-native embeddings API (`POST /api/embeddings`).
    Ollama(OllamaEmbedder),
}

impl Embedder {
    /// Resolve the capability from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        match config.provider.as_str() {
            "disabled" => Ok(Embedder::Disabled),
            "ollama" => Ok(Embedder::Ollama(OllamaEmbedder::new(config)?)),
            other => Err(Error::Config(format!(
                "unknown embedding provider: {}",
                other
            ))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Embedder::Disabled)
    }

    /// Embed a batch of texts.
    ///
    /// `Ok(None)` means the capability is unavailable (disabled, or the
    /// backend could not be reached); callers must treat this as a normal
    /// branch and fall back to positional retrieval.
    pub async fn embed(&self, texts: &[String]) -> Result<Option<Vec<Vec<f32>>>> {
        let backend = match self {
            Embedder::Disabled => return Ok(None),
            Embedder::Ollama(backend) => backend,
        };

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            match backend.embed_one(text).await {
                Ok(vector) => vectors.push(vector),
                Err(err) => {
                    warn!(model = %backend.model, "embedding backend unavailable: {}", err);
                    return Ok(None);
                }
            }
        }
        Ok(Some(vectors))
    }

    /// Embed a single query text.
    pub async fn embed_one(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let texts = [text.to_string()];
        Ok(self.embed(&texts).await?.map(|mut v| v.remove(0)))
    }
}

/// Embedding backend speaking the Ollama-native API.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let resp = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = resp.json().await?;
        let values = body
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("missing embedding in response"))?;

        Ok(values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns `0.0` for empty vectors, mismatched lengths, or when either
/// vector has zero norm (guards the division).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
