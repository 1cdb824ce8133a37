//! Ollama native API adapter (`/api/generate`, `/api/tags`).

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{GenerationDefaults, ProviderConfig};
use crate::error::{Error, Result};

use super::{
    fragment_channel, http_client, GenerationOptions, LineBuffer, LlmProvider, TokenStream,
    PROBE_TIMEOUT,
};

pub struct OllamaProvider {
    base_url: String,
    model: String,
    defaults: GenerationDefaults,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(
        config: &ProviderConfig,
        defaults: GenerationDefaults,
        model_override: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model_override.unwrap_or(&config.default_model).to_string(),
            defaults,
            client: http_client(config.timeout_secs)?,
        })
    }

    fn request_body(&self, prompt: &str, options: &GenerationOptions, stream: bool) -> serde_json::Value {
        let resolved = options.resolve(&self.defaults);
        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
            "options": {
                "temperature": resolved.temperature,
                "num_predict": resolved.max_tokens,
                "top_p": resolved.top_p,
            },
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> Error {
        Error::ProviderUnavailable {
            provider: "ollama".to_string(),
            base_url: self.base_url.clone(),
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, "ollama generate");

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, options, false))
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(format!("status {}", response.status())));
        }

        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("malformed response: {}", e)))?;
        Ok(chunk.response)
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TokenStream> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, options, true))
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(format!("status {}", response.status())));
        }

        let provider = "ollama".to_string();
        let base_url = self.base_url.clone();
        let (tx, stream) = fragment_channel();

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(Error::ProviderUnavailable {
                                provider,
                                base_url,
                                message: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<GenerateChunk>(&line) {
                        Ok(parsed) => {
                            if !parsed.response.is_empty()
                                && tx.send(Ok(parsed.response)).await.is_err()
                            {
                                // Consumer gone; drop the response stream.
                                return;
                            }
                            if parsed.done {
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "skipping malformed ollama stream line"),
                    }
                }
            }
        });

        Ok(stream)
    }

    async fn list_models(&self) -> Vec<String> {
        #[derive(Deserialize)]
        struct Tags {
            #[serde(default)]
            models: Vec<TagEntry>,
        }
        #[derive(Deserialize)]
        struct TagEntry {
            name: String,
        }

        let url = format!("{}/api/tags", self.base_url);
        let result: std::result::Result<Tags, _> = async {
            self.client
                .get(&url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        match result {
            Ok(tags) => tags.models.into_iter().map(|m| m.name).collect(),
            Err(e) => {
                warn!(error = %e, "ollama model listing failed");
                Vec::new()
            }
        }
    }
}
