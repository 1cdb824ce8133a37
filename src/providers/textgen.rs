//! text-generation-webui legacy API adapter.
//!
//! The webui serves one loaded model at a time: `/api/v1/model` reports
//! its name and the `model` request field is ignored server-side, so
//! model overrides only affect bookkeeping here.

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

pub struct TextGenWebuiProvider {
    base_url: String,
    model: String,
    defaults: GenerationDefaults,
    client: reqwest::Client,
}

impl TextGenWebuiProvider {
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

    fn request_body(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> serde_json::Value {
        let resolved = options.resolve(&self.defaults);
        json!({
            "prompt": prompt,
            "max_new_tokens": resolved.max_tokens,
            "temperature": resolved.temperature,
            "top_p": resolved.top_p,
            "stream": stream,
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> Error {
        Error::ProviderUnavailable {
            provider: "text_generation_webui".to_string(),
            base_url: self.base_url.clone(),
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    results: Vec<ResultEntry>,
}

#[derive(Deserialize)]
struct ResultEntry {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    token: Option<TokenEvent>,
}

#[derive(Deserialize)]
struct TokenEvent {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmProvider for TextGenWebuiProvider {
    fn name(&self) -> &str {
        "text_generation_webui"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let url = format!("{}/api/v1/generate", self.base_url);
        debug!("text-generation-webui generate");

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

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("malformed response: {}", e)))?;
        parsed
            .results
            .into_iter()
            .next()
            .map(|entry| entry.text)
            .ok_or_else(|| self.unavailable("response carried no results"))
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TokenStream> {
        let url = format!("{}/api/v1/generate", self.base_url);
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
                                provider: "text_generation_webui".to_string(),
                                base_url,
                                message: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<StreamEvent>(payload) else {
                        continue;
                    };
                    if event.event.as_deref() == Some("stream_end") {
                        return;
                    }
                    if let Some(token) = event.token {
                        if !token.text.is_empty() && tx.send(Ok(token.text)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(stream)
    }

    async fn list_models(&self) -> Vec<String> {
        #[derive(Deserialize)]
        struct ModelInfo {
            result: String,
        }

        let url = format!("{}/api/v1/model", self.base_url);
        let result: std::result::Result<ModelInfo, _> = async {
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
            Ok(info) if !info.result.is_empty() => vec![info.result],
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "text-generation-webui model probe failed");
                Vec::new()
            }
        }
    }
}
