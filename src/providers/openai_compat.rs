//! Chat-completions adapter for OpenAI-compatible servers.
//!
//! Covers LM Studio, LocalAI, and the hosted OpenAI API itself; the
//! latter layers key validation and a curated model fallback on top in
//! [`super::openai`]. Streaming uses SSE `data:` lines terminated by a
//! `[DONE]` sentinel.

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

pub struct ChatCompletionsProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    organization: Option<String>,
    /// Returned when the `/models` probe fails; hosted vendors publish a
    /// known catalog, local servers leave this empty.
    fallback_models: Vec<String>,
    defaults: GenerationDefaults,
    client: reqwest::Client,
}

impl ChatCompletionsProvider {
    pub fn new(
        name: impl Into<String>,
        config: &ProviderConfig,
        defaults: GenerationDefaults,
        model_override: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model_override.unwrap_or(&config.default_model).to_string(),
            api_key: (!config.api_key.is_empty()).then(|| config.api_key.clone()),
            organization: (!config.organization.is_empty()).then(|| config.organization.clone()),
            fallback_models: Vec::new(),
            defaults,
            client: http_client(config.timeout_secs)?,
        })
    }

    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.post(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }
        request
    }

    fn request_body(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> serde_json::Value {
        let resolved = options.resolve(&self.defaults);
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": resolved.temperature,
            "max_tokens": resolved.max_tokens,
            "top_p": resolved.top_p,
            "stream": stream,
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> Error {
        Error::ProviderUnavailable {
            provider: self.name.clone(),
            base_url: self.base_url.clone(),
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the delta fragment from one SSE line, if any.
fn sse_fragment(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    let event: StreamEvent = serde_json::from_str(payload).ok()?;
    event
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %self.model, "chat completion");

        let response = self
            .request(&url)
            .json(&self.request_body(prompt, options, false))
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(format!("status {}", response.status())));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("malformed response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| self.unavailable("response carried no choices"))
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TokenStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .request(&url)
            .json(&self.request_body(prompt, options, true))
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(format!("status {}", response.status())));
        }

        let name = self.name.clone();
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
                                provider: name,
                                base_url,
                                message: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    if line.strip_prefix("data:").map(str::trim) == Some("[DONE]") {
                        return;
                    }
                    if let Some(fragment) = sse_fragment(&line) {
                        if tx.send(Ok(fragment)).await.is_err() {
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
        struct ModelList {
            #[serde(default)]
            data: Vec<ModelEntry>,
        }
        #[derive(Deserialize)]
        struct ModelEntry {
            id: String,
        }

        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url).timeout(PROBE_TIMEOUT);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let result: std::result::Result<ModelList, _> = async {
            request.send().await?.error_for_status()?.json().await
        }
        .await;

        match result {
            Ok(list) => list.data.into_iter().map(|m| m.id).collect(),
            Err(e) => {
                warn!(provider = %self.name, error = %e, "model listing failed");
                self.fallback_models.clone()
            }
        }
    }
}
