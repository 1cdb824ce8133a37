//! Hosted Anthropic adapter (`/v1/messages`).
//!
//! Auth goes through the `x-api-key` header plus a pinned
//! `anthropic-version`. The API exposes no model-listing endpoint, so
//! listing always returns the curated catalog. Compiled out when the
//! `cloud-anthropic` feature is disabled.

use std::sync::Arc;

use crate::config::{GenerationDefaults, ProviderConfig};
use crate::error::Result;

use super::LlmProvider;

pub fn curated_models() -> Vec<String> {
    [
        "claude-3-5-sonnet-20241022",
        "claude-3-5-haiku-20241022",
        "claude-3-opus-20240229",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(feature = "cloud-anthropic")]
pub fn build(
    config: &ProviderConfig,
    defaults: GenerationDefaults,
    model_override: Option<&str>,
) -> Result<Arc<dyn LlmProvider>> {
    use crate::error::Error;

    if config.api_key.is_empty() {
        return Err(Error::ProviderMisconfigured {
            provider: "anthropic".to_string(),
            message:
                "api_key is required (set ANTHROPIC_API_KEY or llm.providers.anthropic.api_key)"
                    .to_string(),
        });
    }
    Ok(Arc::new(imp::AnthropicProvider::new(
        config,
        defaults,
        model_override,
    )?))
}

#[cfg(not(feature = "cloud-anthropic"))]
pub fn build(
    config: &ProviderConfig,
    _defaults: GenerationDefaults,
    model_override: Option<&str>,
) -> Result<Arc<dyn LlmProvider>> {
    use super::UnavailableProvider;

    let model = model_override.unwrap_or(&config.default_model);
    Ok(Arc::new(UnavailableProvider::new(
        "anthropic",
        model,
        curated_models(),
    )))
}

#[cfg(feature = "cloud-anthropic")]
mod imp {
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use serde::Deserialize;
    use serde_json::json;
    use tracing::debug;

    use crate::config::{GenerationDefaults, ProviderConfig};
    use crate::error::{Error, Result};
    use crate::providers::{
        fragment_channel, http_client, GenerationOptions, LineBuffer, LlmProvider, TokenStream,
    };

    const API_VERSION: &str = "2023-06-01";

    pub struct AnthropicProvider {
        base_url: String,
        model: String,
        api_key: String,
        defaults: GenerationDefaults,
        client: reqwest::Client,
    }

    impl AnthropicProvider {
        pub fn new(
            config: &ProviderConfig,
            defaults: GenerationDefaults,
            model_override: Option<&str>,
        ) -> Result<Self> {
            Ok(Self {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                model: model_override.unwrap_or(&config.default_model).to_string(),
                api_key: config.api_key.clone(),
                defaults,
                client: http_client(config.timeout_secs)?,
            })
        }

        fn request(&self) -> reqwest::RequestBuilder {
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
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
                "max_tokens": resolved.max_tokens,
                "temperature": resolved.temperature,
                "top_p": resolved.top_p,
                "messages": [{"role": "user", "content": prompt}],
                "stream": stream,
            })
        }

        fn unavailable(&self, message: impl Into<String>) -> Error {
            Error::ProviderUnavailable {
                provider: "anthropic".to_string(),
                base_url: self.base_url.clone(),
                message: message.into(),
            }
        }
    }

    #[derive(Deserialize)]
    struct MessagesResponse {
        content: Vec<ContentBlock>,
    }

    #[derive(Deserialize)]
    struct ContentBlock {
        #[serde(default)]
        text: String,
    }

    #[derive(Deserialize)]
    struct StreamEvent {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        delta: Option<StreamDelta>,
    }

    #[derive(Deserialize)]
    struct StreamDelta {
        #[serde(default)]
        text: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for AnthropicProvider {
        fn name(&self) -> &str {
            "anthropic"
        }

        fn model(&self) -> &str {
            &self.model
        }

        async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
            debug!(model = %self.model, "anthropic messages call");
            let response = self
                .request()
                .json(&self.request_body(prompt, options, false))
                .send()
                .await
                .map_err(|e| self.unavailable(e.to_string()))?;

            if !response.status().is_success() {
                return Err(self.unavailable(format!("status {}", response.status())));
            }

            let parsed: MessagesResponse = response
                .json()
                .await
                .map_err(|e| self.unavailable(format!("malformed response: {}", e)))?;
            parsed
                .content
                .into_iter()
                .next()
                .map(|block| block.text)
                .ok_or_else(|| self.unavailable("response carried no content blocks"))
        }

        async fn stream_generate(
            &self,
            prompt: &str,
            options: &GenerationOptions,
        ) -> Result<TokenStream> {
            let response = self
                .request()
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
                                    provider: "anthropic".to_string(),
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
                        match event.kind.as_str() {
                            "content_block_delta" => {
                                if let Some(text) =
                                    event.delta.and_then(|delta| delta.text)
                                {
                                    if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            "message_stop" => return,
                            _ => {}
                        }
                    }
                }
            });

            Ok(stream)
        }

        async fn list_models(&self) -> Vec<String> {
            super::curated_models()
        }
    }

}
