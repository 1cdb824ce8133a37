//! Generation backend adapters.
//!
//! Every backend implements [`LlmProvider`]; the registry constructs
//! adapters from [`ProviderConfig`](crate::config::ProviderConfig)
//! entries and hands them out as trait objects. Streaming adapters push
//! fragments through a bounded channel so that dropping the consumer
//! stream tears down the underlying network request.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::GenerationDefaults;
use crate::error::{Error, Result};

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod openai_compat;
pub mod textgen;

/// Per-call sampling overrides; `None` falls back to the configured
/// generation defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl GenerationOptions {
    pub fn resolve(&self, defaults: &GenerationDefaults) -> ResolvedOptions {
        ResolvedOptions {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            top_p: self.top_p.unwrap_or(defaults.top_p),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

/// Ordered fragments of one generation. Ends on the first `Err` or when
/// the backend signals completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Registry key of the backend (`"ollama"`, `"openai"`, ...).
    fn name(&self) -> &str;

    /// Model this instance was constructed for.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Stream fragments as the backend produces them. The default
    /// implementation degrades to a single-fragment stream over
    /// [`generate`](Self::generate) for backends without a streaming
    /// wire mode.
    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TokenStream> {
        let text = self.generate(prompt, options).await?;
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(text)])))
    }

    /// Models the backend advertises. Probe failures return an empty
    /// list, never an error.
    async fn list_models(&self) -> Vec<String>;
}

impl std::fmt::Debug for dyn LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider")
            .field("name", &self.name())
            .field("model", &self.model())
            .finish()
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("failed to build http client: {}", e)))
}

/// Short timeout used for model-listing probes so a dead backend does
/// not stall the caller.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded fragment channel. The producer side lives in a spawned task;
/// when the consumer drops the stream the next `send` fails and the
/// producer unwinds, dropping its network response.
pub(crate) fn fragment_channel() -> (mpsc::Sender<Result<String>>, TokenStream) {
    let (tx, rx) = mpsc::channel(32);
    (tx, Box::pin(ReceiverStream::new(rx)))
}

/// Splits a byte stream into complete lines across arbitrary chunk
/// boundaries. Used for both NDJSON and SSE wire formats.
#[derive(Default)]
pub(crate) struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line = self.pending[..pos].trim_end_matches('\r').to_string();
            self.pending.drain(..=pos);
            lines.push(line);
        }
        lines
    }
}

/// Placeholder for a vendor adapter compiled out of this build. Listing
/// still works (curated names) so the provider remains visible, but
/// generation reports the missing integration.
pub struct UnavailableProvider {
    name: &'static str,
    model: String,
    models: Vec<String>,
}

impl UnavailableProvider {
    pub fn new(name: &'static str, model: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name,
            model: model.into(),
            models,
        }
    }
}

#[async_trait]
impl LlmProvider for UnavailableProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Err(Error::IntegrationMissing {
            provider: self.name.to_string(),
            message: format!(
                "support for '{}' is not compiled into this build",
                self.name
            ),
        })
    }

    async fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_options_resolve_against_defaults() {
        let defaults = GenerationDefaults::default();
        let resolved = GenerationOptions::default().resolve(&defaults);
        assert_eq!(resolved.temperature, defaults.temperature);
        assert_eq!(resolved.max_tokens, defaults.max_tokens);

        let resolved = GenerationOptions {
            temperature: Some(0.9),
            max_tokens: None,
            top_p: Some(1.0),
        }
        .resolve(&defaults);
        assert_eq!(resolved.temperature, 0.9);
        assert_eq!(resolved.max_tokens, defaults.max_tokens);
        assert_eq!(resolved.top_p, 1.0);
    }

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: {\"par").is_empty());
        assert_eq!(buf.push(b"tial\"}\ndata: "), vec!["data: {\"partial\"}"]);
        assert_eq!(buf.push(b"[DONE]\n\n"), vec!["data: [DONE]", ""]);
    }

    #[test]
    fn test_line_buffer_strips_carriage_returns() {
        let mut buf = LineBuffer::default();
        assert_eq!(buf.push(b"one\r\ntwo\r\n"), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_unavailable_provider_reports_missing_integration() {
        let provider = UnavailableProvider::new("anthropic", "claude", vec!["claude".to_string()]);
        let err = provider
            .generate("hi", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IntegrationMissing { .. }));
        assert_eq!(provider.list_models().await, vec!["claude"]);
    }

    #[tokio::test]
    async fn test_default_stream_is_single_fragment() {
        let provider = EchoProvider;
        let mut stream = provider
            .stream_generate("hello", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "echo: hello");
        assert!(stream.next().await.is_none());
    }

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        fn model(&self) -> &str {
            "echo-1"
        }
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
            Ok(format!("echo: {}", prompt))
        }
        async fn list_models(&self) -> Vec<String> {
            vec!["echo-1".to_string()]
        }
    }
}
