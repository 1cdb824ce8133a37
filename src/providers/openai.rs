//! Hosted OpenAI adapter.
//!
//! Wire-wise this is the chat-completions protocol; on top of it the
//! hosted service needs a non-empty API key and gets a curated model
//! fallback for when the `/models` probe is rejected. Compiled out when
//! the `cloud-openai` feature is disabled, in which case the registry
//! resolves an [`UnavailableProvider`](super::UnavailableProvider).

use std::sync::Arc;

use crate::config::{GenerationDefaults, ProviderConfig};
use crate::error::Result;

use super::LlmProvider;

/// Catalog returned when the live listing is unreachable.
pub fn curated_models() -> Vec<String> {
    ["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(feature = "cloud-openai")]
pub fn build(
    config: &ProviderConfig,
    defaults: GenerationDefaults,
    model_override: Option<&str>,
) -> Result<Arc<dyn LlmProvider>> {
    use crate::error::Error;

    use super::openai_compat::ChatCompletionsProvider;

    if config.api_key.is_empty() {
        return Err(Error::ProviderMisconfigured {
            provider: "openai".to_string(),
            message: "api_key is required (set OPENAI_API_KEY or llm.providers.openai.api_key)"
                .to_string(),
        });
    }

    Ok(Arc::new(
        ChatCompletionsProvider::new("openai", config, defaults, model_override)?
            .with_fallback_models(curated_models()),
    ))
}

#[cfg(not(feature = "cloud-openai"))]
pub fn build(
    config: &ProviderConfig,
    _defaults: GenerationDefaults,
    model_override: Option<&str>,
) -> Result<Arc<dyn LlmProvider>> {
    use super::UnavailableProvider;

    let model = model_override.unwrap_or(&config.default_model);
    Ok(Arc::new(UnavailableProvider::new(
        "openai",
        model,
        curated_models(),
    )))
}
