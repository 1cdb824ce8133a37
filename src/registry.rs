//! Provider selection and adapter cache.
//!
//! The registry owns the configured backends, the active
//! `(provider, model override)` selection, and a cache of constructed
//! adapters keyed by that pair. Switching is eager: the new adapter is
//! constructed (and validated) before the selection changes, so a
//! failed switch leaves the previous provider active. Callers that
//! already hold an `Arc` to the old adapter keep a working handle;
//! in-flight requests are never interrupted by a switch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::{
    anthropic, ollama::OllamaProvider, openai, openai_compat::ChatCompletionsProvider,
    textgen::TextGenWebuiProvider, LlmProvider,
};

type Selection = (String, Option<String>);

pub struct ProviderRegistry {
    llm: LlmConfig,
    active: Mutex<Selection>,
    cache: Mutex<HashMap<Selection, Arc<dyn LlmProvider>>>,
}

/// One row of `list()` output, shaped for display and serialization.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub enabled: bool,
    pub base_url: String,
    pub default_model: String,
    pub has_api_key: bool,
    pub active: bool,
}

impl ProviderRegistry {
    pub fn new(llm: LlmConfig) -> Self {
        let active = (llm.default_provider.clone(), None);
        Self {
            llm,
            active: Mutex::new(active),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The currently selected `(provider, model override)` pair.
    pub fn active_selection(&self) -> Selection {
        self.active.lock().unwrap().clone()
    }

    /// Adapter for the active selection, constructing and caching it on
    /// first use.
    pub fn active(&self) -> Result<Arc<dyn LlmProvider>> {
        let selection = self.active_selection();
        self.provider_for(&selection)
    }

    /// Select a provider (optionally pinning a model). Eagerly
    /// constructs the adapter so misconfiguration surfaces here instead
    /// of at the next generation call.
    pub fn switch(&self, name: &str, model: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        if !self.llm.providers.contains_key(name) {
            return Err(Error::UnknownProvider {
                requested: name.to_string(),
                known: self.known_names(),
            });
        }

        let selection = (name.to_string(), model.map(String::from));
        let provider = self.provider_for(&selection)?;
        *self.active.lock().unwrap() = selection;
        info!(provider = name, model = provider.model(), "switched provider");
        Ok(provider)
    }

    pub fn list(&self) -> Vec<ProviderStatus> {
        let (active_name, _) = self.active_selection();
        self.llm
            .providers
            .iter()
            .map(|(name, cfg)| ProviderStatus {
                name: name.clone(),
                enabled: cfg.enabled,
                base_url: cfg.base_url.clone(),
                default_model: cfg.default_model.clone(),
                has_api_key: !cfg.api_key.is_empty(),
                active: *name == active_name,
            })
            .collect()
    }

    fn known_names(&self) -> Vec<String> {
        // BTreeMap keys are already sorted.
        self.llm.providers.keys().cloned().collect()
    }

    fn provider_for(&self, selection: &Selection) -> Result<Arc<dyn LlmProvider>> {
        if let Some(provider) = self.cache.lock().unwrap().get(selection) {
            return Ok(Arc::clone(provider));
        }

        let provider = self.construct(&selection.0, selection.1.as_deref())?;
        self.cache
            .lock()
            .unwrap()
            .insert(selection.clone(), Arc::clone(&provider));
        Ok(provider)
    }

    fn construct(&self, name: &str, model: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let config = self
            .llm
            .providers
            .get(name)
            .ok_or_else(|| Error::UnknownProvider {
                requested: name.to_string(),
                known: self.known_names(),
            })?;
        let defaults = self.llm.generation;

        Ok(match name {
            "ollama" => Arc::new(OllamaProvider::new(config, defaults, model)?),
            "openai" => openai::build(config, defaults, model)?,
            "anthropic" => anthropic::build(config, defaults, model)?,
            "text_generation_webui" => {
                Arc::new(TextGenWebuiProvider::new(config, defaults, model)?)
            }
            // lm_studio, localai, and any user-defined entry speak the
            // chat-completions protocol.
            other => Arc::new(ChatCompletionsProvider::new(other, config, defaults, model)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{finalize, Config};

    fn registry() -> ProviderRegistry {
        let config: Config =
            toml::from_str("[db]\npath = \"/tmp/docsage.sqlite\"\n").expect("valid toml");
        ProviderRegistry::new(finalize(config).unwrap().llm)
    }

    #[test]
    fn test_default_selection_is_configured_default() {
        let registry = registry();
        assert_eq!(registry.active_selection(), ("ollama".to_string(), None));
        assert_eq!(registry.active().unwrap().name(), "ollama");
    }

    #[test]
    fn test_unknown_provider_rejected_and_selection_unchanged() {
        let registry = registry();
        let err = registry.switch("skynet", None).unwrap_err();
        match err {
            Error::UnknownProvider { requested, known } => {
                assert_eq!(requested, "skynet");
                assert!(known.contains(&"ollama".to_string()));
                assert!(known.windows(2).all(|w| w[0] <= w[1]));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.active_selection(), ("ollama".to_string(), None));
    }

    #[test]
    fn test_same_selection_reuses_cached_adapter() {
        let registry = registry();
        let first = registry.switch("lm_studio", Some("local-model")).unwrap();
        let second = registry.switch("lm_studio", Some("local-model")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_model_override_is_a_distinct_instance() {
        let registry = registry();
        let base = registry.switch("lm_studio", None).unwrap();
        let pinned = registry.switch("lm_studio", Some("other-model")).unwrap();
        assert!(!Arc::ptr_eq(&base, &pinned));
        assert_eq!(pinned.model(), "other-model");
    }

    #[test]
    fn test_switch_keeps_existing_handles_valid() {
        let registry = registry();
        let before = registry.active().unwrap();
        registry.switch("localai", None).unwrap();
        // The old Arc still works even though the selection moved on.
        assert_eq!(before.name(), "ollama");
        assert_eq!(registry.active().unwrap().name(), "localai");
    }

    #[test]
    fn test_misconfigured_switch_leaves_active_unchanged() {
        // openai with no api key fails eager construction (or resolves
        // to an unavailable stub when compiled out, which succeeds).
        let registry = registry();
        let result = registry.switch("openai", None);
        if result.is_err() {
            assert_eq!(registry.active_selection(), ("ollama".to_string(), None));
        }
    }

    #[test]
    fn test_list_marks_active_and_api_keys() {
        let registry = registry();
        registry.switch("lm_studio", None).unwrap();
        let statuses = registry.list();
        let active: Vec<&str> = statuses
            .iter()
            .filter(|s| s.active)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(active, vec!["lm_studio"]);
        assert!(statuses.iter().all(|s| !s.has_api_key));
    }
}
