//! Which providers are available, and turning a selection into a backend.
//!
//! [`ProviderRegistry`] is a plain value built once per run, either from the
//! environment ([`ProviderRegistry::from_env`]) or by hand. There is no
//! global provider cache: a conversion asks the registry to construct the one
//! backend it selected, and owns it for the rest of the run.

use crate::config::ConversionConfig;
use crate::error::PdfweaveError;
use crate::pipeline::backend::{LlmBackend, VisionBackend};
use edgequake_llm::{LLMProvider, ProviderFactory};
use pdfweave_core::{select_provider_with, DocumentProfile, ProviderId, SelectionPolicy};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// The set of providers a run may choose from, with optional model overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRegistry {
    configured: BTreeSet<ProviderId>,
    models: BTreeMap<ProviderId, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every provider whose environment variable (API key, or `OLLAMA_HOST`)
    /// is set to a non-empty value.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let configured = ProviderId::all()
            .filter(|id| {
                lookup(id.capability().env_key).is_some_and(|v| !v.trim().is_empty())
            })
            .collect();
        Self {
            configured,
            models: BTreeMap::new(),
        }
    }

    pub fn with_provider(mut self, id: ProviderId) -> Self {
        self.configured.insert(id);
        self
    }

    /// Register `id` with a specific model.
    pub fn with_model(mut self, id: ProviderId, model: impl Into<String>) -> Self {
        self.configured.insert(id);
        self.models.insert(id, model.into());
        self
    }

    pub fn configured(&self) -> &BTreeSet<ProviderId> {
        &self.configured
    }

    pub fn is_empty(&self) -> bool {
        self.configured.is_empty()
    }

    /// The model used for `id`: the override if registered, else its default.
    pub fn model_for(&self, id: ProviderId) -> &str {
        self.models
            .get(&id)
            .map(String::as_str)
            .unwrap_or(id.capability().default_model)
    }

    pub fn select(&self, profile: &DocumentProfile, policy: &SelectionPolicy) -> Option<ProviderId> {
        select_provider_with(profile, &self.configured, policy)
    }

    /// Construct the backend for `id`.
    pub fn create_backend(
        &self,
        id: ProviderId,
        config: &ConversionConfig,
    ) -> Result<Arc<dyn VisionBackend>, PdfweaveError> {
        let model = self.model_for(id);
        let provider = create_vision_provider(id.capability().factory_name, model)?;
        Ok(Arc::new(
            LlmBackend::new(provider, format!("{id}/{model}"), config).with_provider_id(id),
        ))
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PdfweaveError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PdfweaveError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the backend for a document, from most-specific to least-specific:
///
/// 1. **Pre-built backend** (`config.backend`), used as-is.
/// 2. **Pre-built provider** (`config.provider`), wrapped in an [`LlmBackend`].
/// 3. **Named provider** (`config.provider_name` + optional `config.model`).
/// 4. **Explicit registry** (`config.registry`): selection over its providers.
/// 5. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 6. **Environment registry** ([`ProviderRegistry::from_env`]): selection
///    over every provider with an API key set.
///
/// Selection in 4 and 6 sees `profile`, with `config.sensitive_content`
/// forcing the sensitive flag on.
pub fn resolve_backend(
    config: &ConversionConfig,
    profile: &DocumentProfile,
) -> Result<Arc<dyn VisionBackend>, PdfweaveError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref provider) = config.provider {
        let label = config.model.clone().unwrap_or_else(|| "custom".to_string());
        return Ok(Arc::new(LlmBackend::new(Arc::clone(provider), label, config)));
    }

    if let Some(ref name) = config.provider_name {
        let known = name.parse::<ProviderId>().ok();
        let model = config
            .model
            .as_deref()
            .or(known.map(|id| id.capability().default_model))
            .unwrap_or("gpt-4.1-nano");
        let factory_name = known
            .map(|id| id.capability().factory_name)
            .unwrap_or(name.as_str());
        let provider = create_vision_provider(factory_name, model)?;
        let backend = LlmBackend::new(provider, format!("{factory_name}/{model}"), config);
        return Ok(Arc::new(match known {
            Some(id) => backend.with_provider_id(id),
            None => backend,
        }));
    }

    if let Some(ref registry) = config.registry {
        return select_from(registry, config, profile);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            let provider = create_vision_provider(&prov, &model)?;
            let backend = LlmBackend::new(provider, format!("{prov}/{model}"), config);
            return Ok(Arc::new(match prov.parse::<ProviderId>() {
                Ok(id) => backend.with_provider_id(id),
                Err(_) => backend,
            }));
        }
    }

    select_from(&ProviderRegistry::from_env(), config, profile)
}

fn select_from(
    registry: &ProviderRegistry,
    config: &ConversionConfig,
    profile: &DocumentProfile,
) -> Result<Arc<dyn VisionBackend>, PdfweaveError> {
    let id = select_id(registry, config, profile).ok_or(PdfweaveError::NoProviderConfigured)?;
    info!(
        "Selected provider {} for {} pages ({} configured)",
        id,
        profile.page_count,
        registry.configured().len()
    );
    registry.create_backend(id, config)
}

/// The provider selection alone, without constructing anything.
pub fn select_id(
    registry: &ProviderRegistry,
    config: &ConversionConfig,
    profile: &DocumentProfile,
) -> Option<ProviderId> {
    if config.sensitive_content && !profile.sensitive_content {
        debug!("Sensitive content forced by configuration");
        let forced = DocumentProfile {
            sensitive_content: true,
            ..profile.clone()
        };
        return registry.select(&forced, &config.selection);
    }
    registry.select(profile, &config.selection)
}
