//! Provider capability descriptors and the selection policy.
//!
//! Backends differ in ways that matter for conversion: some accept a whole
//! PDF natively (up to a page limit), some have enormous context windows,
//! and some refuse to reproduce copyrighted text. Those facts are fixed per
//! provider, so they live in a closed enum with one static descriptor per
//! variant rather than a runtime map keyed by name.
//!
//! [`select_provider`] is a total, deterministic function of the profile and
//! the configured set: the same inputs always pick the same backend.

use crate::model::DocumentProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// The backends this crate knows how to drive.
///
/// Declaration order is the default priority order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
    Mistral,
    Ollama,
}

/// Fallback order when no rule singles out a provider.
pub const DEFAULT_PRIORITY: [ProviderId; 5] = [
    ProviderId::OpenAi,
    ProviderId::Anthropic,
    ProviderId::Gemini,
    ProviderId::Mistral,
    ProviderId::Ollama,
];

/// Static limits of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderCapability {
    pub id: ProviderId,
    /// Accepts a PDF as a native document input.
    pub native_document: bool,
    /// Page limit for native document input.
    pub max_native_pages: Option<usize>,
    pub context_tokens: usize,
    /// Blocks output that recites copyrighted or sensitive material.
    pub content_filtering: bool,
    /// Images accepted in a single request; bounds the window size.
    pub max_images_per_request: usize,
    /// Name understood by `edgequake_llm::ProviderFactory`.
    pub factory_name: &'static str,
    pub default_model: &'static str,
    /// Environment variable whose presence marks the provider as configured.
    pub env_key: &'static str,
}

const OPENAI: ProviderCapability = ProviderCapability {
    id: ProviderId::OpenAi,
    native_document: true,
    max_native_pages: Some(100),
    context_tokens: 1_047_576,
    content_filtering: false,
    max_images_per_request: 50,
    factory_name: "openai",
    default_model: "gpt-4.1-nano",
    env_key: "OPENAI_API_KEY",
};

const ANTHROPIC: ProviderCapability = ProviderCapability {
    id: ProviderId::Anthropic,
    native_document: true,
    max_native_pages: Some(100),
    context_tokens: 200_000,
    content_filtering: false,
    max_images_per_request: 100,
    factory_name: "anthropic",
    default_model: "claude-sonnet-4-20250514",
    env_key: "ANTHROPIC_API_KEY",
};

const GEMINI: ProviderCapability = ProviderCapability {
    id: ProviderId::Gemini,
    native_document: true,
    max_native_pages: Some(1000),
    context_tokens: 1_048_576,
    content_filtering: true,
    max_images_per_request: 3000,
    factory_name: "gemini",
    default_model: "gemini-2.0-flash",
    env_key: "GEMINI_API_KEY",
};

const MISTRAL: ProviderCapability = ProviderCapability {
    id: ProviderId::Mistral,
    native_document: false,
    max_native_pages: None,
    context_tokens: 128_000,
    content_filtering: false,
    max_images_per_request: 8,
    factory_name: "mistral",
    default_model: "pixtral-12b-2409",
    env_key: "MISTRAL_API_KEY",
};

const OLLAMA: ProviderCapability = ProviderCapability {
    id: ProviderId::Ollama,
    native_document: false,
    max_native_pages: None,
    context_tokens: 32_768,
    content_filtering: false,
    max_images_per_request: 1,
    factory_name: "ollama",
    default_model: "llama3.2-vision",
    env_key: "OLLAMA_HOST",
};

impl ProviderId {
    pub fn capability(self) -> &'static ProviderCapability {
        match self {
            ProviderId::OpenAi => &OPENAI,
            ProviderId::Anthropic => &ANTHROPIC,
            ProviderId::Gemini => &GEMINI,
            ProviderId::Mistral => &MISTRAL,
            ProviderId::Ollama => &OLLAMA,
        }
    }

    pub fn all() -> impl Iterator<Item = ProviderId> {
        DEFAULT_PRIORITY.into_iter()
    }
}

impl ProviderCapability {
    /// Whether a document of `pages` pages fits this provider's native input.
    pub fn accepts_native(&self, pages: usize) -> bool {
        self.native_document && self.max_native_pages.is_some_and(|max| pages <= max)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.capability().factory_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider '{0}' (expected one of: openai, anthropic, gemini, mistral, ollama)")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "mistral" => Ok(ProviderId::Mistral),
            "ollama" => Ok(ProviderId::Ollama),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// Caller preferences that feed the selection rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Prefer a provider that can take the whole PDF natively when it fits.
    pub prefer_native: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            prefer_native: true,
        }
    }
}

/// Pick the backend for a document using [`SelectionPolicy::default`].
pub fn select_provider(
    profile: &DocumentProfile,
    configured: &BTreeSet<ProviderId>,
) -> Option<ProviderId> {
    select_provider_with(profile, configured, &SelectionPolicy::default())
}

/// Pick the backend for a document.
///
/// Rules, first match wins:
/// 1. nothing configured → `None`;
/// 2. a single provider → that one;
/// 3. sensitive content → narrow to providers without content filtering,
///    if any are configured;
/// 4. native input preferred and the page count fits a native provider's
///    limit → that provider;
/// 5. the page count exceeds every native provider's limit → the largest
///    context window;
/// 6. default priority order.
///
/// Ties inside a rule are broken by [`DEFAULT_PRIORITY`].
pub fn select_provider_with(
    profile: &DocumentProfile,
    configured: &BTreeSet<ProviderId>,
    policy: &SelectionPolicy,
) -> Option<ProviderId> {
    let mut pool: Vec<&'static ProviderCapability> = DEFAULT_PRIORITY
        .iter()
        .filter(|id| configured.contains(*id))
        .map(|id| id.capability())
        .collect();

    match pool.len() {
        0 => return None,
        1 => return Some(pool[0].id),
        _ => {}
    }

    if profile.is_sensitive() && pool.iter().any(|c| !c.content_filtering) {
        pool.retain(|c| !c.content_filtering);
        debug!("Sensitive content: restricted to unfiltered providers");
        if pool.len() == 1 {
            return Some(pool[0].id);
        }
    }

    let pages = profile.page_count;
    if policy.prefer_native {
        if let Some(native) = pool.iter().find(|c| c.accepts_native(pages)) {
            debug!("{} pages fit native input of {}", pages, native.id);
            return Some(native.id);
        }
    }

    let mut native = pool.iter().filter(|c| c.native_document).peekable();
    if native.peek().is_some() && native.all(|c| !c.accepts_native(pages)) {
        // max_by_key keeps the last maximum; iterate in reverse so ties go to
        // the higher-priority provider.
        let widest = pool.iter().rev().max_by_key(|c| c.context_tokens)?;
        debug!("{} pages exceed native limits; using {}", pages, widest.id);
        return Some(widest.id);
    }

    pool.first().map(|c| c.id)
}
