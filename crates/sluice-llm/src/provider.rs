// Provider variant classification from the configured base URL

use serde::{Deserialize, Serialize};
use url::Url;

const AZURE_OPENAI_SUFFIX: &str = ".openai.azure.com";
const AZURE_COGNITIVE_SUFFIX: &str = ".cognitiveservices.azure.com";

/// Backend flavor behind an OpenAI-compatible endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderVariant {
    #[default]
    Standard,
    #[serde(rename = "azure_openai")]
    AzureOpenAI,
    AzureCognitiveServices,
}

impl ProviderVariant {
    /// Both Azure flavors share auth and token-limit handling.
    pub fn is_azure(self) -> bool {
        matches!(self, Self::AzureOpenAI | Self::AzureCognitiveServices)
    }

    /// Whether the modern `max_completion_tokens` field is mandatory
    /// regardless of model capability.
    pub fn requires_completion_tokens_field(self) -> bool {
        self.is_azure()
    }
}

/// Classify a base URL. Never fails: anything unrecognized is `Standard`.
pub fn classify(base_url: &str) -> ProviderVariant {
    let Some(host) = host_of(base_url) else {
        return ProviderVariant::Standard;
    };

    if host.ends_with(AZURE_OPENAI_SUFFIX) {
        ProviderVariant::AzureOpenAI
    } else if host.ends_with(AZURE_COGNITIVE_SUFFIX) {
        ProviderVariant::AzureCognitiveServices
    } else {
        ProviderVariant::Standard
    }
}

fn host_of(base_url: &str) -> Option<String> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Bare hosts like "foo.openai.azure.com/openai" parse without a scheme
    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{}", trimmed)).ok())?;

    // `url` already lowercases domain hosts, this covers IP-literal edge cases too
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}
