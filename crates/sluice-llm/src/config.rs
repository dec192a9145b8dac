// Client configuration: resolved once per client, read-only afterwards

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{LlmError, Result};
use crate::model::{ModelDescriptor, ModelSelector, ModelType};
use crate::params::{ReasoningEffort, RequestOverrides};
use crate::provider::{classify, ProviderVariant};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Everything a client needs besides the transport
#[derive(Debug, Clone)]
pub struct ProviderClientOptions {
    pub base_url: String,
    pub api_key: String,
    pub system_message: String,
    pub model: ModelSelector,
    pub model_type: ModelType,
    /// Overrides the model's default token budget when set
    pub max_tokens: Option<u32>,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Azure `api-version` query parameter
    pub api_version: Option<String>,
    pub extra_headers: BTreeMap<String, String>,
    pub extra_body: Map<String, Value>,
    /// Events buffered before the producer blocks
    pub channel_capacity: usize,
}

impl ProviderClientOptions {
    pub fn builder() -> ProviderClientOptionsBuilder {
        ProviderClientOptionsBuilder::default()
    }

    /// Recomputed on every call; never cached
    pub fn variant(&self) -> ProviderVariant {
        classify(&self.base_url)
    }

    pub fn selected_model(&self) -> ModelDescriptor {
        self.model.select(self.model_type)
    }

    pub(crate) fn overrides(&self) -> RequestOverrides {
        RequestOverrides {
            max_tokens: self.max_tokens,
            reasoning_effort: self.reasoning_effort,
            extra_body: self.extra_body.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProviderClientOptionsBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    system_message: Option<String>,
    model: Option<ModelSelector>,
    model_type: ModelType,
    max_tokens: Option<u32>,
    reasoning_effort: Option<ReasoningEffort>,
    api_version: Option<String>,
    extra_headers: BTreeMap<String, String>,
    extra_body: Map<String, Value>,
    channel_capacity: Option<usize>,
}

impl ProviderClientOptionsBuilder {
    /// Endpoint base, e.g. "https://api.openai.com/v1" or
    /// "https://my-resource.openai.azure.com"
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn model(mut self, selector: ModelSelector) -> Self {
        self.model = Some(selector);
        self
    }

    pub fn model_fn<F>(self, f: F) -> Self
    where
        F: Fn(ModelType) -> ModelDescriptor + Send + Sync + 'static,
    {
        self.model(ModelSelector::new(f))
    }

    pub fn model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn extra_body(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_body.insert(key.into(), value);
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<ProviderClientOptions> {
        let model = self
            .model
            .ok_or_else(|| LlmError::InvalidConfig("Model selector is required".to_string()))?;

        let channel_capacity = self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        if channel_capacity == 0 {
            return Err(LlmError::InvalidConfig(
                "Channel capacity must be positive".to_string(),
            ));
        }

        let base_url = self
            .base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| OPENAI_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let api_version = self.api_version.filter(|v| !v.trim().is_empty());
        if classify(&base_url).is_azure() && api_version.is_none() && !base_url.contains("api-version=") {
            return Err(LlmError::InvalidConfig(
                "API version is required for Azure endpoints".to_string(),
            ));
        }

        Ok(ProviderClientOptions {
            base_url,
            api_key: self.api_key.unwrap_or_default(),
            system_message: self.system_message.unwrap_or_default(),
            model,
            model_type: self.model_type,
            max_tokens: self.max_tokens,
            reasoning_effort: self.reasoning_effort,
            api_version,
            extra_headers: self.extra_headers,
            extra_body: self.extra_body,
            channel_capacity,
        })
    }
}

/// Serializable settings, e.g. loaded from a config file or the environment.
/// The model selector is supplied separately by the model catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub system_message: String,
    #[serde(default)]
    pub model_type: ModelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_body: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,
}

impl ProviderSettings {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_API_VERSION` and
    /// `SLUICE_SYSTEM_MESSAGE`
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            base_url: var("OPENAI_BASE_URL"),
            api_key: var("OPENAI_API_KEY").unwrap_or_default(),
            system_message: var("SLUICE_SYSTEM_MESSAGE").unwrap_or_default(),
            api_version: var("OPENAI_API_VERSION"),
            ..Self::default()
        }
    }

    pub fn into_options(self, model: ModelSelector) -> Result<ProviderClientOptions> {
        let mut builder = ProviderClientOptions::builder()
            .api_key(self.api_key)
            .system_message(self.system_message)
            .model(model)
            .model_type(self.model_type);

        if let Some(base_url) = self.base_url {
            builder = builder.base_url(base_url);
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(effort) = self.reasoning_effort {
            builder = builder.reasoning_effort(effort);
        }
        if let Some(api_version) = self.api_version {
            builder = builder.api_version(api_version);
        }
        if let Some(capacity) = self.channel_capacity {
            builder = builder.channel_capacity(capacity);
        }
        for (name, value) in self.extra_headers {
            builder = builder.header(name, value);
        }
        for (key, value) in self.extra_body {
            builder = builder.extra_body(key, value);
        }

        builder.build()
    }
}
