// Provider-aware shaping of the outbound chat-completions request

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adapter::{WireMessage, WireTool};
use crate::error::{LlmError, Result};
use crate::model::ModelDescriptor;
use crate::provider::ProviderVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

/// Which token-limit field a request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLimit {
    /// Legacy `max_tokens`
    MaxTokens(u32),
    /// Modern `max_completion_tokens`
    MaxCompletionTokens(u32),
}

impl TokenLimit {
    /// Token-limit policy: Azure always takes the modern field, standard
    /// endpoints only for reasoning-capable models.
    pub fn select(variant: ProviderVariant, can_reason: bool, budget: u32) -> Self {
        if variant.requires_completion_tokens_field() || can_reason {
            Self::MaxCompletionTokens(budget)
        } else {
            Self::MaxTokens(budget)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

/// Chat-completions request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,

    /// Provider-specific extras merged into the top-level object
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    pub fn token_limit(&self) -> Option<TokenLimit> {
        match (self.max_tokens, self.max_completion_tokens) {
            (Some(n), None) => Some(TokenLimit::MaxTokens(n)),
            (None, Some(n)) => Some(TokenLimit::MaxCompletionTokens(n)),
            _ => None,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = Some(true);
        self.stream_options = Some(StreamOptions { include_usage: true });
        self
    }
}

/// Per-call knobs taken from the client options
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    pub max_tokens: Option<u32>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub extra_body: Map<String, Value>,
}

/// Build the request for one call. Fails before any I/O when the model
/// descriptor cannot yield a positive token budget.
pub fn build(
    variant: ProviderVariant,
    model: &ModelDescriptor,
    messages: Vec<WireMessage>,
    tools: Vec<WireTool>,
    overrides: &RequestOverrides,
) -> Result<ChatCompletionRequest> {
    if model.id.trim().is_empty() {
        return Err(LlmError::InvalidModel("model id is empty".to_string()));
    }

    let budget = overrides
        .max_tokens
        .filter(|n| *n > 0)
        .unwrap_or(model.default_max_tokens);
    if budget == 0 {
        return Err(LlmError::InvalidModel(format!(
            "model {} has no default max tokens and no override was given",
            model.id
        )));
    }

    let (max_tokens, max_completion_tokens) = match TokenLimit::select(variant, model.can_reason, budget) {
        TokenLimit::MaxTokens(n) => (Some(n), None),
        TokenLimit::MaxCompletionTokens(n) => (None, Some(n)),
    };

    let reasoning_effort = model
        .can_reason
        .then(|| overrides.reasoning_effort.unwrap_or_default());

    tracing::debug!(
        model = %model.id,
        ?variant,
        ?max_tokens,
        ?max_completion_tokens,
        "prepared chat completion params"
    );

    Ok(ChatCompletionRequest {
        model: model.id.clone(),
        messages,
        tools,
        max_tokens,
        max_completion_tokens,
        reasoning_effort,
        stream: None,
        stream_options: None,
        extra: overrides.extra_body.clone(),
    })
}
