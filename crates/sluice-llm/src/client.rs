// OpenAI-compatible chat-completions client (Standard and Azure endpoints)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::adapter::{convert_messages, convert_tools, WireToolCall};
use crate::buffer_utils::sse_frames;
use crate::config::ProviderClientOptions;
use crate::error::{LlmError, Result, StreamError};
use crate::model::ModelDescriptor;
use crate::params::{self, ChatCompletionRequest};
use crate::streaming::{
    error_message, pump_events, send_terminal, ChatResponse, FinishReason, StreamEvent, Usage,
};
use crate::traits::{ChatClient, EventReceiver};
use crate::types::{Message, Tool, ToolCall};

const AZURE_DEPLOYMENTS_PATH: &str = "/openai/deployments/";

/// Chat-completions client. Cheap to clone; clones share the transport and
/// the read-only options, so concurrent calls need no locking.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http_client: reqwest::Client,
    options: Arc<ProviderClientOptions>,
}

impl OpenAIClient {
    /// Create a client with its own transport, authenticated for the
    /// provider variant of the configured base URL.
    pub fn new(options: ProviderClientOptions) -> Result<Self> {
        let headers = default_headers(&options)?;

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self::with_http_client(http_client, options))
    }

    /// Use a transport that is already configured with credentials
    pub fn with_http_client(http_client: reqwest::Client, options: ProviderClientOptions) -> Self {
        Self {
            http_client,
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &ProviderClientOptions {
        &self.options
    }

    /// Shape the request for the current provider variant and model.
    pub fn prepared_params(
        &self,
        model: &ModelDescriptor,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ChatCompletionRequest> {
        let system = Some(self.options.system_message.as_str());
        let converted = convert_messages(system, messages);
        if !converted.notes.is_empty() {
            tracing::debug!(dropped_parts = converted.notes.len(), "message conversion dropped parts");
        }

        params::build(
            self.options.variant(),
            model,
            converted.messages,
            convert_tools(tools),
            &self.options.overrides(),
        )
    }

    /// Full chat-completions URL. Azure bases without a deployment path get
    /// `/openai/deployments/{model}` and the configured `api-version`.
    pub fn chat_completions_url(&self, model_id: &str) -> String {
        let variant = self.options.variant();
        let (path, query) = match self.options.base_url.split_once('?') {
            Some((path, query)) => (path.trim_end_matches('/'), Some(query)),
            None => (self.options.base_url.trim_end_matches('/'), None),
        };

        let mut url = if path.ends_with("/chat/completions") {
            path.to_string()
        } else if variant.is_azure() && !path.contains(AZURE_DEPLOYMENTS_PATH) {
            format!("{}{}{}/chat/completions", path, AZURE_DEPLOYMENTS_PATH, model_id)
        } else {
            format!("{}/chat/completions", path)
        };

        let mut params: Vec<String> = query
            .filter(|q| !q.is_empty())
            .map(|q| vec![q.to_string()])
            .unwrap_or_default();
        if variant.is_azure() {
            if let Some(version) = &self.options.api_version {
                if !params.iter().any(|q| q.contains("api-version=")) {
                    params.push(format!("api-version={}", version));
                }
            }
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        url
    }
}

fn default_headers(options: &ProviderClientOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if !options.api_key.is_empty() {
        if options.variant().is_azure() {
            headers.insert(
                "api-key",
                HeaderValue::from_str(&options.api_key)
                    .map_err(|_| LlmError::InvalidConfig("Invalid API key format".to_string()))?,
            );
        } else {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", options.api_key))
                    .map_err(|_| LlmError::InvalidConfig("Invalid API key format".to_string()))?,
            );
        }
    }

    for (name, value) in &options.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| LlmError::InvalidConfig(format!("Invalid header name: {}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| LlmError::InvalidConfig(format!("Invalid value for header {}", name.as_str())))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Status and message of a non-2xx response
async fn read_api_error(response: reqwest::Response) -> (u16, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").map(error_message))
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    (status.as_u16(), message)
}

/// Missing content type is tolerated; some compatible servers omit it.
fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.to_ascii_lowercase().contains("text/event-stream"))
}

/// Producer task body: issue the request, then decode the body into events.
async fn produce(request: reqwest::RequestBuilder, tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) {
    let sent = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StreamError::cancelled()),
        result = request.send() => result.map_err(|e| StreamError::transport(e.to_string())),
    };

    let response = match sent {
        Ok(response) if response.status().is_success() && is_event_stream(&response) => response,
        Ok(response) => {
            // Non-2xx, or a 200 carrying a plain JSON body instead of SSE
            let error = tokio::select! {
                biased;
                _ = cancel.cancelled() => StreamError::cancelled(),
                (status, message) = read_api_error(response) => {
                    tracing::warn!(status, "chat completion request rejected: {}", message);
                    StreamError::upstream(Some(status), message)
                }
            };
            send_terminal(&tx, &cancel, StreamEvent::Error { error }).await;
            return;
        }
        Err(error) => {
            send_terminal(&tx, &cancel, StreamEvent::Error { error }).await;
            return;
        }
    };

    pump_events(sse_frames(response.bytes_stream()), tx, cancel).await;
}

// ============================================================================
// TRAIT IMPLEMENTATION
// ============================================================================

#[async_trait]
impl ChatClient for OpenAIClient {
    async fn send(&self, messages: &[Message], tools: &[Tool]) -> Result<ChatResponse> {
        let model = self.options.selected_model();
        let payload = self.prepared_params(&model, messages, tools)?;

        let response = self
            .http_client
            .post(self.chat_completions_url(&model.id))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = read_api_error(response).await;
            return Err(LlmError::Api { status, message });
        }

        let body = response.bytes().await?;
        let raw: ChatCompletionResponse = serde_json::from_slice(&body)?;

        if let Some(error) = &raw.error {
            return Err(LlmError::Api {
                status: 200,
                message: error_message(error),
            });
        }

        let choice = raw
            .choices
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let finish_reason = if tool_calls.is_empty() {
            FinishReason::from_wire(choice.finish_reason.as_deref())
        } else {
            FinishReason::ToolUse
        };

        Ok(ChatResponse {
            id: raw.id,
            model: raw.model,
            created: (raw.created > 0)
                .then(|| chrono::DateTime::<chrono::Utc>::from_timestamp(raw.created, 0))
                .flatten(),
            content: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning_content.unwrap_or_default(),
            tool_calls,
            usage: raw.usage.map(Into::into),
            finish_reason,
        })
    }

    fn stream(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<EventReceiver> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            LlmError::InvalidConfig("stream must be called within a Tokio runtime".to_string())
        })?;
        let model = self.options.selected_model();
        let payload = self.prepared_params(&model, messages, tools)?.streaming();
        let url = self.chat_completions_url(&model.id);

        let request = self
            .http_client
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(&payload);

        let (tx, rx) = mpsc::channel(self.options.channel_capacity.max(1));
        let span = tracing::debug_span!("chat_stream", model = %model.id, variant = ?self.options.variant());
        runtime.spawn(produce(request, tx, cancel).instrument(span));

        Ok(rx)
    }
}

// ============================================================================
// NON-STREAMING RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Option<Vec<Choice>>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}
