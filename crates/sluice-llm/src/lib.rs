//! Streaming client for OpenAI-compatible chat-completions endpoints,
//! including Azure OpenAI and Azure Cognitive Services deployments.
//!
//! ```rust,ignore
//! let options = ProviderClientOptions::builder()
//!     .base_url("https://my-resource.openai.azure.com")
//!     .api_key(key)
//!     .api_version("2024-10-21")
//!     .model(ModelSelector::fixed(ModelDescriptor::new("gpt-4o", 4096)))
//!     .build()?;
//! let client = OpenAIClient::new(options)?;
//!
//! let mut events = client.stream(CancellationToken::new(), &[Message::user("Hi")], &[])?;
//! while let Some(event) = events.recv().await {
//!     // ContentDelta / ToolCallDelta ... then Complete or Error
//! }
//! ```

pub mod adapter;
pub mod buffer_utils;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod params;
pub mod provider;
pub mod streaming;
pub mod traits;
pub mod types;

pub use client::OpenAIClient;
pub use config::{ProviderClientOptions, ProviderSettings};
pub use error::{LlmError, Result, StreamError, StreamErrorKind};
pub use model::{ModelDescriptor, ModelSelector, ModelType};
pub use params::{ChatCompletionRequest, ReasoningEffort, TokenLimit};
pub use provider::{classify, ProviderVariant};
pub use streaming::{ChatResponse, FinishReason, StreamEvent, TokenUsage};
pub use traits::{ChatClient, EventReceiver};
pub use types::{ContentPart, Message, Role, Tool, ToolCall, ToolResult};

pub use tokio_util::sync::CancellationToken;
