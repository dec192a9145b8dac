use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::streaming::{ChatResponse, StreamEvent};
use crate::types::{Message, Tool};

pub type EventReceiver = mpsc::Receiver<StreamEvent>;

/// Chat-completion client seam used by the agent loop.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Non-streaming completion
    async fn send(&self, messages: &[Message], tools: &[Tool]) -> Result<ChatResponse>;

    /// Streaming completion.
    ///
    /// Returns immediately with the receiving end of the event channel; the
    /// request runs on a task spawned onto the current Tokio runtime. `Err`
    /// only for defects detected before any I/O, including a call made
    /// outside a runtime. Every stream ends with exactly one terminal
    /// event, then the channel closes.
    fn stream(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<EventReceiver>;
}
