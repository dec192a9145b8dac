use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::types::ToolCall;

/// SSE sentinel closing a chat-completions stream
pub const DONE_MARKER: &str = "[DONE]";

// ============================================================================
// EVENTS
// ============================================================================

/// Event delivered to the consumer of a streaming call.
///
/// Zero or more deltas are followed by exactly one terminal event
/// (`Complete` or `Error`), after which the channel closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ContentDelta {
        content: String,
    },

    ReasoningDelta {
        content: String,
    },

    /// Fragment of a tool call; fragments sharing an index belong together
    ToolCallDelta {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    Complete {
        response: ChatResponse,
    },

    Error {
        error: StreamError,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    ContentFilter,
    #[default]
    Unknown,
}

impl FinishReason {
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => Self::EndTurn,
            Some("length") => Self::MaxTokens,
            Some("tool_calls") | Some("function_call") => Self::ToolUse,
            Some("content_filter") => Self::ContentFilter,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

/// Aggregated result of a call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub reasoning: String,
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub finish_reason: FinishReason,
}

// ============================================================================
// WIRE CHUNKS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    /// May be empty, or even null, on otherwise successful responses
    #[serde(default)]
    pub choices: Option<Vec<StreamChoice>>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "reasoning")]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub tool_type: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: Option<u32>,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            reasoning_tokens: usage.completion_tokens_details.and_then(|d| d.reasoning_tokens),
        }
    }
}

/// Human-readable message out of an `error` payload (object or bare string)
pub(crate) fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

// ============================================================================
// DECODER STATE MACHINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Streaming,
    Complete,
    Failed,
}

/// Outcome of feeding the decoder one input
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Streaming -> Streaming, with the deltas decoded from the frame
    Deltas(Vec<StreamEvent>),
    /// Streaming -> Streaming on a frame whose `choices` is empty; nothing is emitted
    EmptyChoices,
    /// Streaming -> Complete
    Complete(ChatResponse),
    /// Streaming -> Failed
    Failed(StreamError),
    /// Input after a terminal transition; ignored
    Closed,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Turns SSE frame payloads into transitions, accumulating the final response.
#[derive(Debug)]
pub struct StreamDecoder {
    state: DecoderState,
    response: ChatResponse,
    finish_reason: Option<String>,
    tool_calls: BTreeMap<u32, PartialToolCall>,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Streaming,
            response: ChatResponse::default(),
            finish_reason: None,
            tool_calls: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn decode_frame(&mut self, data: &str) -> Transition {
        if self.state != DecoderState::Streaming {
            return Transition::Closed;
        }

        let data = data.trim();
        if data == DONE_MARKER {
            return self.finish();
        }

        let chunk: ChatStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                return self.fail(StreamError::malformed(format!(
                    "Failed to parse chat chunk: {}",
                    e
                )))
            }
        };

        if let Some(error) = &chunk.error {
            return self.fail(StreamError::upstream(None, error_message(error)));
        }

        self.record_metadata(&chunk);

        let choice = match chunk.choices.as_deref().and_then(<[StreamChoice]>::first) {
            Some(choice) => choice,
            None => return Transition::EmptyChoices,
        };

        Transition::Deltas(self.apply_choice(choice))
    }

    /// Clean end of the body (or `[DONE]`)
    pub fn finish(&mut self) -> Transition {
        if self.state != DecoderState::Streaming {
            return Transition::Closed;
        }
        self.state = DecoderState::Complete;

        let mut response = std::mem::take(&mut self.response);
        response.tool_calls = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|tc| ToolCall::new(tc.id, tc.name, tc.arguments))
            .collect();
        response.finish_reason = if response.tool_calls.is_empty() {
            FinishReason::from_wire(self.finish_reason.as_deref())
        } else {
            FinishReason::ToolUse
        };

        Transition::Complete(response)
    }

    pub fn fail(&mut self, error: StreamError) -> Transition {
        if self.state != DecoderState::Streaming {
            return Transition::Closed;
        }
        self.state = DecoderState::Failed;
        Transition::Failed(error)
    }

    fn record_metadata(&mut self, chunk: &ChatStreamChunk) {
        if self.response.id.is_empty() && !chunk.id.is_empty() {
            self.response.id = chunk.id.clone();
        }
        if self.response.model.is_empty() && !chunk.model.is_empty() {
            self.response.model = chunk.model.clone();
        }
        if self.response.created.is_none() && chunk.created > 0 {
            self.response.created = DateTime::<Utc>::from_timestamp(chunk.created, 0);
        }
        // include_usage delivers token counts on a final empty-choices chunk
        if let Some(usage) = &chunk.usage {
            self.response.usage = Some(usage.clone().into());
        }
    }

    fn apply_choice(&mut self, choice: &StreamChoice) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let delta = &choice.delta;

        if let Some(reasoning) = delta.reasoning_content.as_deref().filter(|s| !s.is_empty()) {
            self.response.reasoning.push_str(reasoning);
            events.push(StreamEvent::ReasoningDelta {
                content: reasoning.to_string(),
            });
        }

        if let Some(content) = delta.content.as_deref().filter(|s| !s.is_empty()) {
            self.response.content.push_str(content);
            events.push(StreamEvent::ContentDelta {
                content: content.to_string(),
            });
        }

        for tc in delta.tool_calls.iter().flatten() {
            let name = tc.function.as_ref().and_then(|f| f.name.clone());
            let arguments = tc.function.as_ref().and_then(|f| f.arguments.clone());

            let partial = self.tool_calls.entry(tc.index).or_default();
            if let Some(id) = &tc.id {
                partial.id = id.clone();
            }
            if let Some(name) = &name {
                partial.name.push_str(name);
            }
            if let Some(arguments) = &arguments {
                partial.arguments.push_str(arguments);
            }

            events.push(StreamEvent::ToolCallDelta {
                index: tc.index,
                id: tc.id.clone(),
                name,
                arguments,
            });
        }

        if let Some(reason) = &choice.finish_reason {
            self.finish_reason = Some(reason.clone());
        }

        events
    }
}

// ============================================================================
// PRODUCER
// ============================================================================

/// Drive the decoder over a frame stream, sending events to `tx` until a
/// terminal event has been sent, the token fires, or the receiver is gone.
/// `tx` is dropped on return, which closes the channel on every path.
pub async fn pump_events<F>(frames: F, tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken)
where
    F: Stream<Item = Result<String, StreamError>>,
{
    let mut frames = std::pin::pin!(frames);
    let mut decoder = StreamDecoder::new();
    let mut empty_frames = 0usize;

    loop {
        let transition = tokio::select! {
            biased;
            _ = cancel.cancelled() => decoder.fail(StreamError::cancelled()),
            next = frames.next() => match next {
                Some(Ok(frame)) => decoder.decode_frame(&frame),
                Some(Err(error)) => decoder.fail(error),
                None => decoder.finish(),
            },
        };

        match transition {
            Transition::Deltas(events) => {
                for event in events {
                    if !send_delta(&tx, &cancel, event).await {
                        if cancel.is_cancelled() {
                            tracing::debug!("stream cancelled while delivering deltas");
                            let _ = tx.try_send(StreamEvent::Error {
                                error: StreamError::cancelled(),
                            });
                        }
                        return;
                    }
                }
            }
            Transition::EmptyChoices => {
                empty_frames += 1;
                tracing::debug!(empty_frames, "skipping chunk with empty choices");
            }
            Transition::Complete(response) => {
                tracing::info!(
                    model = %response.model,
                    finish_reason = ?response.finish_reason,
                    tool_calls = response.tool_calls.len(),
                    "stream complete"
                );
                send_terminal(&tx, &cancel, StreamEvent::Complete { response }).await;
                return;
            }
            Transition::Failed(error) => {
                if error.is_cancelled() {
                    tracing::debug!("stream cancelled");
                } else {
                    tracing::warn!(kind = ?error.kind, status = ?error.status, "stream failed: {}", error.message);
                }
                send_terminal(&tx, &cancel, StreamEvent::Error { error }).await;
                return;
            }
            Transition::Closed => return,
        }
    }
}

/// Deliver the one terminal event. Waits for capacity only while the token is
/// live; once it fires the cancellation error is offered without blocking.
pub(crate) async fn send_terminal(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) {
    if cancel.is_cancelled() {
        let _ = tx.try_send(event);
        return;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = tx.try_send(StreamEvent::Error {
                error: StreamError::cancelled(),
            });
        }
        _ = tx.send(event) => {}
    }
}

/// Blocks while the buffer is full; gives up on cancellation or a dropped receiver.
async fn send_delta(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::time::Duration;

    fn frame(json: &str) -> Result<String, StreamError> {
        Ok(json.to_string())
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_empty_choices_is_named_transition() {
        let mut decoder = StreamDecoder::new();
        let t = decoder.decode_frame(
            r#"{"id":"chat-completion-test","object":"chat.completion.chunk","created":1700000000,"model":"test-model","choices":[]}"#,
        );
        assert_eq!(t, Transition::EmptyChoices);
        assert_eq!(decoder.state(), DecoderState::Streaming);

        assert_eq!(decoder.decode_frame(r#"{"choices":null}"#), Transition::EmptyChoices);
        assert_eq!(decoder.decode_frame(r#"{}"#), Transition::EmptyChoices);
    }

    #[test]
    fn test_done_after_empty_choices_completes() {
        let mut decoder = StreamDecoder::new();
        decoder.decode_frame(r#"{"id":"x","model":"m","choices":[]}"#);

        match decoder.decode_frame("[DONE]") {
            Transition::Complete(response) => {
                assert_eq!(response.id, "x");
                assert!(response.content.is_empty());
                assert_eq!(response.finish_reason, FinishReason::Unknown);
            }
            other => panic!("Expected Complete, got {:?}", other),
        }
        assert_eq!(decoder.decode_frame("[DONE]"), Transition::Closed);
    }

    #[test]
    fn test_usage_from_empty_choices_chunk_is_kept() {
        let mut decoder = StreamDecoder::new();
        decoder.decode_frame(r#"{"choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":"stop"}]}"#);
        let t = decoder.decode_frame(
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        );
        assert_eq!(t, Transition::EmptyChoices);

        match decoder.finish() {
            Transition::Complete(response) => {
                assert_eq!(response.content, "hi");
                assert_eq!(response.finish_reason, FinishReason::EndTurn);
                assert_eq!(response.usage.unwrap().total_tokens, 4);
            }
            other => panic!("Expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_and_missing_delta() {
        let mut decoder = StreamDecoder::new();
        match decoder.decode_frame("{not json") {
            Transition::Failed(e) => assert_eq!(e.kind, crate::StreamErrorKind::MalformedPayload),
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert_eq!(decoder.state(), DecoderState::Failed);

        let mut decoder = StreamDecoder::new();
        match decoder.decode_frame(r#"{"choices":[{"index":0}]}"#) {
            Transition::Failed(e) => assert_eq!(e.kind, crate::StreamErrorKind::MalformedPayload),
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_upstream_error_payload() {
        let mut decoder = StreamDecoder::new();
        match decoder.decode_frame(r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#) {
            Transition::Failed(e) => {
                assert_eq!(e.kind, crate::StreamErrorKind::Upstream);
                assert_eq!(e.message, "quota exceeded");
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_call_fragments_assemble() {
        let mut decoder = StreamDecoder::new();
        decoder.decode_frame(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"get_weather","arguments":""}}]}}]}"#,
        );
        decoder.decode_frame(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":"}}]}}]}"#,
        );
        decoder.decode_frame(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"NYC\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        );

        match decoder.finish() {
            Transition::Complete(response) => {
                assert_eq!(response.finish_reason, FinishReason::ToolUse);
                assert_eq!(response.tool_calls.len(), 1);
                let call = &response.tool_calls[0];
                assert_eq!(call.id, "call_1");
                assert_eq!(call.name, "get_weather");
                assert_eq!(call.arguments, r#"{"city":"NYC"}"#);
            }
            other => panic!("Expected Complete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pump_empty_choices_then_done() {
        let frames = stream::iter(vec![frame(r#"{"choices":[]}"#), frame("[DONE]")]);
        let (tx, rx) = mpsc::channel(4);

        pump_events(frames, tx, CancellationToken::new()).await;
        let events = collect(rx).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn test_pump_preserves_order_with_small_buffer() {
        let frames = stream::iter(vec![
            frame(r#"{"choices":[{"index":0,"delta":{"content":"a"}}]}"#),
            frame(r#"{"choices":[{"index":0,"delta":{"content":"b"}}]}"#),
            frame(r#"{"choices":[{"index":0,"delta":{"content":"c"}}]}"#),
            frame("[DONE]"),
        ]);
        let (tx, rx) = mpsc::channel(1);

        let producer = tokio::spawn(pump_events(frames, tx, CancellationToken::new()));
        let events = collect(rx).await;
        producer.await.unwrap();

        let text: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentDelta { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, vec!["a", "b", "c"]);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_pump_cancel_mid_stream() {
        let frames = stream::iter(vec![frame(r#"{"choices":[{"index":0,"delta":{"content":"a"}}]}"#)])
            .chain(stream::pending());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let producer = tokio::spawn(pump_events(frames, tx, cancel.clone()));

        assert!(matches!(rx.recv().await, Some(StreamEvent::ContentDelta { .. })));
        cancel.cancel();

        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
            Some(StreamEvent::Error { error }) => assert!(error.is_cancelled()),
            other => panic!("Expected cancellation error, got {:?}", other),
        }
        assert!(tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .is_none());
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_pump_ends_on_cancel_with_unread_full_buffer() {
        let frames = stream::iter(
            (0..10).map(|_| frame(r#"{"choices":[{"index":0,"delta":{"content":"x"}}]}"#)),
        )
        .chain(stream::pending());
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let producer = tokio::spawn(pump_events(frames, tx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), producer)
            .await
            .expect("producer kept running after cancellation")
            .unwrap();

        // Receiver was held the whole time; the channel is closed now
        assert!(matches!(rx.recv().await, Some(StreamEvent::ContentDelta { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_terminal_does_not_wait_for_capacity() {
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(StreamEvent::ContentDelta { content: "x".to_string() }).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(
            Duration::from_secs(1),
            send_terminal(&tx, &cancel, StreamEvent::Error { error: StreamError::cancelled() }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_pump_stops_when_receiver_dropped() {
        let frames = stream::iter(
            (0..100).map(|_| frame(r#"{"choices":[{"index":0,"delta":{"content":"x"}}]}"#)),
        )
        .chain(stream::pending());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        tokio::time::timeout(
            Duration::from_secs(1),
            pump_events(frames, tx, CancellationToken::new()),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_pump_transport_error_is_terminal() {
        let frames = stream::iter(vec![
            frame(r#"{"choices":[{"index":0,"delta":{"content":"a"}}]}"#),
            Err(StreamError::transport("connection reset")),
            frame("[DONE]"),
        ]);
        let (tx, rx) = mpsc::channel(4);

        pump_events(frames, tx, CancellationToken::new()).await;
        let events = collect(rx).await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            StreamEvent::Error { error } => assert!(error.is_transient()),
            other => panic!("Expected Error, got {:?}", other),
        }
    }
}
