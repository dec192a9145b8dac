// Conversion of provider-agnostic messages and tools into chat-completions wire types

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{ContentPart, Message, Role, Tool, ToolCall};

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<WireContent>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: Role, text: String) -> Self {
        Self {
            role,
            content: Some(WireContent::Text(text)),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Text carried by this message, parts joined in order
    pub fn text_content(&self) -> Option<String> {
        match self.content.as_ref()? {
            WireContent::Text(s) => Some(s.clone()),
            WireContent::Parts(parts) => Some(
                parts
                    .iter()
                    .filter_map(|p| match p {
                        WirePart::Text { text } => Some(text.as_str()),
                        WirePart::ImageUrl { .. } => None,
                    })
                    .collect(),
            ),
        }
    }
}

/// Plain string, or an array of typed parts when images are attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: WireFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            tool_type: "function".to_string(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

// ============================================================================
// CONVERSION
// ============================================================================

/// Something dropped during conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionNote {
    /// Index into the caller's message list
    pub message_index: usize,
    pub part_kind: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConvertedMessages {
    pub messages: Vec<WireMessage>,
    pub notes: Vec<ConversionNote>,
}

struct Notes {
    index: usize,
    notes: Vec<ConversionNote>,
}

impl Notes {
    fn drop_part(&mut self, part: &ContentPart, role: Role) {
        self.record(part.kind(), format!("not supported on {} messages", role.as_str()));
    }

    fn record(&mut self, part_kind: &'static str, reason: impl Into<String>) {
        let note = ConversionNote {
            message_index: self.index,
            part_kind,
            reason: reason.into(),
        };
        tracing::debug!(
            message_index = note.message_index,
            part_kind = note.part_kind,
            "dropped content part: {}",
            note.reason
        );
        self.notes.push(note);
    }
}

/// Convert messages in order, prepending the system prompt when one is set.
pub fn convert_messages(system_message: Option<&str>, messages: &[Message]) -> ConvertedMessages {
    let mut out = Vec::with_capacity(messages.len() + 1);
    let mut notes = Notes {
        index: 0,
        notes: Vec::new(),
    };

    if let Some(system) = system_message.filter(|s| !s.is_empty()) {
        out.push(WireMessage::text(Role::System, system.to_string()));
    }

    for (index, message) in messages.iter().enumerate() {
        notes.index = index;
        match message.role {
            Role::System => convert_system(message, &mut out, &mut notes),
            Role::User => convert_user(message, &mut out, &mut notes),
            Role::Assistant => convert_assistant(message, &mut out, &mut notes),
            Role::Tool => convert_tool(message, &mut out, &mut notes),
        }
    }

    ConvertedMessages {
        messages: out,
        notes: notes.notes,
    }
}

fn convert_system(message: &Message, out: &mut Vec<WireMessage>, notes: &mut Notes) {
    let mut text = String::new();
    for part in &message.parts {
        match part {
            ContentPart::Text { text: t } => text.push_str(t),
            other => notes.drop_part(other, Role::System),
        }
    }
    out.push(WireMessage::text(Role::System, text));
}

fn convert_user(message: &Message, out: &mut Vec<WireMessage>, notes: &mut Notes) {
    let mut parts = Vec::with_capacity(message.parts.len());
    let mut has_image = false;

    for part in &message.parts {
        match part {
            ContentPart::Text { text } => parts.push(WirePart::Text { text: text.clone() }),
            ContentPart::ImageUrl { url, detail } => {
                has_image = true;
                parts.push(WirePart::ImageUrl {
                    image_url: WireImageUrl {
                        url: url.clone(),
                        detail: detail.clone(),
                    },
                });
            }
            ContentPart::Binary { mime_type, data, path } => {
                if mime_type.starts_with("image/") {
                    has_image = true;
                    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                    parts.push(WirePart::ImageUrl {
                        image_url: WireImageUrl {
                            url: format!("data:{};base64,{}", mime_type, encoded),
                            detail: None,
                        },
                    });
                } else {
                    notes.record(
                        part.kind(),
                        format!("attachment {} has unsupported type {}", path, mime_type),
                    );
                }
            }
            other => notes.drop_part(other, Role::User),
        }
    }

    let content = if has_image {
        WireContent::Parts(parts)
    } else {
        WireContent::Text(
            parts
                .into_iter()
                .filter_map(|p| match p {
                    WirePart::Text { text } => Some(text),
                    WirePart::ImageUrl { .. } => None,
                })
                .collect(),
        )
    };

    out.push(WireMessage {
        role: Role::User,
        content: Some(content),
        tool_calls: Vec::new(),
        tool_call_id: None,
    });
}

fn convert_assistant(message: &Message, out: &mut Vec<WireMessage>, notes: &mut Notes) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in &message.parts {
        match part {
            ContentPart::Text { text: t } => text.push_str(t),
            ContentPart::ToolCall(call) => tool_calls.push(WireToolCall::from(call)),
            other => notes.drop_part(other, Role::Assistant),
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        notes.record("message", "assistant message has no text or tool calls");
        return;
    }

    out.push(WireMessage {
        role: Role::Assistant,
        content: (!text.is_empty()).then_some(WireContent::Text(text)),
        tool_calls,
        tool_call_id: None,
    });
}

fn convert_tool(message: &Message, out: &mut Vec<WireMessage>, notes: &mut Notes) {
    for part in &message.parts {
        match part {
            ContentPart::ToolResult(result) => out.push(WireMessage {
                role: Role::Tool,
                content: Some(WireContent::Text(result.content.clone())),
                tool_calls: Vec::new(),
                tool_call_id: Some(result.tool_call_id.clone()),
            }),
            other => notes.drop_part(other, Role::Tool),
        }
    }
}

/// Convert tool declarations to function tools.
pub fn convert_tools(tools: &[Tool]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|tool| WireTool {
            tool_type: "function".to_string(),
            function: WireFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool_schema(tool),
            },
        })
        .collect()
}

fn tool_schema(tool: &Tool) -> Value {
    let mut schema = match &tool.parameters {
        Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("object") => obj.clone(),
        Value::Object(props) => {
            let mut obj = Map::new();
            obj.insert("type".to_string(), Value::from("object"));
            obj.insert("properties".to_string(), Value::Object(props.clone()));
            obj
        }
        _ => {
            let mut obj = Map::new();
            obj.insert("type".to_string(), Value::from("object"));
            obj.insert("properties".to_string(), Value::Object(Map::new()));
            obj
        }
    };

    if !tool.required.is_empty() {
        schema.insert("required".to_string(), Value::from(tool.required.clone()));
    }

    Value::Object(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolResult;
    use serde_json::json;

    #[test]
    fn test_system_prompt_prepended() {
        let converted = convert_messages(Some("be brief"), &[Message::user("hi")]);
        assert_eq!(converted.messages.len(), 2);
        assert_eq!(converted.messages[0].role, Role::System);
        assert_eq!(converted.messages[0].text_content().as_deref(), Some("be brief"));
        assert_eq!(converted.messages[1].role, Role::User);
    }

    #[test]
    fn test_empty_system_prompt_skipped() {
        let converted = convert_messages(Some(""), &[Message::user("hi")]);
        assert_eq!(converted.messages.len(), 1);
    }

    #[test]
    fn test_user_text_parts_concatenated() {
        let msg = Message::new(Role::User, vec!["Hello, ".into(), "world".into()]);
        let converted = convert_messages(None, &[msg]);
        assert_eq!(
            converted.messages[0].content,
            Some(WireContent::Text("Hello, world".to_string()))
        );
    }

    #[test]
    fn test_binary_image_becomes_data_url() {
        let msg = Message::user("look").with_part(ContentPart::Binary {
            path: "cat.png".to_string(),
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        });
        let converted = convert_messages(None, &[msg]);

        match &converted.messages[0].content {
            Some(WireContent::Parts(parts)) => {
                assert_eq!(parts.len(), 2);
                match &parts[1] {
                    WirePart::ImageUrl { image_url } => {
                        assert_eq!(image_url.url, "data:image/png;base64,AQID");
                    }
                    other => panic!("Expected image part, got {:?}", other),
                }
            }
            other => panic!("Expected parts content, got {:?}", other),
        }
        assert!(converted.notes.is_empty());
    }

    #[test]
    fn test_unsupported_parts_dropped_with_note() {
        let msg = Message::new(
            Role::Assistant,
            vec![
                ContentPart::Reasoning {
                    thinking: "hmm".to_string(),
                },
                ContentPart::text("answer"),
                ContentPart::Finish {
                    reason: "stop".to_string(),
                },
            ],
        );
        let pdf = Message::user("read this").with_part(ContentPart::Binary {
            path: "doc.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            data: vec![0],
        });

        let converted = convert_messages(None, &[msg, pdf]);

        assert_eq!(converted.messages.len(), 2);
        assert_eq!(converted.messages[0].text_content().as_deref(), Some("answer"));
        assert_eq!(converted.messages[1].text_content().as_deref(), Some("read this"));

        let kinds: Vec<_> = converted
            .notes
            .iter()
            .map(|n| (n.message_index, n.part_kind))
            .collect();
        assert_eq!(kinds, vec![(0, "reasoning"), (0, "finish"), (1, "binary")]);
    }

    #[test]
    fn test_assistant_tool_calls_without_text() {
        let msg = Message::assistant_with_tools(vec![ToolCall::new("call_1", "ls", "{}")]);
        let converted = convert_messages(None, &[msg]);
        let wire = &converted.messages[0];

        assert!(wire.content.is_none());
        assert_eq!(wire.tool_calls.len(), 1);
        assert_eq!(wire.tool_calls[0].tool_type, "function");

        let json = serde_json::to_value(wire).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["tool_calls"][0]["function"]["name"], "ls");
    }

    #[test]
    fn test_empty_assistant_skipped() {
        let msg = Message::new(Role::Assistant, vec![]);
        let converted = convert_messages(None, &[msg, Message::user("next")]);
        assert_eq!(converted.messages.len(), 1);
        assert_eq!(converted.notes[0].message_index, 0);
    }

    #[test]
    fn test_tool_results_expand_to_messages() {
        let msg = Message::tool_results(vec![
            ToolResult::new("call_1", "a"),
            ToolResult::new("call_2", "b"),
        ]);
        let converted = convert_messages(None, &[msg]);

        assert_eq!(converted.messages.len(), 2);
        assert_eq!(converted.messages[1].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(converted.messages[1].role, Role::Tool);
    }

    #[test]
    fn test_convert_tools_wraps_properties() {
        let tool = Tool::new(
            "get_weather",
            "Weather lookup",
            json!({"city": {"type": "string"}}),
        )
        .with_required(vec!["city".to_string()]);

        let wire = convert_tools(&[tool]);
        let json = serde_json::to_value(&wire[0]).unwrap();

        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["parameters"]["type"], "object");
        assert_eq!(json["function"]["parameters"]["properties"]["city"]["type"], "string");
        assert_eq!(json["function"]["parameters"]["required"], json!(["city"]));
    }

    #[test]
    fn test_convert_tools_keeps_full_schema() {
        let schema = json!({"type": "object", "properties": {}});
        let wire = convert_tools(&[Tool::new("noop", "", schema.clone())]);
        assert_eq!(wire[0].function.parameters, schema);
    }
}
