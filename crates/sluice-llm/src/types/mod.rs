pub mod content;
pub mod message;
pub mod tool;

pub use content::ContentPart;
pub use message::{Message, Role};
pub use tool::{Tool, ToolCall, ToolResult};
