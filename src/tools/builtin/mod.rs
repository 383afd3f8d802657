//! Built-in tools: reply sending, completion, reviewer questions and
//! clarification requests.

pub mod clarification;
pub mod done;
pub mod question;
pub mod send_email;

use std::sync::Arc;

pub use clarification::ClarificationTool;
pub use done::DoneTool;
pub use question::QuestionTool;
pub use send_email::SendEmailTool;

use crate::channels::Mailbox;
use crate::tools::registry::ToolRegistry;
use crate::tools::tool::ToolKind;

pub const SEND_EMAIL_TOOL_NAME: &str = "send_email";
pub const DONE_TOOL_NAME: &str = "done";
pub const QUESTION_TOOL_NAME: &str = "question";
pub const CLARIFICATION_TOOL_NAME: &str = "clarification";

/// The closed set of built-in tools and the kind each must carry.
pub const BUILTIN_TOOLS: &[(&str, ToolKind)] = &[
    (SEND_EMAIL_TOOL_NAME, ToolKind::Send),
    (DONE_TOOL_NAME, ToolKind::Completion),
    (QUESTION_TOOL_NAME, ToolKind::Question),
    (CLARIFICATION_TOOL_NAME, ToolKind::Clarification),
];

/// Register every built-in tool.
pub fn register_builtin_tools(registry: &ToolRegistry, mailbox: Arc<dyn Mailbox>) {
    registry.register_sync(Arc::new(SendEmailTool::new(mailbox)));
    registry.register_sync(Arc::new(DoneTool));
    registry.register_sync(Arc::new(QuestionTool));
    registry.register_sync(Arc::new(ClarificationTool::new()));
}
