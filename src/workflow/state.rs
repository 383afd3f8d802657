//! Conversation state carried through the workflow.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::llm::{ChatMessage, Role, ToolCall};

/// The original incoming item. Never modified after the conversation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Stable mailbox identifier (IMAP UID for the bundled connector).
    pub id: String,
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl SourceItem {
    pub fn recipients_line(&self) -> String {
        self.recipients.join(", ")
    }

    /// Markdown block shown to reviewers and embedded in instruction turns.
    pub fn to_markdown(&self) -> String {
        format!(
            "\n\n## Original Email\n\n\
             **Subject**: {}\n\
             **From**: {}\n\
             **To**: {}\n\
             **Id**: {}\n\n\
             {}\n\n---\n",
            self.subject,
            self.sender,
            self.recipients_line(),
            self.id,
            self.body
        )
    }
}

/// Triage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Respond,
    Notify,
    Ignore,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Respond => "respond",
            Self::Notify => "notify",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "respond" => Ok(Self::Respond),
            "notify" => Ok(Self::Notify),
            "ignore" => Ok(Self::Ignore),
            _ => Err(WorkflowError::InvalidClassification(s.to_string())),
        }
    }
}

/// Everything the workflow knows about one conversation.
///
/// `messages` is append-only. The one exception is
/// [`ConversationState::edit_pending_call`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: Uuid,
    pub source: SourceItem,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    classification: Option<Classification>,
}

impl ConversationState {
    pub fn new(source: SourceItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            messages: Vec::new(),
            classification: None,
        }
    }

    pub fn classification(&self) -> Option<Classification> {
        self.classification
    }

    /// Set the triage outcome. Fails if one is already recorded.
    pub fn set_classification(&mut self, value: Classification) -> Result<(), WorkflowError> {
        if self.classification.is_some() {
            return Err(WorkflowError::ClassificationAlreadySet(self.id));
        }
        self.classification = Some(value);
        Ok(())
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Number of tool invocations recorded across all assistant turns.
    pub fn tool_call_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.tool_calls.len())
            .sum()
    }

    /// The newest assistant turn, if any.
    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Tool invocations of the newest assistant turn.
    pub fn pending_calls(&self) -> &[ToolCall] {
        self.last_assistant()
            .map(|m| m.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    /// Replace the arguments of a pending invocation, keeping its id.
    ///
    /// Returns the arguments that were replaced.
    pub fn edit_pending_call(
        &mut self,
        call_id: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError> {
        let conversation_id = self.id;
        let call = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.tool_calls.iter_mut().find(|c| c.id == call_id))
            .ok_or(WorkflowError::NoPendingInvocation(conversation_id))?;
        Ok(std::mem::replace(&mut call.arguments, arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> SourceItem {
        SourceItem {
            id: id.to_string(),
            sender: "Alice <alice@example.com>".to_string(),
            recipients: vec!["me@example.com".to_string()],
            subject: "Budget vote".to_string(),
            body: "When is the vote?".to_string(),
            thread_id: None,
            received_at: None,
        }
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({"content": "original"}),
        }
    }

    #[test]
    fn classification_parses_case_insensitively() {
        assert_eq!(" Respond ".parse::<Classification>().unwrap(), Classification::Respond);
        assert_eq!("NOTIFY".parse::<Classification>().unwrap(), Classification::Notify);
        assert!(matches!(
            "maybe".parse::<Classification>(),
            Err(WorkflowError::InvalidClassification(label)) if label == "maybe"
        ));
    }

    #[test]
    fn classification_is_set_once() {
        let mut state = ConversationState::new(item("1"));
        state.set_classification(Classification::Notify).unwrap();
        let err = state.set_classification(Classification::Respond).unwrap_err();
        assert!(matches!(err, WorkflowError::ClassificationAlreadySet(id) if id == state.id));
        assert_eq!(state.classification(), Some(Classification::Notify));
    }

    #[test]
    fn counts_tool_calls_in_assistant_turns_only() {
        let mut state = ConversationState::new(item("1"));
        state.push(ChatMessage::user("hi"));
        state.push(ChatMessage::assistant_with_tool_calls(None, vec![call("a", "lookup")]));
        state.push(ChatMessage::tool_result("a", "lookup", "found"));
        state.push(ChatMessage::assistant_with_tool_calls(None, vec![call("b", "lookup")]));
        assert_eq!(state.tool_call_count(), 2);
        assert_eq!(state.pending_calls()[0].id, "b");
    }

    #[test]
    fn edit_keeps_correlation_id() {
        let mut state = ConversationState::new(item("1"));
        state.push(ChatMessage::assistant_with_tool_calls(None, vec![call("call_7", "send_email")]));
        let before = state
            .edit_pending_call("call_7", serde_json::json!({"content": "edited"}))
            .unwrap();
        assert_eq!(before["content"], "original");
        let pending = &state.pending_calls()[0];
        assert_eq!(pending.id, "call_7");
        assert_eq!(pending.arguments["content"], "edited");
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn edit_without_pending_call_fails() {
        let mut state = ConversationState::new(item("1"));
        state.push(ChatMessage::assistant("no tools"));
        assert!(matches!(
            state.edit_pending_call("x", serde_json::json!({})),
            Err(WorkflowError::NoPendingInvocation(_))
        ));
    }

    #[test]
    fn markdown_includes_headers_and_body() {
        let md = item("42").to_markdown();
        assert!(md.contains("**Subject**: Budget vote"));
        assert!(md.contains("**Id**: 42"));
        assert!(md.contains("When is the vote?"));
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = ConversationState::new(item("1"));
        state.set_classification(Classification::Respond).unwrap();
        state.push(ChatMessage::user("Respond"));
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.classification(), Some(Classification::Respond));
    }
}
