//! Scripted collaborators shared by the workflow unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::channels::{Mailbox, OutgoingReply};
use crate::config::WorkflowConfig;
use crate::error::{ChannelError, LlmError};
use crate::llm::{
    ChatMessage, ClassificationInput, Classifier, GenerationRequest, Generator, ToolCall,
};
use crate::memory::PreferenceMemory;
use crate::store::{Database, LibSqlBackend};
use crate::tools::builtin::register_builtin_tools;
use crate::tools::{Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::state::SourceItem;

pub fn source(id: &str) -> SourceItem {
    SourceItem {
        id: id.to_string(),
        sender: "alice@example.com".to_string(),
        recipients: vec!["me@example.com".to_string()],
        subject: "Committee agenda".to_string(),
        body: "What is on the agenda next week?".to_string(),
        thread_id: Some("<abc@example.com>".to_string()),
        received_at: None,
    }
}

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

pub fn tool_turn(id: &str, name: &str, arguments: serde_json::Value) -> ChatMessage {
    ChatMessage::assistant_with_tool_calls(None, vec![call(id, name, arguments)])
}

pub fn send_args(body: &str) -> serde_json::Value {
    serde_json::json!({
        "email_id": "test-1",
        "response_text": body,
        "email_address": "alice@example.com"
    })
}

/// Returns a fixed label and records what it was shown.
pub struct FixedClassifier {
    pub label: String,
    pub inputs: Mutex<Vec<ClassificationInput>>,
}

impl FixedClassifier {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            inputs: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, input: &ClassificationInput) -> Result<String, LlmError> {
        self.inputs.lock().unwrap().push(input.clone());
        Ok(self.label.clone())
    }
}

/// Plays back assistant turns in order and records every request.
pub struct ScriptedGenerator {
    turns: Mutex<VecDeque<ChatMessage>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
    pub updates: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedGenerator {
    pub fn new(turns: Vec<ChatMessage>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        })
    }

    pub fn offered(&self, request: usize) -> Vec<String> {
        self.requests.lock().unwrap()[request]
            .tools
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<ChatMessage, LlmError> {
        self.requests.lock().unwrap().push(request);
        Ok(self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ChatMessage::assistant("Nothing more to do.")))
    }

    async fn structured(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<serde_json::Value, LlmError> {
        self.updates
            .lock()
            .unwrap()
            .push((system.to_string(), messages.to_vec()));
        Ok(serde_json::json!({
            "chain_of_thought": "folded in reviewer feedback",
            "user_preferences": format!("updated after {} messages", messages.len())
        }))
    }
}

#[derive(Default)]
pub struct RecordingMailbox {
    pub marked: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<OutgoingReply>>,
    pub fail_mark: bool,
}

#[async_trait]
impl Mailbox for RecordingMailbox {
    fn name(&self) -> &str {
        "recording"
    }

    async fn fetch_unseen(&self) -> Result<Vec<SourceItem>, ChannelError> {
        Ok(Vec::new())
    }

    async fn mark_as_read(&self, id: &str) -> Result<(), ChannelError> {
        if self.fail_mark {
            return Err(ChannelError::MarkFailed {
                name: "recording".into(),
                id: id.into(),
                reason: "imap down".into(),
            });
        }
        self.marked.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn send_reply(&self, reply: OutgoingReply) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(reply);
        Ok(())
    }
}

/// Unreviewed domain lookup.
pub struct LookupTool;

#[async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Look up records"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        match params.get("query").and_then(|q| q.as_str()) {
            Some(q) => Ok(ToolOutput::text(
                format!("3 records for {q}"),
                Duration::from_millis(1),
            )),
            None => Err(ToolError::InvalidParameters("query is required".into())),
        }
    }
}

pub struct Harness {
    pub engine: WorkflowEngine,
    pub db: Arc<dyn Database>,
    pub classifier: Arc<FixedClassifier>,
    pub generator: Arc<ScriptedGenerator>,
    pub mailbox: Arc<RecordingMailbox>,
    pub registry: Arc<ToolRegistry>,
}

impl Harness {
    pub async fn new(label: &str, turns: Vec<ChatMessage>) -> Self {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        Self::with_db(db, label, turns).await
    }

    pub async fn with_db(db: Arc<dyn Database>, label: &str, turns: Vec<ChatMessage>) -> Self {
        let classifier = FixedClassifier::new(label);
        let generator = ScriptedGenerator::new(turns);
        let mailbox = Arc::new(RecordingMailbox::default());
        let registry = Arc::new(ToolRegistry::new());
        register_builtin_tools(&registry, mailbox.clone());
        registry.register(Arc::new(LookupTool)).await;

        let engine = WorkflowEngine::new(
            WorkflowConfig::default(),
            db.clone(),
            classifier.clone(),
            generator.clone(),
            registry.clone(),
            mailbox.clone(),
        )
        .await
        .unwrap();

        Self {
            engine,
            db,
            classifier,
            generator,
            mailbox,
            registry,
        }
    }

    pub fn memory(&self) -> PreferenceMemory {
        PreferenceMemory::new(self.db.clone(), self.generator.clone(), "mail_assistant")
    }
}
