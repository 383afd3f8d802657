//! End-to-end workflow scenarios against an in-memory or on-disk database
//! with scripted language-model capabilities.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mailgate::channels::{Mailbox, OutgoingReply};
use mailgate::config::WorkflowConfig;
use mailgate::error::{ChannelError, Error, LlmError, ToolError, WorkflowError};
use mailgate::llm::{
    ChatMessage, ClassificationInput, Classifier, GenerationRequest, Generator, Role, ToolCall,
};
use mailgate::store::{Database, ItemStatus, LibSqlBackend};
use mailgate::tools::builtin::register_builtin_tools;
use mailgate::tools::{Tool, ToolContext, ToolOutput, ToolRegistry};
use mailgate::workflow::{
    Classification, Gate, PendingReview, ReviewDecision, RunOutcome, SourceItem, WorkflowEngine,
};

// ── Scripted collaborators ──────────────────────────────────────────

struct FixedClassifier(&'static str);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _input: &ClassificationInput) -> Result<String, LlmError> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct ScriptedGenerator {
    turns: Mutex<VecDeque<ChatMessage>>,
    offered: Mutex<Vec<Vec<String>>>,
    updates: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(turns: Vec<ChatMessage>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<ChatMessage, LlmError> {
        self.offered
            .lock()
            .unwrap()
            .push(request.tools.iter().map(|t| t.name.clone()).collect());
        Ok(self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ChatMessage::assistant("Done.")))
    }

    async fn structured(
        &self,
        system: &str,
        _messages: &[ChatMessage],
    ) -> Result<serde_json::Value, LlmError> {
        self.updates.lock().unwrap().push(system.to_string());
        Ok(serde_json::json!({
            "chain_of_thought": "reviewer feedback",
            "user_preferences": "Emails like this one should be ignored."
        }))
    }
}

#[derive(Default)]
struct RecordingMailbox {
    marked: Mutex<Vec<String>>,
    sent: Mutex<Vec<OutgoingReply>>,
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
        self.marked.lock().unwrap().push(id.to_string());
        Ok(())
    }
    async fn send_reply(&self, reply: OutgoingReply) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(reply);
        Ok(())
    }
}

struct AgendaTool;

#[async_trait]
impl Tool for AgendaTool {
    fn name(&self) -> &str {
        "agenda"
    }
    fn description(&self) -> &str {
        "Look up committee agenda items"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"days_ahead": {"type": "integer"}}})
    }
    async fn execute(
        &self,
        _params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(
            "Tuesday: housing budget",
            Duration::from_millis(1),
        ))
    }
}

struct World {
    engine: WorkflowEngine,
    db: Arc<dyn Database>,
    generator: Arc<ScriptedGenerator>,
    mailbox: Arc<RecordingMailbox>,
}

async fn world_with(
    db: Arc<dyn Database>,
    label: &'static str,
    turns: Vec<ChatMessage>,
) -> World {
    let generator = ScriptedGenerator::new(turns);
    let mailbox = Arc::new(RecordingMailbox::default());
    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry, mailbox.clone());
    registry.register(Arc::new(AgendaTool)).await;

    let engine = WorkflowEngine::new(
        WorkflowConfig::default(),
        db.clone(),
        Arc::new(FixedClassifier(label)),
        generator.clone(),
        registry,
        mailbox.clone(),
    )
    .await
    .unwrap();

    World {
        engine,
        db,
        generator,
        mailbox,
    }
}

async fn world(label: &'static str, turns: Vec<ChatMessage>) -> World {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    world_with(db, label, turns).await
}

fn email(id: &str) -> SourceItem {
    SourceItem {
        id: id.to_string(),
        sender: "clerk@parliament.example".to_string(),
        recipients: vec!["member@parliament.example".to_string()],
        subject: "Committee agenda".to_string(),
        body: "Could you confirm the agenda items for next week?".to_string(),
        thread_id: Some("<agenda-1@parliament.example>".to_string()),
        received_at: None,
    }
}

fn turn(id: &str, name: &str, arguments: serde_json::Value) -> ChatMessage {
    ChatMessage::assistant_with_tool_calls(
        None,
        vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
    )
}

fn send(id: &str, body: &str) -> ChatMessage {
    turn(
        id,
        "send_email",
        serde_json::json!({
            "email_id": "4711",
            "response_text": body,
            "email_address": "clerk@parliament.example"
        }),
    )
}

fn suspended(outcome: RunOutcome) -> PendingReview {
    match outcome {
        RunOutcome::Suspended(review) => review,
        other => panic!("expected a suspension, got {other:?}"),
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn notify_then_ignore_updates_triage_preferences() {
    let w = world("notify", vec![]).await;

    let review = suspended(w.engine.start(email("4711")).await.unwrap());
    assert_eq!(review.gate, Gate::Triage);
    assert_eq!(review.request.action, "Mail Assistant: notify");
    assert!(!review.request.config.allow_accept);
    assert!(!review.request.config.allow_edit);

    let outcome = w
        .engine
        .resume(review.conversation_id, ReviewDecision::Ignore)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            conversation_id: review.conversation_id,
            classification: Some(Classification::Notify),
            handled: false,
        }
    );
    assert_eq!(
        w.db.get_preference("mail_assistant", "triage").await.unwrap(),
        Some("Emails like this one should be ignored.".to_string())
    );
    assert!(w.mailbox.marked.lock().unwrap().is_empty());
    assert_eq!(
        w.db.get_tracked_item("4711").await.unwrap().unwrap().status,
        ItemStatus::Ignored
    );
}

#[tokio::test]
async fn respond_send_accept_marks_item_handled() {
    let w = world(
        "respond",
        vec![
            send("c1", "The agenda is the housing budget."),
            turn("c2", "done", serde_json::json!({"done": true})),
        ],
    )
    .await;

    let review = suspended(w.engine.start(email("4711")).await.unwrap());
    assert_eq!(review.gate, Gate::ToolReview { call_index: 0 });
    assert!(review.request.description.contains("# Email Draft"));

    let outcome = w
        .engine
        .resume(review.conversation_id, ReviewDecision::Accept)
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { handled: true, .. }));

    let sent = w.mailbox.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "clerk@parliament.example");
    assert_eq!(sent[0].subject, "Re: Committee agenda");
    assert_eq!(
        sent[0].in_reply_to.as_deref(),
        Some("<agenda-1@parliament.example>")
    );
    assert_eq!(*w.mailbox.marked.lock().unwrap(), vec!["4711".to_string()]);
    assert_eq!(
        w.db.get_tracked_item("4711").await.unwrap().unwrap().status,
        ItemStatus::Completed
    );
}

#[tokio::test]
async fn breaker_limits_offer_to_send_after_two_requests() {
    let w = world(
        "respond",
        vec![
            turn("c1", "agenda", serde_json::json!({"days_ahead": 7})),
            turn("c2", "question", serde_json::json!({"content": "Attend in person?"})),
            send("c3", "I will attend on Tuesday."),
        ],
    )
    .await;

    let review = suspended(w.engine.start(email("4711")).await.unwrap());
    assert_eq!(review.request.action, "question");

    let review = suspended(
        w.engine
            .resume(
                review.conversation_id,
                ReviewDecision::Respond {
                    feedback: "Yes, Tuesday".into(),
                },
            )
            .await
            .unwrap(),
    );
    assert_eq!(review.request.action, "send_email");

    let offered = w.generator.offered.lock().unwrap();
    assert_eq!(offered.len(), 3);
    assert_eq!(offered[0].len(), 5);
    assert_eq!(offered[1].len(), 5);
    assert_eq!(offered[2], vec!["send_email".to_string()]);
}

#[tokio::test]
async fn third_informational_request_is_cut_off_by_breaker() {
    let agenda = |id: &str| turn(id, "agenda", serde_json::json!({"days_ahead": 7}));
    let w = world("respond", vec![agenda("c1"), agenda("c2"), agenda("c3")]).await;

    let outcome = w.engine.start(email("4711")).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { handled: true, .. }));
    let offered = w.generator.offered.lock().unwrap();
    assert_eq!(offered.len(), 3);
    assert_eq!(offered[2], vec!["send_email".to_string()]);
    assert!(w.mailbox.sent.lock().unwrap().is_empty());
    assert_eq!(*w.mailbox.marked.lock().unwrap(), vec!["4711".to_string()]);
    assert_eq!(
        w.db.get_tracked_item("4711").await.unwrap().unwrap().status,
        ItemStatus::Completed
    );
}

#[tokio::test]
async fn reply_accepted_after_breaker_marks_item_handled() {
    let agenda = |id: &str| turn(id, "agenda", serde_json::json!({"days_ahead": 7}));
    let w = world(
        "respond",
        vec![
            agenda("c1"),
            agenda("c2"),
            send("c3", "Tuesday: housing budget."),
            turn("c4", "done", serde_json::json!({"done": true})),
        ],
    )
    .await;

    let review = suspended(w.engine.start(email("4711")).await.unwrap());
    let outcome = w
        .engine
        .resume(review.conversation_id, ReviewDecision::Accept)
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { handled: true, .. }));
    assert_eq!(w.generator.offered.lock().unwrap().len(), 3);
    assert_eq!(w.mailbox.sent.lock().unwrap().len(), 1);
    assert_eq!(*w.mailbox.marked.lock().unwrap(), vec!["4711".to_string()]);
}

#[tokio::test]
async fn suspension_survives_restart_and_resumes_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mailgate.db");

    let conversation_id = {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
        let w = world_with(db, "respond", vec![send("c1", "Draft")]).await;
        suspended(w.engine.start(email("4711")).await.unwrap()).conversation_id
    };

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
    let w = world_with(db, "respond", vec![]).await;

    let pending = w.engine.pending_reviews().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].conversation_id, conversation_id);

    let outcome = w
        .engine
        .resume(
            conversation_id,
            ReviewDecision::Edit {
                arguments: serde_json::json!({
                    "email_id": "4711",
                    "response_text": "Edited draft",
                    "email_address": "clerk@parliament.example"
                }),
            },
        )
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { handled: true, .. }));
    assert_eq!(w.mailbox.sent.lock().unwrap()[0].body, "Edited draft");
    assert_eq!(w.generator.updates.lock().unwrap().len(), 1);

    let err = w
        .engine
        .resume(conversation_id, ReviewDecision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Workflow(WorkflowError::NoPendingReview(id)) if id == conversation_id
    ));
}

#[tokio::test]
async fn clarification_is_formatted_for_the_reviewer() {
    let w = world(
        "respond",
        vec![turn(
            "c1",
            "clarification",
            serde_json::json!({
                "target_tool": "agenda",
                "missing_or_unclear_params": ["days_ahead"],
                "user_request_context": "agenda for next week"
            }),
        )],
    )
    .await;

    let review = suspended(w.engine.start(email("test-7")).await.unwrap());
    assert_eq!(review.request.action, "clarification");
    assert!(review.request.config.allow_edit);

    let outcome = w
        .engine
        .resume(review.conversation_id, ReviewDecision::Accept)
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { handled: true, .. }));
    // Synthetic id: the sink skips the mailbox.
    assert!(w.mailbox.marked.lock().unwrap().is_empty());
}

#[tokio::test]
async fn clarification_answer_is_fed_back_to_the_generator() {
    let w = world(
        "respond",
        vec![
            turn(
                "c1",
                "clarification",
                serde_json::json!({
                    "target_tool": "agenda",
                    "missing_or_unclear_params": ["days_ahead"],
                    "user_request_context": "agenda"
                }),
            ),
            send("c2", "Here is the agenda."),
        ],
    )
    .await;

    let review = suspended(w.engine.start(email("4711")).await.unwrap());
    let review = suspended(
        w.engine
            .resume(
                review.conversation_id,
                ReviewDecision::Respond {
                    feedback: "14 days".into(),
                },
            )
            .await
            .unwrap(),
    );
    assert_eq!(review.request.action, "send_email");

    let stored = w
        .db
        .get_pending_checkpoint(review.conversation_id)
        .await
        .unwrap()
        .unwrap();
    let messages = &stored.state.messages;
    assert!(messages.iter().any(|m| m.role == Role::Tool
        && m.content == "User provided clarification: 14 days"));
    assert!(messages.iter().any(|m| m.role == Role::User
        && m.content.starts_with("Additional information received: 14 days")));
}

#[tokio::test]
async fn batch_skips_items_already_tracked() {
    let w = world("ignore", vec![]).await;
    w.engine.start(email("1")).await.unwrap();

    let report = w
        .engine
        .process_batch(vec![email("1"), email("2")])
        .await;
    assert_eq!(report.skipped, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn resumption_values_parse_from_json() {
    let edit = ReviewDecision::from_value(&serde_json::json!({
        "type": "edit",
        "args": {"args": {"response_text": "x"}}
    }))
    .unwrap();
    assert!(matches!(edit, ReviewDecision::Edit { .. }));

    let response =
        ReviewDecision::from_value(&serde_json::json!({"type": "response", "args": "ok"})).unwrap();
    assert_eq!(
        response,
        ReviewDecision::Respond {
            feedback: "ok".into()
        }
    );

    assert!(ReviewDecision::from_value(&serde_json::json!({"type": "approve"})).is_err());
}
