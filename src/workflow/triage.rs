//! Triage: classify the item, and let the reviewer confirm `notify`.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Result, WorkflowError};
use crate::llm::{ChatMessage, ClassificationInput, Classifier};
use crate::memory::{PreferenceKey, PreferenceMemory};
use crate::prompts::{DEFAULT_BACKGROUND, DEFAULT_TRIAGE_INSTRUCTIONS};
use crate::workflow::Node;
use crate::workflow::review::{CapabilityMatrix, ReviewDecision, ReviewRequest};
use crate::workflow::state::{Classification, ConversationState};

/// Classifies a fresh conversation and records the outcome.
pub struct TriageRouter {
    classifier: Arc<dyn Classifier>,
    memory: Arc<PreferenceMemory>,
}

impl TriageRouter {
    pub fn new(classifier: Arc<dyn Classifier>, memory: Arc<PreferenceMemory>) -> Self {
        Self { classifier, memory }
    }

    /// Classify the source item and pick the next node.
    pub async fn route(&self, state: &mut ConversationState) -> Result<Node> {
        let instructions = self
            .memory
            .get(PreferenceKey::Triage, DEFAULT_TRIAGE_INSTRUCTIONS)
            .await?;

        let source = &state.source;
        let input = ClassificationInput {
            background: DEFAULT_BACKGROUND.to_string(),
            instructions,
            sender: source.sender.clone(),
            recipients: source.recipients_line(),
            subject: source.subject.clone(),
            thread_text: source.body.clone(),
        };

        let label = self.classifier.classify(&input).await?;
        let classification: Classification = label.parse()?;
        state.set_classification(classification)?;

        info!(
            conversation = %state.id,
            source = %state.source.id,
            classification = %classification,
            "Email triaged"
        );

        Ok(match classification {
            Classification::Respond => {
                let md = state.source.to_markdown();
                state.push(ChatMessage::user(format!("Respond to the email: {md}")));
                Node::Call
            }
            Classification::Notify => Node::TriageGate,
            Classification::Ignore => Node::End,
        })
    }
}

/// Suspends `notify` items for the reviewer.
pub struct TriageInterruptGate {
    memory: Arc<PreferenceMemory>,
    assistant_name: String,
}

impl TriageInterruptGate {
    pub fn new(memory: Arc<PreferenceMemory>, assistant_name: impl Into<String>) -> Self {
        Self {
            memory,
            assistant_name: assistant_name.into(),
        }
    }

    pub fn capabilities() -> CapabilityMatrix {
        CapabilityMatrix::IGNORE_OR_RESPOND
    }

    /// Record the notification and build the reviewer request.
    pub fn suspend(&self, state: &mut ConversationState) -> ReviewRequest {
        let md = state.source.to_markdown();
        state.push(ChatMessage::user(format!("Email to notify user about: {md}")));

        ReviewRequest {
            action: format!("{}: notify", self.assistant_name),
            args: serde_json::json!({}),
            config: Self::capabilities(),
            description: md,
        }
    }

    /// Apply the reviewer's decision.
    pub async fn resolve(
        &self,
        state: &mut ConversationState,
        decision: ReviewDecision,
    ) -> Result<Node> {
        Self::capabilities().check(&decision)?;

        match decision {
            ReviewDecision::Respond { feedback } => {
                state.push(ChatMessage::user(format!(
                    "User wants to reply to the email. Use this feedback to respond: {feedback}"
                )));

                let mut transcript = vec![ChatMessage::user(
                    "The user decided to respond to the email, so update the triage \
                     preferences to capture this.",
                )];
                transcript.extend(state.messages.iter().cloned());
                self.memory.update(PreferenceKey::Triage, transcript).await?;

                info!(conversation = %state.id, "Reviewer chose to respond to notify item");
                Ok(Node::Call)
            }
            ReviewDecision::Ignore => {
                state.push(ChatMessage::user(
                    "The user decided to ignore the email even though it was classified as \
                     notify. Update triage preferences to capture this.",
                ));
                self.memory
                    .update(PreferenceKey::Triage, state.messages.clone())
                    .await?;

                info!(conversation = %state.id, "Reviewer ignored notify item");
                Ok(Node::End)
            }
            other => {
                warn!(decision = other.label(), "Unsupported triage decision");
                Err(WorkflowError::InvalidReviewDecision(format!(
                    "{} is not permitted at the triage gate",
                    other.label()
                ))
                .into())
            }
        }
    }
}
