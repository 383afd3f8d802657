//! Tool dispatch with reviewer approval for sensitive tools.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, ToolError, WorkflowError};
use crate::llm::{ChatMessage, ToolCall};
use crate::memory::{PreferenceKey, PreferenceMemory};
use crate::prompts::MEMORY_UPDATE_REINFORCEMENT;
use crate::tools::tool::{Tool, ToolContext, ToolKind};
use crate::tools::ToolRegistry;
use crate::tools::builtin::SEND_EMAIL_TOOL_NAME;
use crate::workflow::review::{Checkpoint, Gate, ReviewDecision, ReviewRequest, render_tool_call};
use crate::workflow::state::ConversationState;
use crate::workflow::{Node, Step};

pub struct ToolDispatchGate {
    registry: Arc<ToolRegistry>,
    memory: Arc<PreferenceMemory>,
}

impl ToolDispatchGate {
    pub fn new(registry: Arc<ToolRegistry>, memory: Arc<PreferenceMemory>) -> Self {
        Self { registry, memory }
    }

    /// Work through the pending invocations starting at `from_index`.
    ///
    /// Unreviewed tools run immediately. The first reviewed tool suspends.
    pub async fn run(&self, state: &mut ConversationState, from_index: usize) -> Result<Step> {
        let calls = state.pending_calls().to_vec();

        for (index, call) in calls.iter().enumerate().skip(from_index) {
            let tool = self.lookup(&call.name).await?;
            let kind = tool.kind();

            match kind.review_matrix() {
                None => {
                    let text = result_text(self.execute(tool.as_ref(), call, state).await);
                    state.push(ChatMessage::tool_result(&call.id, &call.name, text));
                }
                Some(config) => {
                    info!(
                        conversation = %state.id,
                        tool = %call.name,
                        call_index = index,
                        "Tool call awaiting review"
                    );
                    let request = ReviewRequest {
                        action: call.name.clone(),
                        args: call.arguments.clone(),
                        config,
                        description: format!(
                            "{}\n\n{}",
                            state.source.to_markdown(),
                            render_tool_call(call)
                        ),
                    };
                    return Ok(Step::Suspend {
                        gate: Gate::ToolReview { call_index: index },
                        request,
                    });
                }
            }
        }

        Ok(Step::Goto(Node::Call))
    }

    /// Reject decisions this suspension cannot take, before it is consumed.
    pub fn validate(checkpoint: &Checkpoint, decision: &ReviewDecision) -> Result<()> {
        checkpoint.request.config.check(decision)?;
        if matches!(decision, ReviewDecision::Edit { .. })
            && matches!(checkpoint.gate, Gate::ToolReview { .. })
            && checkpoint.request.action != SEND_EMAIL_TOOL_NAME
        {
            return Err(WorkflowError::UnsupportedEdit(checkpoint.request.action.clone()).into());
        }
        Ok(())
    }

    /// Apply the reviewer's decision to the invocation at `call_index`.
    pub async fn resolve(
        &self,
        state: &mut ConversationState,
        call_index: usize,
        decision: ReviewDecision,
    ) -> Result<Node> {
        let call = state
            .pending_calls()
            .get(call_index)
            .cloned()
            .ok_or(WorkflowError::NoPendingInvocation(state.id))?;
        let tool = self.lookup(&call.name).await?;
        let kind = tool.kind();

        let matrix = kind.review_matrix().ok_or_else(|| {
            WorkflowError::InvalidReviewDecision(format!("{} is not a reviewed tool", call.name))
        })?;
        matrix.check(&decision)?;

        info!(
            conversation = %state.id,
            tool = %call.name,
            decision = decision.label(),
            "Applying review decision"
        );

        let next = Node::Dispatch {
            call_index: call_index + 1,
        };

        match decision {
            ReviewDecision::Accept => {
                let result = self.execute(tool.as_ref(), &call, state).await;
                let after = after_execution(kind, &result, next);
                state.push(ChatMessage::tool_result(&call.id, &call.name, result_text(result)));
                Ok(after)
            }
            ReviewDecision::Edit { arguments } => {
                if kind != ToolKind::Send {
                    return Err(WorkflowError::UnsupportedEdit(call.name.clone()).into());
                }
                let initial = state.edit_pending_call(&call.id, arguments.clone())?;
                let edited = ToolCall {
                    arguments: arguments.clone(),
                    ..call.clone()
                };
                let result = self.execute(tool.as_ref(), &edited, state).await;
                let after = after_execution(kind, &result, next);
                state.push(ChatMessage::tool_result(&call.id, &call.name, result_text(result)));

                let comparison = format!(
                    "User edited the email response. Here is the initial email generated by \
                     the assistant: {initial}. Here is the edited email: {arguments}. Follow \
                     all instructions above, and remember: {MEMORY_UPDATE_REINFORCEMENT}."
                );
                self.memory
                    .update(PreferenceKey::Response, vec![ChatMessage::user(comparison)])
                    .await?;
                Ok(after)
            }
            ReviewDecision::Ignore => {
                let (result, reinforcement) = match kind {
                    ToolKind::Send => (
                        "User ignored this email draft. Ignore this email and end the workflow.",
                        Some(
                            "The user ignored the email draft. That means they did not want to \
                             respond to the email. Update the triage preferences to ensure \
                             emails of this type are not classified as respond.",
                        ),
                    ),
                    ToolKind::Question => (
                        "User ignored this question. Ignore this email and end the workflow.",
                        Some(
                            "The user ignored the question. That means they did not want to \
                             answer the question or deal with this email. Update the triage \
                             preferences to ensure emails of this type are not classified as \
                             respond.",
                        ),
                    ),
                    _ => (
                        "User ignored the clarification request. Unable to proceed without \
                         more information.",
                        None,
                    ),
                };
                state.push(ChatMessage::tool_result(&call.id, &call.name, result));

                if let Some(note) = reinforcement {
                    let mut transcript = state.messages.clone();
                    transcript.push(ChatMessage::user(format!(
                        "{note} Follow all instructions above, and remember: \
                         {MEMORY_UPDATE_REINFORCEMENT}."
                    )));
                    self.memory.update(PreferenceKey::Triage, transcript).await?;
                }
                Ok(Node::End)
            }
            ReviewDecision::Respond { feedback } => {
                match kind {
                    ToolKind::Send => {
                        state.push(ChatMessage::tool_result(
                            &call.id,
                            &call.name,
                            format!(
                                "User gave feedback, which can we incorporate into the email. \
                                 Feedback: {feedback}"
                            ),
                        ));
                        let mut transcript = state.messages.clone();
                        transcript.push(ChatMessage::user(format!(
                            "User gave feedback, which we can use to update the response \
                             preferences. Follow all instructions above, and remember: \
                             {MEMORY_UPDATE_REINFORCEMENT}."
                        )));
                        self.memory
                            .update(PreferenceKey::Response, transcript)
                            .await?;
                    }
                    ToolKind::Question => {
                        state.push(ChatMessage::tool_result(
                            &call.id,
                            &call.name,
                            format!(
                                "User answered the question, which can we can use for any \
                                 follow up actions. Feedback: {feedback}"
                            ),
                        ));
                    }
                    _ => {
                        state.push(ChatMessage::tool_result(
                            &call.id,
                            &call.name,
                            format!("User provided clarification: {feedback}"),
                        ));
                        state.push(ChatMessage::user(format!(
                            "Additional information received: {feedback}. Use this \
                             information now to make the correct tool call."
                        )));
                    }
                }
                Ok(next)
            }
        }
    }

    async fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.registry.get(name).await.ok_or_else(|| {
            warn!(tool = %name, "Tool not in registry");
            WorkflowError::UnknownTool(name.to_string()).into()
        })
    }

    async fn execute(
        &self,
        tool: &dyn Tool,
        call: &ToolCall,
        state: &ConversationState,
    ) -> std::result::Result<String, ToolError> {
        let ctx = ToolContext {
            conversation_id: state.id,
            source: state.source.clone(),
        };
        let timeout = tool.execution_timeout();
        let result = match tokio::time::timeout(timeout, tool.execute(call.arguments.clone(), &ctx))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(timeout)),
        };
        match result {
            Ok(output) => {
                debug!(
                    tool = %call.name,
                    elapsed_ms = output.duration.as_millis() as u64,
                    "Tool executed"
                );
                Ok(output.text)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                Err(e)
            }
        }
    }
}

/// Failures become result text for the generator.
fn result_text(result: std::result::Result<String, ToolError>) -> String {
    result.unwrap_or_else(|e| format!("Error: {e}"))
}

/// A delivered reply finishes the item. Anything else keeps dispatching.
fn after_execution(
    kind: ToolKind,
    result: &std::result::Result<String, ToolError>,
    next: Node,
) -> Node {
    if kind == ToolKind::Send && result.is_ok() {
        Node::Terminal
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::llm::Role;
    use crate::workflow::review::CapabilityMatrix;
    use crate::workflow::testing::{Harness, send_args, source, tool_turn};

    fn gate(h: &Harness) -> ToolDispatchGate {
        ToolDispatchGate::new(h.registry.clone(), Arc::new(h.memory()))
    }

    fn state_with(turn: ChatMessage) -> ConversationState {
        let mut state = ConversationState::new(source("test-1"));
        state.push(ChatMessage::user("Respond to the email: ..."));
        state.push(turn);
        state
    }

    fn suspended(step: Step) -> (usize, ReviewRequest) {
        match step {
            Step::Suspend {
                gate: Gate::ToolReview { call_index },
                request,
            } => (call_index, request),
            other => panic!("expected tool review suspension, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreviewed_tool_runs_immediately() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn("c1", "lookup", serde_json::json!({"query": "votes"})));

        let step = gate(&h).run(&mut state, 0).await.unwrap();
        assert_eq!(step, Step::Goto(Node::Call));
        let last = state.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(last.content, "3 records for votes");
    }

    #[tokio::test]
    async fn tool_errors_become_result_text() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn("c1", "lookup", serde_json::json!({})));
        gate(&h).run(&mut state, 0).await.unwrap();
        assert!(state.messages.last().unwrap().content.starts_with("Error: "));
    }

    struct StalledTool;

    #[async_trait::async_trait]
    impl Tool for StalledTool {
        fn name(&self) -> &str {
            "stalled"
        }
        fn description(&self) -> &str {
            "Never answers in time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execution_timeout(&self) -> std::time::Duration {
            std::time::Duration::from_millis(10)
        }
        async fn execute(
            &self,
            _params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> std::result::Result<crate::tools::ToolOutput, ToolError> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Err(ToolError::ExecutionFailed("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn slow_tools_time_out_into_result_text() {
        let h = Harness::new("respond", vec![]).await;
        h.registry.register(Arc::new(StalledTool)).await;
        let mut state = state_with(tool_turn("c1", "stalled", serde_json::json!({})));
        gate(&h).run(&mut state, 0).await.unwrap();
        assert!(
            state
                .messages
                .last()
                .unwrap()
                .content
                .starts_with("Error: Timed out")
        );
    }

    #[tokio::test]
    async fn unregistered_tool_is_unknown() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn("c1", "calendar", serde_json::json!({})));
        let err = gate(&h).run(&mut state, 0).await.unwrap_err();
        assert!(matches!(err, Error::Workflow(WorkflowError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn reviewed_tools_suspend_with_their_matrix() {
        let h = Harness::new("respond", vec![]).await;

        let mut state = state_with(tool_turn("c1", "send_email", send_args("Hello Alice")));
        let (index, request) = suspended(gate(&h).run(&mut state, 0).await.unwrap());
        assert_eq!(index, 0);
        assert_eq!(request.action, "send_email");
        assert_eq!(request.config, CapabilityMatrix::ALL);
        assert!(request.description.contains("## Original Email"));
        assert!(request.description.contains("Hello Alice"));

        let mut state = state_with(tool_turn(
            "c2",
            "question",
            serde_json::json!({"content": "Will you attend?"}),
        ));
        let (_, request) = suspended(gate(&h).run(&mut state, 0).await.unwrap());
        assert_eq!(request.config, CapabilityMatrix::IGNORE_OR_RESPOND);
    }

    #[tokio::test]
    async fn accept_executes_send() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn("c1", "send_email", send_args("Hello Alice")));

        let next = gate(&h)
            .resolve(&mut state, 0, ReviewDecision::Accept)
            .await
            .unwrap();
        assert_eq!(next, Node::Terminal);
        assert_eq!(h.mailbox.sent.lock().unwrap()[0].body, "Hello Alice");
        assert_eq!(
            state.messages.last().unwrap().content,
            "Email sent to alice@example.com"
        );
        assert_eq!(h.generator.update_count(), 0);
    }

    #[tokio::test]
    async fn failed_send_keeps_dispatching() {
        let h = Harness::new("respond", vec![]).await;
        let mut args = send_args("Hello Alice");
        args.as_object_mut().unwrap().remove("response_text");
        let mut state = state_with(tool_turn("c1", "send_email", args));

        let next = gate(&h)
            .resolve(&mut state, 0, ReviewDecision::Accept)
            .await
            .unwrap();
        assert_eq!(next, Node::Dispatch { call_index: 1 });
        assert!(h.mailbox.sent.lock().unwrap().is_empty());
        assert!(state.messages.last().unwrap().content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn edit_keeps_correlation_id_and_updates_response_memory() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn("c1", "send_email", send_args("Hello Alice")));

        let next = gate(&h)
            .resolve(
                &mut state,
                0,
                ReviewDecision::Edit {
                    arguments: send_args("Dear Alice"),
                },
            )
            .await
            .unwrap();

        assert_eq!(next, Node::Terminal);
        let pending = &state.pending_calls()[0];
        assert_eq!(pending.id, "c1");
        assert_eq!(pending.arguments, send_args("Dear Alice"));
        assert_eq!(h.mailbox.sent.lock().unwrap()[0].body, "Dear Alice");
        assert_eq!(state.messages.last().unwrap().tool_call_id.as_deref(), Some("c1"));

        let updates = h.generator.updates.lock().unwrap();
        assert!(updates[0].0.contains("mail_assistant/response"));
        assert!(updates[0].1[0].content.contains("Hello Alice"));
        assert!(updates[0].1[0].content.contains("Dear Alice"));
    }

    #[tokio::test]
    async fn edit_on_clarification_is_unsupported() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn(
            "c1",
            "clarification",
            serde_json::json!({
                "target_tool": "lookup",
                "missing_or_unclear_params": ["query"],
                "user_request_context": "votes"
            }),
        ));
        let err = gate(&h)
            .resolve(
                &mut state,
                0,
                ReviewDecision::Edit {
                    arguments: serde_json::json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Workflow(WorkflowError::UnsupportedEdit(_))));
    }

    #[tokio::test]
    async fn ignoring_send_biases_triage_and_ends() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn("c1", "send_email", send_args("Hello")));

        let next = gate(&h)
            .resolve(&mut state, 0, ReviewDecision::Ignore)
            .await
            .unwrap();
        assert_eq!(next, Node::End);
        assert!(h.mailbox.sent.lock().unwrap().is_empty());
        assert!(state.messages.last().unwrap().content.contains("ignored this email draft"));

        let updates = h.generator.updates.lock().unwrap();
        assert!(updates[0].0.contains("mail_assistant/triage"));
        assert!(updates[0].1.last().unwrap().content.contains("not classified as respond"));
    }

    #[tokio::test]
    async fn ignoring_clarification_skips_memory() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn(
            "c1",
            "clarification",
            serde_json::json!({
                "target_tool": "lookup",
                "missing_or_unclear_params": ["query"],
                "user_request_context": "votes"
            }),
        ));
        let next = gate(&h)
            .resolve(&mut state, 0, ReviewDecision::Ignore)
            .await
            .unwrap();
        assert_eq!(next, Node::End);
        assert_eq!(h.generator.update_count(), 0);
    }

    #[tokio::test]
    async fn question_response_becomes_tool_result() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn(
            "c1",
            "question",
            serde_json::json!({"content": "Will you attend?"}),
        ));
        let next = gate(&h)
            .resolve(
                &mut state,
                0,
                ReviewDecision::Respond {
                    feedback: "Yes, Tuesday only".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(next, Node::Dispatch { call_index: 1 });
        let last = state.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.ends_with("Feedback: Yes, Tuesday only"));
        assert_eq!(h.generator.update_count(), 0);
    }

    #[tokio::test]
    async fn clarification_response_adds_user_turn() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn(
            "c1",
            "clarification",
            serde_json::json!({
                "target_tool": "lookup",
                "missing_or_unclear_params": ["query"],
                "user_request_context": "votes"
            }),
        ));
        gate(&h)
            .resolve(
                &mut state,
                0,
                ReviewDecision::Respond {
                    feedback: "housing".into(),
                },
            )
            .await
            .unwrap();

        let n = state.messages.len();
        assert_eq!(state.messages[n - 2].content, "User provided clarification: housing");
        assert_eq!(state.messages[n - 1].role, Role::User);
        assert!(state.messages[n - 1].content.starts_with("Additional information received: housing"));
    }

    #[tokio::test]
    async fn send_feedback_updates_response_memory() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn("c1", "send_email", send_args("Hello")));
        gate(&h)
            .resolve(
                &mut state,
                0,
                ReviewDecision::Respond {
                    feedback: "Be more formal".into(),
                },
            )
            .await
            .unwrap();
        assert!(h.mailbox.sent.lock().unwrap().is_empty());
        let updates = h.generator.updates.lock().unwrap();
        assert!(updates[0].0.contains("mail_assistant/response"));
    }

    #[tokio::test]
    async fn accept_on_question_is_invalid() {
        let h = Harness::new("respond", vec![]).await;
        let mut state = state_with(tool_turn(
            "c1",
            "question",
            serde_json::json!({"content": "?"}),
        ));
        let err = gate(&h)
            .resolve(&mut state, 0, ReviewDecision::Accept)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Workflow(WorkflowError::InvalidReviewDecision(_))
        ));
    }
}
