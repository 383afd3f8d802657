//! Workflow engine: drives conversations through the graph and owns the
//! durable suspend/resume discipline.
//!
//! Every suspension is written to the database before it is reported, so a
//! fresh engine over the same database can resume it. A suspension is
//! consumed by an atomic claim; a second resume of the same conversation
//! fails with `NoPendingReview`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::Mailbox;
use crate::config::WorkflowConfig;
use crate::error::{Result, WorkflowError};
use crate::llm::{Classifier, Generator};
use crate::memory::PreferenceMemory;
use crate::store::{Database, ItemStatus};
use crate::tools::ToolRegistry;
use crate::workflow::agent_loop::ResponseAgentLoop;
use crate::workflow::circuit::CircuitBreaker;
use crate::workflow::dispatch::ToolDispatchGate;
use crate::workflow::review::{Checkpoint, Gate, PendingReview, ReviewDecision, ReviewRequest};
use crate::workflow::sink::TerminalSink;
use crate::workflow::state::{Classification, ConversationState, SourceItem};
use crate::workflow::triage::{TriageInterruptGate, TriageRouter};
use crate::workflow::{Node, Step};

/// How a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The workflow reached END.
    Completed {
        conversation_id: Uuid,
        classification: Option<Classification>,
        /// Whether the terminal sink ran.
        handled: bool,
    },
    /// Waiting for a reviewer; the checkpoint is already persisted.
    Suspended(PendingReview),
}

impl RunOutcome {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            Self::Completed {
                conversation_id, ..
            } => *conversation_id,
            Self::Suspended(review) => review.conversation_id,
        }
    }
}

/// Counts from one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub completed: usize,
    pub suspended: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct WorkflowEngine {
    db: Arc<dyn Database>,
    triage: TriageRouter,
    triage_gate: TriageInterruptGate,
    agent: ResponseAgentLoop,
    dispatch: ToolDispatchGate,
    sink: TerminalSink,
}

impl WorkflowEngine {
    /// Wire the workflow. Fails if a builtin tool is missing or mis-kinded.
    pub async fn new(
        config: WorkflowConfig,
        db: Arc<dyn Database>,
        classifier: Arc<dyn Classifier>,
        generator: Arc<dyn Generator>,
        registry: Arc<ToolRegistry>,
        mailbox: Arc<dyn Mailbox>,
    ) -> Result<Self> {
        registry.validate_builtins().await?;

        let memory = Arc::new(PreferenceMemory::new(
            Arc::clone(&db),
            Arc::clone(&generator),
            config.preference_scope.clone(),
        ));

        info!(
            scope = %config.preference_scope,
            ceiling = config.tool_call_ceiling,
            tools = registry.count(),
            "Workflow engine ready"
        );

        Ok(Self {
            triage: TriageRouter::new(classifier, Arc::clone(&memory)),
            triage_gate: TriageInterruptGate::new(Arc::clone(&memory), config.assistant_name),
            agent: ResponseAgentLoop::new(
                generator,
                Arc::clone(&registry),
                Arc::clone(&memory),
                CircuitBreaker::new(config.tool_call_ceiling),
            ),
            dispatch: ToolDispatchGate::new(registry, memory),
            sink: TerminalSink::new(mailbox, config.synthetic_prefixes),
            db,
        })
    }

    /// Start a workflow for a new item.
    pub async fn start(&self, item: SourceItem) -> Result<RunOutcome> {
        let state = ConversationState::new(item);
        let source_id = state.source.id.clone();

        if !self.db.track_item(&source_id, state.id).await? {
            return Err(WorkflowError::ItemAlreadyTracked(source_id).into());
        }

        info!(
            conversation = %state.id,
            source = %source_id,
            subject = %state.source.subject,
            "Workflow started"
        );

        let result = self.drive(state, Node::Triage).await;
        self.finish(&source_id, result).await
    }

    /// Resume a suspended conversation with the reviewer's decision.
    pub async fn resume(&self, conversation_id: Uuid, decision: ReviewDecision) -> Result<RunOutcome> {
        let pending = self
            .db
            .get_pending_checkpoint(conversation_id)
            .await?
            .ok_or(WorkflowError::NoPendingReview(conversation_id))?;
        ToolDispatchGate::validate(&pending, &decision)?;

        let checkpoint = self
            .db
            .claim_checkpoint(conversation_id)
            .await?
            .ok_or(WorkflowError::NoPendingReview(conversation_id))?;

        let mut state = checkpoint.state;
        let source_id = state.source.id.clone();
        info!(
            conversation = %conversation_id,
            gate = checkpoint.gate.as_str(),
            decision = decision.label(),
            "Resuming workflow"
        );
        self.set_status(&source_id, ItemStatus::Processing).await;

        let result = async {
            let next = match checkpoint.gate {
                Gate::Triage => self.triage_gate.resolve(&mut state, decision).await?,
                Gate::ToolReview { call_index } => {
                    self.dispatch.resolve(&mut state, call_index, decision).await?
                }
            };
            self.drive(state, next).await
        }
        .await;

        self.finish(&source_id, result).await
    }

    /// Open suspensions, oldest first.
    pub async fn pending_reviews(&self) -> Result<Vec<PendingReview>> {
        let checkpoints = self.db.list_pending_checkpoints().await?;
        Ok(checkpoints.iter().map(Checkpoint::summary).collect())
    }

    pub async fn pending_review(&self, conversation_id: Uuid) -> Result<PendingReview> {
        self.db
            .get_pending_checkpoint(conversation_id)
            .await?
            .map(|c| c.summary())
            .ok_or_else(|| WorkflowError::NoPendingReview(conversation_id).into())
    }

    /// Run items one at a time. Tracked items are skipped and failures are
    /// logged without stopping the batch.
    pub async fn process_batch(&self, items: Vec<SourceItem>) -> BatchReport {
        let mut report = BatchReport::default();

        for item in items {
            let source_id = item.id.clone();
            match self.db.get_tracked_item(&source_id).await {
                Ok(Some(tracked)) => {
                    debug!(source = %source_id, status = %tracked.status, "Already tracked, skipping");
                    report.skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(source = %source_id, error = %e, "Failed to check item tracking");
                    report.failed += 1;
                    continue;
                }
            }

            match self.start(item).await {
                Ok(RunOutcome::Completed { .. }) => report.completed += 1,
                Ok(RunOutcome::Suspended(_)) => report.suspended += 1,
                Err(e) => {
                    error!(source = %source_id, error = %e, "Workflow failed");
                    report.failed += 1;
                }
            }
        }

        if report != BatchReport::default() {
            info!(
                completed = report.completed,
                suspended = report.suspended,
                skipped = report.skipped,
                failed = report.failed,
                "Batch processed"
            );
        }
        report
    }

    /// Walk the graph from `node` until END or a suspension.
    async fn drive(&self, mut state: ConversationState, mut node: Node) -> Result<RunOutcome> {
        let mut handled = false;

        loop {
            debug!(conversation = %state.id, node = ?node, "Entering node");

            node = match node {
                Node::Triage => self.triage.route(&mut state).await?,
                Node::TriageGate => {
                    let request = self.triage_gate.suspend(&mut state);
                    return self.suspend(state, Gate::Triage, request).await;
                }
                Node::Call => {
                    self.agent.call(&mut state).await?;
                    Node::Route
                }
                Node::Route => ResponseAgentLoop::route(&state),
                Node::Dispatch { call_index } => {
                    match self.dispatch.run(&mut state, call_index).await? {
                        Step::Goto(next) => next,
                        Step::Suspend { gate, request } => {
                            return self.suspend(state, gate, request).await;
                        }
                    }
                }
                Node::Terminal => {
                    self.sink.finish(&state.source).await;
                    handled = true;
                    Node::End
                }
                Node::End => {
                    info!(
                        conversation = %state.id,
                        source = %state.source.id,
                        handled,
                        turns = state.messages.len(),
                        "Workflow completed"
                    );
                    return Ok(RunOutcome::Completed {
                        conversation_id: state.id,
                        classification: state.classification(),
                        handled,
                    });
                }
            };
        }
    }

    async fn suspend(
        &self,
        state: ConversationState,
        gate: Gate,
        request: ReviewRequest,
    ) -> Result<RunOutcome> {
        let checkpoint = Checkpoint::new(state, gate, request);
        self.db.save_checkpoint(&checkpoint).await?;

        info!(
            conversation = %checkpoint.conversation_id,
            gate = gate.as_str(),
            action = %checkpoint.request.action,
            "Workflow suspended for review"
        );
        Ok(RunOutcome::Suspended(checkpoint.summary()))
    }

    /// Record the item status for a finished run.
    async fn finish(&self, source_id: &str, result: Result<RunOutcome>) -> Result<RunOutcome> {
        let status = match &result {
            Ok(RunOutcome::Suspended(_)) => ItemStatus::Suspended,
            Ok(RunOutcome::Completed { handled: true, .. }) => ItemStatus::Completed,
            Ok(RunOutcome::Completed { handled: false, .. }) => ItemStatus::Ignored,
            Err(e) => {
                error!(source = %source_id, error = %e, "Workflow failed");
                ItemStatus::Failed
            }
        };
        self.set_status(source_id, status).await;
        result
    }

    async fn set_status(&self, source_id: &str, status: ItemStatus) {
        if let Err(e) = self.db.set_item_status(source_id, status).await {
            warn!(source = %source_id, status = %status, error = %e, "Failed to update item status");
        }
    }
}
