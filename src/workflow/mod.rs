//! Human-in-the-loop workflow: triage, drafting loop, review gates.
//!
//! ```text
//! Triage ─┬─ ignore ──────────────────────────────────────────────► End
//!         ├─ notify ─► TriageGate ─┬─ ignore ─────────────────────► End
//!         │                        └─ respond ─┐
//!         └─ respond ──────────────────────────┴► Call ─► Route ─┬─► Terminal ─► End
//!                                                  ▲             │
//!                                                  └── Dispatch ◄┘
//! ```

pub mod agent_loop;
pub mod circuit;
pub mod dispatch;
pub mod engine;
pub mod review;
pub mod routes;
pub mod sink;
pub mod state;
pub mod triage;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{RunOutcome, WorkflowEngine};
pub use review::{Checkpoint, Gate, PendingReview, ReviewDecision, ReviewRequest};
pub use state::{Classification, ConversationState, SourceItem};

/// A position in the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Triage,
    TriageGate,
    Call,
    Route,
    Dispatch { call_index: usize },
    Terminal,
    End,
}

/// What a node hands back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Goto(Node),
    Suspend { gate: Gate, request: ReviewRequest },
}
