//! Mailgate: mail triage and reply drafting with a human reviewer at every
//! consequential step.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod store;
pub mod tools;
pub mod workflow;
