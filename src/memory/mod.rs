//! Persistent preference memory.

pub mod preferences;

pub use preferences::{PreferenceKey, PreferenceMemory};
