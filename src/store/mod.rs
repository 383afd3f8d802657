//! Persistence layer: libSQL-backed storage for preferences, checkpoints and
//! tracked items.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, ItemStatus, TrackedItem};
