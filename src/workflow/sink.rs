use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channels::Mailbox;
use crate::workflow::state::SourceItem;

/// Marks handled items as read in the mailbox. Never fails.
pub struct TerminalSink {
    mailbox: Arc<dyn Mailbox>,
    synthetic_prefixes: Vec<String>,
}

impl TerminalSink {
    pub fn new(mailbox: Arc<dyn Mailbox>, synthetic_prefixes: Vec<String>) -> Self {
        Self {
            mailbox,
            synthetic_prefixes,
        }
    }

    /// Ids that do not correspond to a real mailbox item.
    pub fn is_synthetic(&self, id: &str) -> bool {
        id.is_empty() || self.synthetic_prefixes.iter().any(|p| id.starts_with(p.as_str()))
    }

    /// Returns whether the mailbox was updated.
    pub async fn finish(&self, source: &SourceItem) -> bool {
        if self.is_synthetic(&source.id) {
            debug!(source = %source.id, "Synthetic item, not marking as read");
            return false;
        }

        match self.mailbox.mark_as_read(&source.id).await {
            Ok(()) => {
                info!(source = %source.id, mailbox = self.mailbox.name(), "Item marked as read");
                true
            }
            Err(e) => {
                warn!(source = %source.id, error = %e, "Failed to mark item as read");
                false
            }
        }
    }
}
