//! Background poller: fetch unseen mail and run each new item through the
//! workflow engine.
//!
//! Items stay unseen in the mailbox until the terminal sink marks them, so
//! the engine's item tracking is what stops a second workflow for the same
//! UID on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::channels::Mailbox;
use crate::workflow::WorkflowEngine;
use crate::workflow::engine::BatchReport;

/// Spawn a background task that polls the mailbox every `interval`.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_email_poller(
    mailbox: Arc<dyn Mailbox>,
    engine: Arc<WorkflowEngine>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            mailbox = mailbox.name(),
            interval_secs = interval.as_secs(),
            "Email poller started"
        );

        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Email poller shutting down");
                return;
            }

            poll_once(mailbox.as_ref(), &engine).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle.
pub async fn poll_once(mailbox: &dyn Mailbox, engine: &WorkflowEngine) -> BatchReport {
    let items = match mailbox.fetch_unseen().await {
        Ok(items) => items,
        Err(e) => {
            error!("Email poll failed: {e}");
            return BatchReport::default();
        }
    };

    if items.is_empty() {
        return BatchReport::default();
    }

    debug!("Fetched {} unseen emails", items.len());
    engine.process_batch(items).await
}
