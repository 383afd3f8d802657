//! Mailbox abstraction for inbound items and outbound replies.

pub mod email;
pub mod email_poller;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use email::{EmailConfig, ImapMailbox};
pub use email_poller::spawn_email_poller;

use crate::error::ChannelError;
use crate::workflow::state::SourceItem;

/// A reply to send through a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingReply {
    pub to: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Message-ID of the item being answered, for threading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

/// A source of mail items and a sink for replies.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Mailbox name for logs and errors.
    fn name(&self) -> &str;

    /// Fetch items not yet marked as read. Must not change their flags.
    async fn fetch_unseen(&self) -> Result<Vec<SourceItem>, ChannelError>;

    /// Mark an item as handled.
    async fn mark_as_read(&self, id: &str) -> Result<(), ChannelError>;

    async fn send_reply(&self, reply: OutgoingReply) -> Result<(), ChannelError>;
}
