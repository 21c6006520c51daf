//! Reply listener: drains the inbox into the correlator.

use crate::domain::pending::PendingReplyStore;
use shared_channel::InboundReply;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Hands each inbound reply to the correlator in arrival order.
///
/// Our own outgoing messages and blank texts never complete a wait.
pub struct ReplyListener {
    pending: Arc<PendingReplyStore>,
    inbox: mpsc::Receiver<InboundReply>,
}

impl ReplyListener {
    pub fn new(pending: Arc<PendingReplyStore>, inbox: mpsc::Receiver<InboundReply>) -> Self {
        Self { pending, inbox }
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the listener loop
    pub async fn run(mut self) {
        while let Some(reply) = self.inbox.recv().await {
            self.handle_reply(reply);
        }
        warn!("Reply inbox closed, stopping listener");
    }

    fn handle_reply(&self, reply: InboundReply) {
        if reply.outgoing {
            debug!(message_id = %reply.message_id, "Skipping outgoing message");
            return;
        }
        if reply.body.is_empty() {
            debug!(message_id = %reply.message_id, "Skipping reply with empty body");
            return;
        }
        if self.pending.on_inbound_reply(reply) {
            debug!("Reply delivered to pending wait");
        }
    }
}
