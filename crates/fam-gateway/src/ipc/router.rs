//! Reply router: forwards the destination's subscription into the inbox.

use shared_channel::{InboundReply, Subscription};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Moves every message observed on the destination into the listener's
/// inbox, preserving arrival order.
pub struct ReplyRouter {
    subscription: Subscription,
    inbox: mpsc::Sender<InboundReply>,
}

impl ReplyRouter {
    pub fn new(subscription: Subscription, inbox: mpsc::Sender<InboundReply>) -> Self {
        Self {
            subscription,
            inbox,
        }
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the router loop until either side closes
    pub async fn run(mut self) {
        let destination = self.subscription.destination();
        debug!(destination = %destination, "Reply router started");

        while let Some(message) = self.subscription.recv().await {
            if self.inbox.send(message).await.is_err() {
                debug!(destination = %destination, "Inbox closed, stopping router");
                return;
            }
        }

        warn!(destination = %destination, "Channel subscription closed, stopping router");
    }
}
