//! # Subscription
//!
//! Receiving side of a channel: a broadcast receiver narrowed to one
//! destination.

use crate::events::{DestinationId, InboundReply};
use tokio::sync::broadcast;
use tracing::warn;

/// A subscription handle for messages on one destination.
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<InboundReply>,

    /// Destination this subscription is narrowed to.
    destination: DestinationId,
}

impl Subscription {
    /// Create a new subscription.
    pub fn new(receiver: broadcast::Receiver<InboundReply>, destination: DestinationId) -> Self {
        Self {
            receiver,
            destination,
        }
    }

    /// Receive the next message posted on the destination.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next matching message
    /// - `None` - The channel was closed
    pub async fn recv(&mut self) -> Option<InboundReply> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(
                        destination = %self.destination,
                        lagged = count,
                        "Subscriber lagged, some messages dropped"
                    );
                    continue;
                }
            };

            if message.destination == self.destination {
                return Some(message);
            }
        }
    }

    /// Destination this subscription listens on.
    #[must_use]
    pub fn destination(&self) -> DestinationId {
        self.destination
    }
}
