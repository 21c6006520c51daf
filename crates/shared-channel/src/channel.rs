//! # Message Channel
//!
//! The capability the gateway consumes from a messaging session.

use crate::events::{Destination, DialogInfo, InboundReply, MessageToken};
use crate::subscriber::Subscription;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from channel operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The session has not been connected yet.
    #[error("channel not connected")]
    NotConnected,

    /// Connecting to the messaging network failed.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// No eligible conversation to send commands to.
    #[error("no eligible destination found")]
    DestinationNotFound,

    /// The destination is unknown to the session.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    /// Sending a message failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The message carries no downloadable payload.
    #[error("message {0} has no downloadable payload")]
    NoPayload(MessageToken),

    /// Downloading a payload failed.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// The channel was shut down.
    #[error("channel closed")]
    Closed,
}

/// Messaging session as seen by the gateway.
///
/// Implementations wrap a real network client; [`crate::InMemoryChannel`]
/// is the reference implementation.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Open the underlying connection. Calling it on a connected channel is
    /// a no-op.
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Whether the connected session is logged in.
    async fn is_authorized(&self) -> Result<bool, ChannelError>;

    /// List up to `limit` dialogs in the session's display order.
    async fn list_dialogs(&self, limit: usize) -> Result<Vec<DialogInfo>, ChannelError>;

    /// Pick the conversation commands should go to.
    ///
    /// The default implementation applies [`select_destination`] to the
    /// first `limit` dialogs.
    async fn resolve_destination(&self, limit: usize) -> Result<Destination, ChannelError> {
        let dialogs = self.list_dialogs(limit).await?;
        select_destination(&dialogs).ok_or(ChannelError::DestinationNotFound)
    }

    /// Post `text` to `destination`, returning the token assigned to it.
    async fn send(&self, destination: &Destination, text: &str)
        -> Result<MessageToken, ChannelError>;

    /// Subscribe to every message posted on `destination` from now on.
    fn subscribe(&self, destination: &Destination) -> Result<Subscription, ChannelError>;

    /// Download the document attached to `reply` into `dir`, returning the
    /// written path. The caller owns the file and must delete it.
    async fn download_payload(
        &self,
        reply: &InboundReply,
        dir: &Path,
    ) -> Result<PathBuf, ChannelError>;
}

/// Destination selection rules.
///
/// 1. The first pinned group or pinned channel, in dialog order.
/// 2. Otherwise the first group, pinned or not.
/// 3. Otherwise nothing.
pub fn select_destination(dialogs: &[DialogInfo]) -> Option<Destination> {
    dialogs
        .iter()
        .find(|d| d.pinned && (d.is_group() || d.is_channel()))
        .or_else(|| dialogs.iter().find(|d| d.is_group()))
        .map(Destination::from)
}
