//! # In-Memory Channel
//!
//! A complete [`MessageChannel`] backed by `tokio::sync::broadcast`.
//!
//! Used by the test suites and by the node's loopback mode. Peers (a bot
//! answering commands, a test) post into the channel with
//! [`InMemoryChannel::post_reply`] and [`InMemoryChannel::post_file_reply`].

use crate::channel::{ChannelError, MessageChannel};
use crate::events::{
    Destination, DestinationId, DialogInfo, InboundReply, MessageBody, MessageToken,
};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// In-memory messaging session.
pub struct InMemoryChannel {
    /// Broadcast sender for every message posted on any dialog.
    sender: broadcast::Sender<InboundReply>,

    /// Dialogs in display order.
    dialogs: RwLock<Vec<DialogInfo>>,

    /// Document contents keyed by the message that carries them.
    files: RwLock<HashMap<MessageToken, (String, Vec<u8>)>>,

    /// Messages sent by this session, oldest first.
    sent: RwLock<Vec<InboundReply>>,

    /// Next message token to hand out.
    next_message_id: AtomicI64,

    /// Whether `connect()` has been called.
    connected: AtomicBool,

    /// Whether the session is logged in.
    authorized: AtomicBool,

    /// Failure injection for `connect()`.
    fail_connect: AtomicBool,

    /// Failure injection for `send()`.
    fail_sends: AtomicBool,

    /// Number of `connect()` calls.
    connect_calls: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryChannel {
    /// Create an authorized channel with no dialogs and default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an authorized channel with the given broadcast capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            dialogs: RwLock::new(Vec::new()),
            files: RwLock::new(HashMap::new()),
            sent: RwLock::new(Vec::new()),
            next_message_id: AtomicI64::new(1),
            connected: AtomicBool::new(false),
            authorized: AtomicBool::new(true),
            fail_connect: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            connect_calls: AtomicU64::new(0),
            capacity,
        }
    }

    /// Builder-style: append a dialog.
    #[must_use]
    pub fn with_dialog(self, dialog: DialogInfo) -> Self {
        self.add_dialog(dialog);
        self
    }

    /// Append a dialog.
    pub fn add_dialog(&self, dialog: DialogInfo) {
        if let Ok(mut dialogs) = self.dialogs.write() {
            dialogs.push(dialog);
        }
    }

    /// Set whether the session is logged in.
    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    /// Make subsequent `connect()` calls fail.
    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `send()` calls fail.
    pub fn set_send_failure(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Messages sent by this session, oldest first.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<InboundReply> {
        self.sent.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of times `connect()` was called.
    #[must_use]
    pub fn connect_calls(&self) -> u64 {
        self.connect_calls.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Broadcast capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Post a text message from a peer, optionally replying to `in_reply_to`.
    pub fn post_reply(
        &self,
        destination: DestinationId,
        sender: &str,
        in_reply_to: Option<MessageToken>,
        text: impl Into<String>,
    ) -> MessageToken {
        self.post(destination, sender, false, in_reply_to, MessageBody::text(text))
    }

    /// Post a document from a peer, replying to `in_reply_to`.
    pub fn post_file_reply(
        &self,
        destination: DestinationId,
        sender: &str,
        in_reply_to: Option<MessageToken>,
        file_name: impl Into<String>,
        contents: Vec<u8>,
    ) -> MessageToken {
        let file_name = file_name.into();
        let body = MessageBody::File {
            file_name: file_name.clone(),
            size: contents.len() as u64,
        };
        let token = self.allocate_token();
        if let Ok(mut files) = self.files.write() {
            files.insert(token, (file_name, contents));
        }
        self.publish(InboundReply {
            message_id: token,
            destination,
            sender: sender.to_string(),
            outgoing: false,
            in_reply_to,
            body,
        });
        token
    }

    fn post(
        &self,
        destination: DestinationId,
        sender: &str,
        outgoing: bool,
        in_reply_to: Option<MessageToken>,
        body: MessageBody,
    ) -> MessageToken {
        let message = InboundReply {
            message_id: self.allocate_token(),
            destination,
            sender: sender.to_string(),
            outgoing,
            in_reply_to,
            body,
        };
        let token = message.message_id;
        self.publish(message);
        token
    }

    fn publish(&self, message: InboundReply) {
        let token = message.message_id;
        let destination = message.destination;
        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(
                    message_id = %token,
                    destination = %destination,
                    receivers = receivers,
                    "Message published"
                );
            }
            Err(_) => {
                debug!(
                    message_id = %token,
                    destination = %destination,
                    "Message published with no subscribers"
                );
            }
        }
    }

    fn allocate_token(&self) -> MessageToken {
        MessageToken(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    fn ensure_connected(&self) -> Result<(), ChannelError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChannelError::NotConnected)
        }
    }

    fn knows(&self, destination: DestinationId) -> bool {
        self.dialogs
            .read()
            .map(|d| d.iter().any(|dialog| dialog.id == destination))
            .unwrap_or(false)
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        self.connect_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ChannelError::ConnectFailed("injected failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, ChannelError> {
        self.ensure_connected()?;
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    async fn list_dialogs(&self, limit: usize) -> Result<Vec<DialogInfo>, ChannelError> {
        self.ensure_connected()?;
        let dialogs = self.dialogs.read().map_err(|_| ChannelError::Closed)?;
        Ok(dialogs.iter().take(limit).cloned().collect())
    }

    async fn send(
        &self,
        destination: &Destination,
        text: &str,
    ) -> Result<MessageToken, ChannelError> {
        self.ensure_connected()?;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed("injected failure".into()));
        }
        if !self.knows(destination.id) {
            return Err(ChannelError::UnknownDestination(destination.name.clone()));
        }

        let message = InboundReply {
            message_id: self.allocate_token(),
            destination: destination.id,
            sender: "self".into(),
            outgoing: true,
            in_reply_to: None,
            body: MessageBody::text(text),
        };
        let token = message.message_id;
        if let Ok(mut sent) = self.sent.write() {
            sent.push(message.clone());
        }
        self.publish(message);
        Ok(token)
    }

    fn subscribe(&self, destination: &Destination) -> Result<Subscription, ChannelError> {
        self.ensure_connected()?;
        debug!(destination = %destination.id, "New subscription created");
        Ok(Subscription::new(self.sender.subscribe(), destination.id))
    }

    async fn download_payload(
        &self,
        reply: &InboundReply,
        dir: &Path,
    ) -> Result<PathBuf, ChannelError> {
        self.ensure_connected()?;
        if !reply.body.is_file() {
            return Err(ChannelError::NoPayload(reply.message_id));
        }

        let (file_name, contents) = {
            let files = self.files.read().map_err(|_| ChannelError::Closed)?;
            files
                .get(&reply.message_id)
                .cloned()
                .ok_or(ChannelError::NoPayload(reply.message_id))?
        };

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ChannelError::DownloadFailed(e.to_string()))?;

        // Prefix with the token so concurrent downloads of same-named files
        // never collide.
        let path = dir.join(format!("{}_{}", reply.message_id, sanitize(&file_name)));
        tokio::fs::write(&path, contents).await.map_err(|e| {
            warn!(path = %path.display(), error = %e, "Payload write failed");
            ChannelError::DownloadFailed(e.to_string())
        })?;

        Ok(path)
    }
}

fn sanitize(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
