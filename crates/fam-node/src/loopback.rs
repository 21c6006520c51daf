//! Loopback bot for running the gateway without a real messaging network.
//!
//! Answers every outgoing `"{keyword} {id}"` command on the destination with a
//! canned FAM record. Identifiers starting with `silent` get no answer so the
//! timeout path can be exercised by hand.

use shared_channel::{
    ChannelError, Destination, DialogInfo, DialogKind, InMemoryChannel, InboundReply,
    MessageChannel, Subscription,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Display name of the loopback bot.
pub const LOOPBACK_SENDER: &str = "fam_loopback_bot";

/// Identifier prefix that suppresses the reply.
pub const SILENT_PREFIX: &str = "silent";

/// Dialog id of the loopback group.
pub const LOOPBACK_DIALOG_ID: i64 = 1;

fn loopback_dialog() -> DialogInfo {
    DialogInfo::new(LOOPBACK_DIALOG_ID, "fam loopback", DialogKind::Group).pinned()
}

/// The group the gateway resolves to on a loopback channel.
pub fn loopback_destination() -> Destination {
    Destination::from(&loopback_dialog())
}

/// Build an in-memory channel with one pinned group for the gateway to target.
pub fn loopback_channel() -> Arc<InMemoryChannel> {
    Arc::new(InMemoryChannel::new().with_dialog(loopback_dialog()))
}

/// Answers commands posted by the gateway.
pub struct LoopbackResponder {
    channel: Arc<InMemoryChannel>,
    keyword: String,
    as_file: bool,
}

impl LoopbackResponder {
    pub fn new(channel: Arc<InMemoryChannel>, keyword: impl Into<String>) -> Self {
        Self {
            channel,
            keyword: keyword.into(),
            as_file: false,
        }
    }

    /// Answer with a document instead of inline text.
    pub fn with_file_replies(mut self, as_file: bool) -> Self {
        self.as_file = as_file;
        self
    }

    /// Connect, subscribe to the loopback group and answer in the background.
    pub async fn spawn(self) -> Result<JoinHandle<()>, ChannelError> {
        self.channel.connect().await?;
        let destination = loopback_destination();
        let subscription = self.channel.subscribe(&destination)?;
        info!(destination = %destination.id, as_file = self.as_file, "Loopback responder started");
        Ok(tokio::spawn(self.run(subscription)))
    }

    async fn run(self, mut subscription: Subscription) {
        while let Some(message) = subscription.recv().await {
            self.answer(&message);
        }
        debug!("Loopback responder stopped");
    }

    fn answer(&self, message: &InboundReply) {
        if !message.outgoing {
            return;
        }
        let Some(id) = message
            .body
            .as_text()
            .and_then(|text| command_argument(text, &self.keyword))
        else {
            return;
        };
        if id.to_lowercase().starts_with(SILENT_PREFIX) {
            debug!(fam_id = %id, "Staying silent");
            return;
        }

        let record = render_record(id);
        let reply_to = Some(message.message_id);
        if self.as_file {
            self.channel.post_file_reply(
                message.destination,
                LOOPBACK_SENDER,
                reply_to,
                format!("{id}.txt"),
                record.into_bytes(),
            );
        } else {
            self.channel
                .post_reply(message.destination, LOOPBACK_SENDER, reply_to, record);
        }
        debug!(fam_id = %id, reply_to = %message.message_id, "Loopback reply posted");
    }
}

fn command_argument<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.trim().strip_prefix(keyword)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let id = rest.trim();
    (!id.is_empty()).then_some(id)
}

fn render_record(id: &str) -> String {
    let name = id.split('@').next().unwrap_or(id);
    format!("FAM ID: {id}\nNAME: {name}\nUPI: {id}\nSTATUS: ACTIVE\n")
}
