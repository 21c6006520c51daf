//! Lookup orchestrator: one command out, one correlated reply back.

use crate::domain::config::{ChannelConfig, TimeoutConfig};
use crate::domain::error::{bounded, LookupError, MAX_RAW_EXCERPT_LEN};
use crate::domain::parse::ResponseParser;
use crate::domain::pending::{CorrelatorError, PendingReplyStore};
use crate::domain::types::LookupOutcome;
use crate::ipc::session::{SessionError, SessionHandle};
use dashmap::DashMap;
use shared_channel::{DestinationId, InboundReply, MessageBody, MessageChannel};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Stand-in for a deadline past the representable range of `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Runs lookups against the messaging session.
///
/// Exchanges on one destination are serialized; different destinations
/// proceed in parallel.
pub struct LookupOrchestrator {
    session: Arc<SessionHandle>,
    channel: Arc<dyn MessageChannel>,
    pending: Arc<PendingReplyStore>,
    parser: Arc<dyn ResponseParser>,
    /// Per-destination exchange locks
    exchange_locks: DashMap<DestinationId, Arc<Mutex<()>>>,
    timeouts: TimeoutConfig,
    command_keyword: String,
    download_dir: PathBuf,
}

impl LookupOrchestrator {
    pub fn new(
        session: Arc<SessionHandle>,
        channel: Arc<dyn MessageChannel>,
        pending: Arc<PendingReplyStore>,
        parser: Arc<dyn ResponseParser>,
        timeouts: TimeoutConfig,
        channel_config: &ChannelConfig,
    ) -> Self {
        Self {
            session,
            channel,
            pending,
            parser,
            exchange_locks: DashMap::new(),
            timeouts,
            command_keyword: channel_config.command_keyword.clone(),
            download_dir: channel_config.download_dir.clone(),
        }
    }

    /// Send the lookup command for `query` and turn the reply into an outcome.
    pub async fn lookup(&self, query: &str) -> Result<LookupOutcome, LookupError> {
        let start = Instant::now();
        let request_deadline = deadline_after(start, self.timeouts.request);

        // 1. Session
        let destination = match timeout_at(request_deadline, self.session.ensure_ready()).await {
            Ok(Ok(destination)) => destination,
            Ok(Err(e)) => return Err(session_error(&e)),
            Err(_) => {
                return Err(LookupError::SessionUnavailable(
                    "session setup timed out".to_string(),
                ))
            }
        };

        // 2. Exclusive exchange on the destination
        let lock = Arc::clone(
            self.exchange_locks
                .entry(destination.id)
                .or_default()
                .value(),
        );
        let _exchange = timeout_at(request_deadline, lock.lock_owned())
            .await
            .map_err(|_| LookupError::CorrelationTimeout {
                waited: start.elapsed(),
            })?;

        let mut wait = self.pending.reserve(destination.id).map_err(|e| {
            warn!(destination = %destination.id, error = %e, "Reply slot unavailable");
            LookupError::Internal(e.to_string())
        })?;

        // 3. Send; dropping `wait` on error releases the reservation
        let command = format!("{} {}", self.command_keyword, query);
        let token = match timeout_at(request_deadline, self.channel.send(&destination, &command)).await
        {
            Ok(Ok(token)) => token,
            Ok(Err(e)) => {
                warn!(destination = %destination.id, error = %e, "Failed to send command");
                return Err(LookupError::SendFailed(e.to_string()));
            }
            Err(_) => return Err(LookupError::SendFailed("send timed out".to_string())),
        };
        let sent_at = Instant::now();
        info!(destination = %destination.id, token = %token, command = %command, "Sent command");

        // 4. Arm
        wait.arm(token)
            .map_err(|e| LookupError::Internal(e.to_string()))?;

        // 5. Await the correlated reply
        let deadline = request_deadline.min(deadline_after(sent_at, self.timeouts.reply));
        let reply = wait.wait_until(deadline).await.map_err(|e| match e {
            CorrelatorError::TimedOut { .. } => LookupError::CorrelationTimeout {
                waited: start.elapsed(),
            },
            other => LookupError::Internal(other.to_string()),
        })?;
        debug!(
            token = %token,
            message_id = %reply.message_id,
            file = reply.body.is_file(),
            "Received correlated reply"
        );

        // 6. Materialize
        let text = timeout_at(request_deadline, self.materialize(&reply))
            .await
            .map_err(|_| LookupError::CorrelationTimeout {
                waited: start.elapsed(),
            })??;

        // 7. Parse
        let fields = self.parser.parse(&text);
        debug!(fields = fields.len(), elapsed_ms = start.elapsed().as_millis(), "Parsed reply");
        Ok(LookupOutcome::success(query, fields))
    }

    /// Reply body as text. Downloaded files are removed once read.
    async fn materialize(&self, reply: &InboundReply) -> Result<String, LookupError> {
        let text = match &reply.body {
            MessageBody::Text { text } => text.clone(),
            MessageBody::File { file_name, size } => {
                debug!(file_name = %file_name, size = size, "Downloading reply file");
                let path = self
                    .channel
                    .download_payload(reply, &self.download_dir)
                    .await
                    .map_err(|e| LookupError::ParseFailure {
                        reason: e.to_string(),
                        raw_excerpt: None,
                    })?;

                let read = tokio::fs::read(&path).await;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove downloaded file");
                }
                let bytes = read.map_err(|e| LookupError::ParseFailure {
                    reason: e.to_string(),
                    raw_excerpt: None,
                })?;

                match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
                        return Err(LookupError::ParseFailure {
                            reason: "reply file is not valid UTF-8".to_string(),
                            raw_excerpt: Some(bounded(&lossy, MAX_RAW_EXCERPT_LEN)),
                        });
                    }
                }
            }
        };

        if text.trim().is_empty() {
            return Err(LookupError::ParseFailure {
                reason: "empty reply".to_string(),
                raw_excerpt: None,
            });
        }
        Ok(text)
    }

    /// Number of outstanding correlated waits
    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }
}

/// `from + budget`, saturating at a far-future instant
fn deadline_after(from: Instant, budget: Duration) -> Instant {
    from.checked_add(budget)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

fn session_error(error: &SessionError) -> LookupError {
    if error.is_no_destination() {
        LookupError::NoDestination
    } else {
        LookupError::SessionUnavailable(error.to_string())
    }
}
