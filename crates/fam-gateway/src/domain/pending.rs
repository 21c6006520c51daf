//! Pending Reply Store - correlates inbound replies with the command that
//! is awaiting them.
//!
//! Flow:
//! 1. Orchestrator calls `reserve()` for the destination before sending
//! 2. Orchestrator sends the command and `arm()`s the wait with its token
//! 3. Listener hands every inbound reply to `on_inbound_reply()`
//! 4. The reply whose `in_reply_to` equals the armed token fulfils the wait
//! 5. Orchestrator awaits `wait_until(deadline)` or times out
//!
//! Replies that land between steps 1 and 2 are buffered on the reservation
//! and matched when the token is armed. A [`PendingWait`] removes its own
//! registration when dropped, so a cancelled caller never leaves one behind.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use shared_channel::{DestinationId, InboundReply, MessageToken};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Replies buffered on a reservation that has not been armed yet.
const MAX_EARLY_REPLIES: usize = 16;

/// Correlator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelatorError {
    /// The destination already has an outstanding wait
    #[error("a reply is already pending for destination {0}")]
    AlreadyPending(DestinationId),

    /// The reservation is gone (fulfilled, timed out or released)
    #[error("no reservation for destination {0}")]
    NotReserved(DestinationId),

    /// `wait_until` was called before `arm`
    #[error("wait for destination {0} was never armed")]
    NotArmed(DestinationId),

    /// No matching reply before the deadline
    #[error("no reply within {}ms", waited.as_millis())]
    TimedOut { waited: Duration },

    /// The slot was dropped without a reply
    #[error("wait cancelled")]
    Cancelled,
}

/// A registered wait
struct PendingSlot {
    /// Identifies the owning `PendingWait`
    wait_id: u64,
    /// Token of the outbound command, once sent
    token: Option<MessageToken>,
    /// Result slot
    sender: oneshot::Sender<InboundReply>,
    /// Replies seen before the token was known
    early: Vec<InboundReply>,
    /// When the reservation was made
    created_at: Instant,
}

/// Statistics for the pending reply store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total waits registered
    pub total_registered: AtomicU64,
    /// Total waits fulfilled
    pub total_completed: AtomicU64,
    /// Total waits timed out
    pub total_timeouts: AtomicU64,
    /// Total waits cancelled (dropped or released)
    pub total_cancelled: AtomicU64,
    /// Total replies that matched nothing
    pub total_ignored: AtomicU64,
}

/// Point-in-time view of the store, served on the admin port
#[derive(Debug, Clone, Serialize)]
pub struct PendingSnapshot {
    pub pending: usize,
    pub total_registered: u64,
    pub total_completed: u64,
    pub total_timeouts: u64,
    pub total_cancelled: u64,
    pub total_ignored: u64,
    pub waits: Vec<PendingWaitInfo>,
}

/// One active wait in a [`PendingSnapshot`]
#[derive(Debug, Clone, Serialize)]
pub struct PendingWaitInfo {
    pub destination: DestinationId,
    pub token: Option<MessageToken>,
    pub age_ms: u64,
}

/// Correlator: at most one outstanding wait per destination.
pub struct PendingReplyStore {
    /// Map of destination to its pending wait
    pending: DashMap<DestinationId, PendingSlot>,
    /// Source of wait ids
    next_wait_id: AtomicU64,
    /// Statistics
    stats: Arc<PendingStats>,
}

impl PendingReplyStore {
    /// Create a new store
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_wait_id: AtomicU64::new(1),
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Reserve the destination's slot before the command is sent.
    ///
    /// Fails with [`CorrelatorError::AlreadyPending`] while another wait on
    /// the same destination is outstanding.
    pub fn reserve(
        self: &Arc<Self>,
        destination: DestinationId,
    ) -> Result<PendingWait, CorrelatorError> {
        let (tx, rx) = oneshot::channel();
        let wait_id = self.next_wait_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        match self.pending.entry(destination) {
            Entry::Occupied(_) => {
                warn!(destination = %destination, "Reply already pending for destination");
                return Err(CorrelatorError::AlreadyPending(destination));
            }
            Entry::Vacant(e) => {
                e.insert(PendingSlot {
                    wait_id,
                    token: None,
                    sender: tx,
                    early: Vec::new(),
                    created_at: now,
                });
            }
        }

        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(destination = %destination, wait_id = wait_id, "Reserved reply slot");

        Ok(PendingWait {
            store: Arc::clone(self),
            destination,
            wait_id,
            token: None,
            reserved_at: now,
            receiver: rx,
            finished: false,
        })
    }

    /// Reserve and arm in one step, for callers that already hold a token.
    pub fn register(
        self: &Arc<Self>,
        destination: DestinationId,
        token: MessageToken,
    ) -> Result<PendingWait, CorrelatorError> {
        let mut wait = self.reserve(destination)?;
        wait.arm(token)?;
        Ok(wait)
    }

    /// Offer an inbound reply to the wait registered for its destination.
    ///
    /// Returns true if the reply fulfilled a wait.
    pub fn on_inbound_reply(&self, reply: InboundReply) -> bool {
        let Some(in_reply_to) = reply.in_reply_to else {
            return self.ignore(&reply, "not a reply");
        };

        let mut entry = match self.pending.entry(reply.destination) {
            Entry::Occupied(e) => e,
            Entry::Vacant(_) => return self.ignore(&reply, "no pending wait"),
        };

        let armed = entry.get().token;
        match armed {
            Some(token) if token == in_reply_to => {
                let slot = entry.remove();
                self.deliver(slot, reply)
            }
            Some(_) => {
                drop(entry);
                self.ignore(&reply, "token mismatch")
            }
            None => {
                let slot = entry.get_mut();
                if slot.early.len() < MAX_EARLY_REPLIES {
                    debug!(
                        destination = %reply.destination,
                        message_id = %reply.message_id,
                        "Buffered reply for unarmed wait"
                    );
                    slot.early.push(reply);
                } else {
                    drop(entry);
                    self.ignore(&reply, "early buffer full");
                }
                false
            }
        }
    }

    /// Number of outstanding waits
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a wait is outstanding for `destination`
    pub fn is_pending(&self, destination: DestinationId) -> bool {
        self.pending.contains_key(&destination)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    /// Snapshot for the admin port
    pub fn snapshot(&self) -> PendingSnapshot {
        let now = Instant::now();
        let waits = self
            .pending
            .iter()
            .map(|entry| PendingWaitInfo {
                destination: *entry.key(),
                token: entry.token,
                age_ms: now.duration_since(entry.created_at).as_millis() as u64,
            })
            .collect();

        PendingSnapshot {
            pending: self.pending.len(),
            total_registered: self.stats.total_registered.load(Ordering::Relaxed),
            total_completed: self.stats.total_completed.load(Ordering::Relaxed),
            total_timeouts: self.stats.total_timeouts.load(Ordering::Relaxed),
            total_cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
            total_ignored: self.stats.total_ignored.load(Ordering::Relaxed),
            waits,
        }
    }

    fn arm(
        &self,
        destination: DestinationId,
        wait_id: u64,
        token: MessageToken,
    ) -> Result<(), CorrelatorError> {
        let mut entry = match self.pending.entry(destination) {
            Entry::Occupied(e) if e.get().wait_id == wait_id => e,
            _ => return Err(CorrelatorError::NotReserved(destination)),
        };

        let early_match = {
            let slot = entry.get_mut();
            slot.token = Some(token);
            let matched = slot
                .early
                .iter()
                .position(|r| r.replies_to(token))
                .map(|pos| slot.early.remove(pos));
            let discarded = slot.early.len() as u64;
            slot.early.clear();
            self.stats
                .total_ignored
                .fetch_add(discarded, Ordering::Relaxed);
            matched
        };

        debug!(destination = %destination, token = %token, "Armed reply slot");

        if let Some(reply) = early_match {
            let slot = entry.remove();
            self.deliver(slot, reply);
        }
        Ok(())
    }

    fn deliver(&self, slot: PendingSlot, reply: InboundReply) -> bool {
        let destination = reply.destination;
        let message_id = reply.message_id;
        let elapsed = slot.created_at.elapsed();

        match slot.sender.send(reply) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    destination = %destination,
                    message_id = %message_id,
                    response_time_ms = elapsed.as_millis(),
                    "Completed pending wait"
                );
                true
            }
            Err(_) => {
                // Receiver was dropped (caller cancelled)
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(destination = %destination, "Pending wait receiver dropped");
                false
            }
        }
    }

    fn ignore(&self, reply: &InboundReply, reason: &'static str) -> bool {
        self.stats.total_ignored.fetch_add(1, Ordering::Relaxed);
        debug!(
            destination = %reply.destination,
            message_id = %reply.message_id,
            reason = reason,
            "Ignored inbound reply"
        );
        false
    }

    /// Remove the slot owned by `wait_id`, if it is still there.
    fn release(&self, destination: DestinationId, wait_id: u64) -> bool {
        self.pending
            .remove_if(&destination, |_, slot| slot.wait_id == wait_id)
            .is_some()
    }
}

impl Default for PendingReplyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a reserved reply slot.
///
/// Dropping it before a reply arrives releases the registration.
pub struct PendingWait {
    store: Arc<PendingReplyStore>,
    destination: DestinationId,
    wait_id: u64,
    token: Option<MessageToken>,
    reserved_at: Instant,
    receiver: oneshot::Receiver<InboundReply>,
    finished: bool,
}

impl PendingWait {
    /// Attach the token of the sent command. A buffered reply to that token
    /// fulfils the wait immediately.
    pub fn arm(&mut self, token: MessageToken) -> Result<(), CorrelatorError> {
        self.store.arm(self.destination, self.wait_id, token)?;
        self.token = Some(token);
        Ok(())
    }

    /// Destination this wait belongs to
    pub fn destination(&self) -> DestinationId {
        self.destination
    }

    /// Armed token, if any
    pub fn token(&self) -> Option<MessageToken> {
        self.token
    }

    /// Wait for the matching reply until the absolute `deadline`.
    ///
    /// On timeout the registration is removed before returning.
    pub async fn wait_until(mut self, deadline: Instant) -> Result<InboundReply, CorrelatorError> {
        if self.token.is_none() {
            return Err(CorrelatorError::NotArmed(self.destination));
        }

        let outcome = tokio::time::timeout_at(deadline, &mut self.receiver).await;
        self.finished = true;

        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(CorrelatorError::Cancelled),
            Err(_) => {
                let waited = self.reserved_at.elapsed();
                if self.store.release(self.destination, self.wait_id) {
                    self.store
                        .stats
                        .total_timeouts
                        .fetch_add(1, Ordering::Relaxed);
                }
                // A reply may have landed between the deadline and release
                if let Ok(reply) = self.receiver.try_recv() {
                    return Ok(reply);
                }
                warn!(
                    destination = %self.destination,
                    token = ?self.token,
                    waited_ms = waited.as_millis(),
                    "Timed out waiting for reply"
                );
                Err(CorrelatorError::TimedOut { waited })
            }
        }
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.store.release(self.destination, self.wait_id) {
            self.store
                .stats
                .total_cancelled
                .fetch_add(1, Ordering::Relaxed);
            debug!(destination = %self.destination, "Released reply slot");
        }
    }
}
