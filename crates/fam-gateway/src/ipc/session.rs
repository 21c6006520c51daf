//! Session handle: owns the lifecycle of the messaging session.
//!
//! `Uninitialized → Connecting → Authorized → Ready{destination}`
//!
//! `ensure_ready` is idempotent and serialized. Reaching `Ready` subscribes
//! to the destination and starts the reply router and listener tasks that
//! feed the correlator.

use crate::domain::pending::PendingReplyStore;
use crate::ipc::listener::ReplyListener;
use crate::ipc::router::ReplyRouter;
use serde::Serialize;
use shared_channel::{ChannelError, Destination, MessageChannel};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Session setup failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("connect failed: {0}")]
    Connect(ChannelError),

    #[error("session not authorized")]
    Unauthorized,

    #[error("{0}")]
    Destination(ChannelError),

    #[error("subscribe failed: {0}")]
    Subscribe(ChannelError),
}

impl SessionError {
    /// True when the session works but no conversation qualifies
    pub fn is_no_destination(&self) -> bool {
        matches!(self, Self::Destination(ChannelError::DestinationNotFound))
    }
}

/// Lifecycle position of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Authorized,
    Ready { destination: Destination },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Authorized => "authorized",
            Self::Ready { .. } => "ready",
        }
    }
}

/// Session status for the admin port
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_name: String,
    pub state: &'static str,
    pub destination: Option<Destination>,
}

struct SessionInner {
    state: SessionState,
    /// Router and listener for the current destination
    tasks: Vec<JoinHandle<()>>,
}

/// Owned session state shared by every orchestration
pub struct SessionHandle {
    channel: Arc<dyn MessageChannel>,
    pending: Arc<PendingReplyStore>,
    inner: Mutex<SessionInner>,
    session_name: String,
    dialog_scan_limit: usize,
    inbox_capacity: usize,
}

impl SessionHandle {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        pending: Arc<PendingReplyStore>,
        session_name: impl Into<String>,
        dialog_scan_limit: usize,
        inbox_capacity: usize,
    ) -> Self {
        Self {
            channel,
            pending,
            inner: Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                tasks: Vec::new(),
            }),
            session_name: session_name.into(),
            dialog_scan_limit,
            inbox_capacity: inbox_capacity.max(1),
        }
    }

    /// Bring the session to `Ready` and return its destination.
    ///
    /// A failure leaves the session at the last state it reached, so the next
    /// call resumes from there.
    pub async fn ensure_ready(&self) -> Result<Destination, SessionError> {
        let mut inner = self.inner.lock().await;

        if let SessionState::Ready { destination } = &inner.state {
            if inner.tasks.iter().all(|t| !t.is_finished()) {
                return Ok(destination.clone());
            }
            warn!(destination = %destination.id, "Reply pipeline stopped, resubscribing");
            inner.state = SessionState::Authorized;
        }

        if matches!(
            inner.state,
            SessionState::Uninitialized | SessionState::Connecting
        ) {
            inner.state = SessionState::Connecting;
            debug!(session = %self.session_name, "Connecting session");

            if let Err(e) = self.channel.connect().await {
                inner.state = SessionState::Uninitialized;
                warn!(session = %self.session_name, error = %e, "Session connect failed");
                return Err(SessionError::Connect(e));
            }

            match self.channel.is_authorized().await {
                Ok(true) => inner.state = SessionState::Authorized,
                Ok(false) => {
                    inner.state = SessionState::Uninitialized;
                    warn!(session = %self.session_name, "Session is not authorized");
                    return Err(SessionError::Unauthorized);
                }
                Err(e) => {
                    inner.state = SessionState::Uninitialized;
                    return Err(SessionError::Connect(e));
                }
            }
        }

        let destination = self
            .channel
            .resolve_destination(self.dialog_scan_limit)
            .await
            .map_err(|e| {
                warn!(session = %self.session_name, error = %e, "Destination resolution failed");
                SessionError::Destination(e)
            })?;

        let subscription = self
            .channel
            .subscribe(&destination)
            .map_err(SessionError::Subscribe)?;

        for task in inner.tasks.drain(..) {
            task.abort();
        }
        let (inbox_tx, inbox_rx) = mpsc::channel(self.inbox_capacity);
        inner.tasks.push(ReplyRouter::new(subscription, inbox_tx).spawn());
        inner
            .tasks
            .push(ReplyListener::new(Arc::clone(&self.pending), inbox_rx).spawn());

        info!(
            session = %self.session_name,
            destination = %destination.id,
            name = %destination.name,
            kind = ?destination.kind,
            "Session ready"
        );
        inner.state = SessionState::Ready {
            destination: destination.clone(),
        };
        Ok(destination)
    }

    /// Current state
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    /// Status for the admin port
    pub async fn status(&self) -> SessionStatus {
        let state = self.state().await;
        let destination = match &state {
            SessionState::Ready { destination } => Some(destination.clone()),
            _ => None,
        };
        SessionStatus {
            session_name: self.session_name.clone(),
            state: state.label(),
            destination,
        }
    }

    /// Stop the reply pipeline
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        for task in inner.tasks.drain(..) {
            task.abort();
        }
        if matches!(inner.state, SessionState::Ready { .. }) {
            inner.state = SessionState::Authorized;
        }
        debug!(session = %self.session_name, "Session pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_channel::{DestinationId, DialogInfo, DialogKind, InMemoryChannel};

    fn handle(channel: Arc<InMemoryChannel>) -> SessionHandle {
        SessionHandle::new(
            channel,
            Arc::new(PendingReplyStore::new()),
            "test_session",
            100,
            16,
        )
    }

    fn group_channel() -> Arc<InMemoryChannel> {
        Arc::new(
            InMemoryChannel::new()
                .with_dialog(DialogInfo::new(1, "friend", DialogKind::User))
                .with_dialog(DialogInfo::new(42, "fam lookups", DialogKind::Group).pinned()),
        )
    }

    #[tokio::test]
    async fn test_ensure_ready_is_idempotent() {
        let channel = group_channel();
        let session = handle(Arc::clone(&channel));

        let first = session.ensure_ready().await.unwrap();
        let second = session.ensure_ready().await.unwrap();

        assert_eq!(first.id, DestinationId(42));
        assert_eq!(first, second);
        assert_eq!(channel.connect_calls(), 1);
        assert_eq!(channel.subscriber_count(), 1);
        assert_eq!(session.state().await.label(), "ready");
    }

    #[tokio::test]
    async fn test_unauthorized_session() {
        let channel = group_channel();
        channel.set_authorized(false);
        let session = handle(Arc::clone(&channel));

        assert_eq!(
            session.ensure_ready().await,
            Err(SessionError::Unauthorized)
        );
        assert_eq!(session.state().await, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_connect_failure_then_recovery() {
        let channel = group_channel();
        channel.set_connect_failure(true);
        let session = handle(Arc::clone(&channel));

        assert!(matches!(
            session.ensure_ready().await,
            Err(SessionError::Connect(_))
        ));

        channel.set_connect_failure(false);
        assert!(session.ensure_ready().await.is_ok());
        assert_eq!(channel.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_no_destination_keeps_authorized() {
        let channel = Arc::new(
            InMemoryChannel::new().with_dialog(DialogInfo::new(1, "friend", DialogKind::User)),
        );
        let session = handle(Arc::clone(&channel));

        let err = session.ensure_ready().await.unwrap_err();
        assert!(err.is_no_destination());
        assert_eq!(session.state().await, SessionState::Authorized);

        // A group shows up later; no reconnect needed
        channel.add_dialog(DialogInfo::new(7, "new group", DialogKind::Group));
        assert_eq!(
            session.ensure_ready().await.unwrap().id,
            DestinationId(7)
        );
        assert_eq!(channel.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_pipeline() {
        let channel = group_channel();
        let session = handle(Arc::clone(&channel));
        session.ensure_ready().await.unwrap();

        session.shutdown().await;
        assert_eq!(session.state().await, SessionState::Authorized);

        let status = session.status().await;
        assert_eq!(status.state, "authorized");
        assert!(status.destination.is_none());
    }
}
