//! Messaging-session side of the gateway.
//!
//! The orchestrator sends commands through the [`shared_channel::MessageChannel`];
//! replies flow back through the router (subscription → inbox) and the
//! listener (inbox → correlator).

pub mod handler;
pub mod listener;
pub mod router;
pub mod session;

pub use handler::LookupOrchestrator;
pub use listener::ReplyListener;
pub use router::ReplyRouter;
pub use session::{SessionError, SessionHandle, SessionState, SessionStatus};
