//! # Shared Channel - Messaging Session Abstraction
//!
//! The gateway never talks to a messaging network directly. Everything it
//! needs from a session is expressed by the [`MessageChannel`] trait:
//!
//! ```text
//! ┌──────────────┐   send("/fam id")    ┌──────────────┐
//! │   Gateway    │ ───────────────────→ │ Destination  │
//! │              │                      │ (group chat) │
//! │              │ ←─────────────────── │              │
//! └──────────────┘   subscribe() events └──────────────┘
//! ```
//!
//! ## Contents
//!
//! - [`events`] - message, dialog and destination types
//! - [`channel`] - the `MessageChannel` trait and destination selection rules
//! - [`memory`] - `InMemoryChannel`, a broadcast-backed channel for tests and
//!   loopback deployments
//! - [`subscriber`] - per-destination subscription handle

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod channel;
pub mod events;
pub mod memory;
pub mod subscriber;

// Re-export main types
pub use channel::{select_destination, ChannelError, MessageChannel};
pub use events::{
    Destination, DestinationId, DialogInfo, DialogKind, InboundReply, MessageBody, MessageToken,
};
pub use memory::InMemoryChannel;
pub use subscriber::Subscription;

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Number of dialogs scanned when resolving a destination.
pub const DEFAULT_DIALOG_SCAN_LIMIT: usize = 100;
