// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! FAM Gateway - synchronous HTTP lookups over an asynchronous messaging
//! session.
//!
//! A caller asks `GET /api?fam=alice@fam`; the gateway posts `/fam alice@fam`
//! to the session's destination conversation, waits for the bot's reply to
//! that exact message, parses it and answers with JSON.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          FAM GATEWAY                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐                          ┌─────────────┐           │
//! │  │  HTTP API   │                          │    Admin    │           │
//! │  │  Port 5000  │                          │  Port 8081  │           │
//! │  └──────┬──────┘                          └─────────────┘           │
//! │         │                                                           │
//! │  ┌──────┴─────────────────────────────────────┐                     │
//! │  │ Lookup Facade: validate → cache → limiter  │                     │
//! │  └──────┬─────────────────────────────────────┘                     │
//! │         │                                                           │
//! │  ┌──────┴─────────────────────────────────────┐                     │
//! │  │ Lookup Orchestrator                        │                     │
//! │  │ session → reserve → send → arm → wait      │                     │
//! │  └──────┬───────────────────────────▲─────────┘                     │
//! │         │                           │ oneshot                       │
//! │         │                  ┌────────┴──────────┐                    │
//! │         │                  │ Pending Reply     │                    │
//! │         │                  │ Store (correlator)│                    │
//! │         │                  └────────▲──────────┘                    │
//! │         │                           │                               │
//! │         │        Reply Router → inbox → Reply Listener              │
//! └─────────┼───────────────────────────▲───────────────────────────────┘
//!           │ send                      │ subscribe
//!           ▼                           │
//!                   MessageChannel (shared-channel)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fam_gateway::{ApiGatewayService, GatewayConfig};
//!
//! let service = ApiGatewayService::new(GatewayConfig::default(), channel)?;
//! service.start(shutdown_signal()).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod facade;
pub mod ipc;
pub mod middleware;
pub mod service;

// Re-exports for public API
pub use domain::config::GatewayConfig;
pub use domain::error::{ApiError, GatewayError, LookupError};
pub use domain::parse::{FamResponseParser, ResponseParser};
pub use domain::pending::PendingReplyStore;
pub use domain::types::*;
pub use facade::LookupFacade;
pub use ipc::{LookupOrchestrator, SessionHandle};
pub use middleware::GatewayMetrics;
pub use service::ApiGatewayService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
