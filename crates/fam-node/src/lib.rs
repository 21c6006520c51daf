//! # FAM Node
//!
//! Process wiring for the FAM lookup gateway: configuration loading and the
//! loopback channel used when no network transport is linked in.

pub mod config;
pub mod loopback;

pub use config::{load_config, load_config_from};
pub use loopback::{loopback_channel, LoopbackResponder};
