//! Cross-crate tests: gateway, node wiring and the in-memory channel.

pub mod flows;
pub mod properties;
