//! Response types for the public API.

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field added to every parsed reply.
pub const QUERY_TIMESTAMP_FIELD: &str = "query_timestamp";

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "Telegram FAM API";

/// A successful lookup, as returned to callers and held in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupOutcome {
    pub success: bool,
    /// Identifier as the caller supplied it (trimmed)
    pub upi_id: String,
    /// Parsed fields plus `query_timestamp`
    pub data: BTreeMap<String, String>,
    /// When the lookup completed
    pub timestamp: String,
}

impl LookupOutcome {
    /// Build a successful outcome, stamping both timestamps now
    pub fn success(upi_id: impl Into<String>, mut data: BTreeMap<String, String>) -> Self {
        let now = timestamp_now();
        data.insert(QUERY_TIMESTAMP_FIELD.to_string(), now.clone());
        Self {
            success: true,
            upi_id: upi_id.into(),
            data,
            timestamp: now,
        }
    }
}

/// `GET /health` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub service: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: timestamp_now(),
            service: SERVICE_NAME.to_string(),
        }
    }
}

/// `GET /` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub endpoint: String,
    pub example: String,
    pub description: String,
    pub health_check: String,
    pub note: String,
    pub max_retries: u32,
}

impl ServiceInfo {
    pub fn new(max_retries: u32) -> Self {
        Self {
            service: "Telegram FAM Information API".to_string(),
            endpoint: "/api?fam=upi@fam".to_string(),
            example: "/api?fam=priyanshis@fam".to_string(),
            description: "Query FAM information via Telegram bot".to_string(),
            health_check: "/health".to_string(),
            note: "First request may be slow as it initializes Telegram session".to_string(),
            max_retries,
        }
    }
}

/// Local time in RFC 3339 with millisecond precision
pub fn timestamp_now() -> String {
    let now: DateTime<Local> = Local::now();
    now.to_rfc3339_opts(SecondsFormat::Millis, false)
}
