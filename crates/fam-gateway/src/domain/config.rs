//! Gateway configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for the request and reply timeouts
pub const MAX_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public HTTP server configuration
    pub http: HttpConfig,
    /// Admin server configuration (localhost only by default)
    pub admin: AdminConfig,
    /// Admission limit configuration
    pub rate_limit: RateLimitConfig,
    /// Result cache configuration
    pub cache: CacheConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Messaging session configuration
    pub channel: ChannelConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Retry count advertised to clients; the gateway itself never retries
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            admin: AdminConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            timeouts: TimeoutConfig::default(),
            channel: ChannelConfig::default(),
            cors: CorsConfig::default(),
            max_retries: 3,
        }
    }
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.enabled && self.http.port == self.admin.port && self.http.host == self.admin.host
        {
            return Err(ConfigError::DuplicatePorts);
        }

        if self.rate_limit.enabled && self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_requests cannot be 0".into(),
            ));
        }

        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("window cannot be 0".into()));
        }

        if self.cache.ttl.is_zero() {
            return Err(ConfigError::InvalidCache("ttl cannot be 0".into()));
        }

        if self.cache.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidCache("sweep_interval cannot be 0".into()));
        }

        if self.timeouts.request.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.reply.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "reply timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.request > MAX_TIMEOUT || self.timeouts.reply > MAX_TIMEOUT {
            return Err(ConfigError::InvalidTimeout(format!(
                "timeouts cannot exceed {}s",
                MAX_TIMEOUT.as_secs()
            )));
        }

        if self.channel.command_keyword.trim().is_empty() {
            return Err(ConfigError::Invalid("command_keyword cannot be empty".into()));
        }

        if self.channel.inbox_capacity == 0 {
            return Err(ConfigError::Invalid("inbox_capacity cannot be 0".into()));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Get Admin server bind address
    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.admin.host, self.admin.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 5000)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 5000,
        }
    }
}

/// Admin server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address (localhost only by default)
    pub host: IpAddr,
    /// Port (default: 8081)
    pub port: u16,
    /// Enable admin server
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8081,
            enabled: true,
        }
    }
}

/// Global admission limit: at most `max_requests` lookups per `window`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Admissions allowed per window
    pub max_requests: u32,
    /// Rolling window length
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 15,
            window: Duration::from_secs(60),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness window for a cached result
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Upper bound on stored entries (0 = unbounded)
    pub max_entries: usize,
    /// How often expired entries are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 10_000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total wall-clock budget for one lookup
    #[serde(with = "humantime_serde")]
    pub request: Duration,
    /// Longest wait for the reply once the command is sent
    #[serde(with = "humantime_serde")]
    pub reply: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            reply: Duration::from_secs(25),
        }
    }
}

/// Messaging session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Command prefix sent before the query identifier
    pub command_keyword: String,
    /// Session name (used by transports that persist session files)
    pub session_name: String,
    /// Dialogs scanned when resolving the destination
    pub dialog_scan_limit: usize,
    /// Where document replies are downloaded before being read
    pub download_dir: PathBuf,
    /// Capacity of the reply inbox between router and listener
    pub inbox_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_keyword: "/fam".to_string(),
            session_name: "fam_bot_session".to_string(),
            dialog_scan_limit: shared_channel::DEFAULT_DIALOG_SCAN_LIMIT,
            download_dir: PathBuf::from("downloads"),
            inbox_capacity: 256,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Max age for preflight cache in seconds
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Public and admin servers share an address
    #[error("duplicate ports configured")]
    DuplicatePorts,
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid cache configuration
    #[error("invalid cache: {0}")]
    InvalidCache(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse `"30s"`, `"500ms"`, `"5m"` or plain seconds.
    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.port, 5000);
        assert_eq!(config.rate_limit.max_requests, 15);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.timeouts.reply, Duration::from_secs(25));
        assert_eq!(config.channel.command_keyword, "/fam");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_duplicate_ports() {
        let mut config = GatewayConfig::default();
        config.admin.host = config.http.host;
        config.admin.port = config.http.port;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePorts)
        ));
    }

    #[test]
    fn test_rate_limit_validation() {
        let mut config = GatewayConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRateLimit(_))
        ));

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = GatewayConfig::default();
        config.timeouts.reply = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_oversized_timeouts_rejected() {
        let mut config = GatewayConfig::default();
        config.timeouts.request = Duration::from_secs(u64::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));

        config.timeouts.request = MAX_TIMEOUT;
        assert!(config.validate().is_ok());

        config.timeouts.reply = MAX_TIMEOUT + Duration::from_millis(1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "http": { "port": 9000 },
            "timeouts": { "reply": "500ms" },
            "cache": { "ttl": "5m" },
            "max_retries": 5
        }"#;
        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.timeouts.reply, Duration::from_millis(500));
        assert_eq!(config.timeouts.request, Duration::from_secs(30));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_duration_round_trip_format() {
        let config = GatewayConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["timeouts"]["reply"], "25s");
        assert_eq!(json["rate_limit"]["window"], "60s");
    }

    #[test]
    fn test_parse_duration_formats() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_duration_minutes_overflow() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("307445734561825861m"), Err("invalid minutes"));
        assert_eq!(
            parse_duration("307445734561825860m"),
            Ok(Duration::from_secs(307_445_734_561_825_860 * 60))
        );
    }
}
