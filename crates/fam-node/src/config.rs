//! Node configuration: optional JSON file, then environment overrides.

use anyhow::{Context, Result};
use fam_gateway::domain::config::humantime_serde::parse_duration;
use fam_gateway::GatewayConfig;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_FILE_ENV: &str = "FAM_CONFIG";

/// Load configuration from `FAM_CONFIG` and the process environment.
pub fn load_config() -> Result<GatewayConfig> {
    let file = std::env::var(CONFIG_FILE_ENV).ok();
    load_config_from(file.as_deref().map(Path::new), |key| std::env::var(key).ok())
}

/// Load configuration from an optional file and an environment lookup.
pub fn load_config_from(
    file: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GatewayConfig> {
    let mut config = match file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: GatewayConfig = serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            info!(path = %path.display(), "Loaded configuration file");
            config
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, env);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn apply_env_overrides(config: &mut GatewayConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(port) = parsed(&env, "PORT") {
        config.http.port = port;
    }
    if let Some(host) = parsed(&env, "HOST") {
        config.http.host = host;
    }
    if let Some(port) = parsed(&env, "ADMIN_PORT") {
        config.admin.port = port;
    }
    if let Some(name) = env("SESSION_NAME") {
        config.channel.session_name = name;
    }
    if let Some(timeout) = duration(&env, "REQUEST_TIMEOUT") {
        config.timeouts.request = timeout;
    }
    if let Some(timeout) = duration(&env, "REPLY_TIMEOUT") {
        config.timeouts.reply = timeout;
    }
    if let Some(retries) = parsed(&env, "MAX_RETRIES") {
        config.max_retries = retries;
    }
    if let Some(limit) = parsed(&env, "RATE_LIMIT_PER_MINUTE") {
        config.rate_limit.max_requests = limit;
        config.rate_limit.window = Duration::from_secs(60);
    }
    if let Some(ttl) = duration(&env, "CACHE_TTL") {
        config.cache.ttl = ttl;
    }
    if let Some(dir) = env("DOWNLOAD_DIR") {
        config.channel.download_dir = dir.into();
    }
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

/// Plain numbers are seconds; `"500ms"`, `"30s"` and `"5m"` are accepted too.
fn duration(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = env(key)?;
    match parse_duration(raw.trim()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = key, value = %raw, error = e, "Ignoring unparsable duration override");
            None
        }
    }
}
