//! Lookup facade: validation, cache, admission, then orchestration.
//!
//! Cache hits never touch the rate limiter or the session. Only successful
//! outcomes are cached. Concurrent misses on one key share a single fill:
//! followers wait for the leader, then re-read the cache.

use crate::domain::cache::TtlCache;
use crate::domain::error::LookupError;
use crate::domain::rate_limit::{Admission, RateLimiter};
use crate::domain::types::LookupOutcome;
use crate::ipc::handler::LookupOrchestrator;
use crate::middleware::metrics::{GatewayMetrics, RequestTimer};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Entry point for one API lookup
pub struct LookupFacade {
    orchestrator: Arc<LookupOrchestrator>,
    cache: Arc<TtlCache<LookupOutcome>>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<GatewayMetrics>,
    /// Cache keys with a fill in progress
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl LookupFacade {
    pub fn new(
        orchestrator: Arc<LookupOrchestrator>,
        cache: Arc<TtlCache<LookupOutcome>>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            limiter,
            metrics,
            inflight: DashMap::new(),
        }
    }

    /// Look up `query` (the raw `fam` parameter, possibly absent).
    pub async fn lookup(&self, query: Option<&str>) -> Result<LookupOutcome, LookupError> {
        let result = self.lookup_inner(query).await;
        match &result {
            Ok(_) => self.metrics.record_request(true),
            Err(e) => self.metrics.record_failure(e),
        }
        result
    }

    async fn lookup_inner(&self, query: Option<&str>) -> Result<LookupOutcome, LookupError> {
        let query = query.map(str::trim).unwrap_or_default();
        if query.is_empty() {
            return Err(LookupError::Validation);
        }

        let key = query.to_lowercase();
        if let Some(cached) = self.cached(&key) {
            return Ok(cached);
        }

        let fill = Arc::clone(self.inflight.entry(key.clone()).or_default().value());
        let _fill = fill.lock_owned().await;
        let result = self.fill(query, &key).await;
        // Map entry plus our guard: nobody else is waiting on this key
        self.inflight
            .remove_if(&key, |_, lock| Arc::strong_count(lock) <= 2);
        result
    }

    fn cached(&self, key: &str) -> Option<LookupOutcome> {
        let cached = self.cache.get(key)?;
        self.metrics.record_cache_hit();
        debug!(key = %key, "Cache hit");
        Some(cached)
    }

    /// Runs with the key's fill lock held
    async fn fill(&self, query: &str, key: &str) -> Result<LookupOutcome, LookupError> {
        if let Some(cached) = self.cached(key) {
            return Ok(cached);
        }
        self.metrics.record_cache_miss();

        if let Admission::Rejected { retry_after } = self.limiter.try_admit() {
            warn!(retry_after_ms = retry_after.as_millis() as u64, "Lookup rate limited");
            return Err(LookupError::RateLimited { retry_after });
        }

        let timer = RequestTimer::new(Arc::clone(&self.metrics));
        let result = self.orchestrator.lookup(query).await;
        timer.finish();

        match result {
            Ok(outcome) => {
                info!(upi_id = %query, "Lookup succeeded");
                self.cache.put(key, outcome.clone());
                Ok(outcome)
            }
            Err(e) => {
                warn!(upi_id = %query, code = e.code(), error = %e, "Lookup failed");
                Err(e)
            }
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache<LookupOutcome>> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn orchestrator(&self) -> &Arc<LookupOrchestrator> {
        &self.orchestrator
    }
}
