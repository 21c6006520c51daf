//! Sliding-window rate limiter.
//!
//! Keeps the instants of recent admissions in arrival order; an admission is
//! granted while fewer than `max_requests` fall inside the trailing window.
//! Rejections are immediate and never queue.

use crate::domain::config::RateLimitConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed
    Admitted,
    /// Request refused; the oldest admission leaves the window after `retry_after`
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Limiter counters for the admin port
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_ms: u64,
    pub in_window: usize,
    pub total_admitted: u64,
    pub total_rejected: u64,
}

/// Process-wide admission control
pub struct RateLimiter {
    /// Admission instants, oldest first
    admissions: Mutex<VecDeque<Instant>>,
    /// Configuration
    config: RateLimitConfig,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            admissions: Mutex::new(VecDeque::with_capacity(config.max_requests as usize)),
            config,
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Check and record one admission
    pub fn try_admit(&self) -> Admission {
        self.try_admit_at(Instant::now())
    }

    fn try_admit_at(&self, now: Instant) -> Admission {
        if !self.config.enabled {
            self.admitted.fetch_add(1, Ordering::Relaxed);
            return Admission::Admitted;
        }

        let mut admissions = self.admissions.lock();
        while let Some(oldest) = admissions.front() {
            if now.duration_since(*oldest) >= self.config.window {
                admissions.pop_front();
            } else {
                break;
            }
        }

        if admissions.len() < self.config.max_requests as usize {
            admissions.push_back(now);
            self.admitted.fetch_add(1, Ordering::Relaxed);
            return Admission::Admitted;
        }

        let retry_after = admissions
            .front()
            .map(|oldest| self.config.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(self.config.window);
        self.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(
            in_window = admissions.len(),
            retry_after_ms = retry_after.as_millis(),
            "Rate limit exceeded"
        );
        Admission::Rejected { retry_after }
    }

    /// Snapshot for the admin port
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let now = Instant::now();
        let in_window = self
            .admissions
            .lock()
            .iter()
            .filter(|at| now.duration_since(**at) < self.config.window)
            .count();
        RateLimitSnapshot {
            enabled: self.config.enabled,
            max_requests: self.config.max_requests,
            window_ms: self.config.window.as_millis() as u64,
            in_window,
            total_admitted: self.admitted.load(Ordering::Relaxed),
            total_rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
