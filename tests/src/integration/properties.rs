//! # Component Guarantees
//!
//! Checks the correlator, cache and admission limiter against the guarantees
//! the lookup flow depends on, using paused time where clocks matter.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fam_gateway::domain::cache::TtlCache;
    use fam_gateway::domain::config::RateLimitConfig;
    use fam_gateway::domain::pending::CorrelatorError;
    use fam_gateway::domain::rate_limit::{Admission, RateLimiter};
    use fam_gateway::PendingReplyStore;
    use proptest::prelude::*;
    use shared_channel::{DestinationId, InboundReply, MessageBody, MessageToken};
    use tokio::time::{advance, Instant};

    const DEST: DestinationId = DestinationId(7);

    fn reply(id: i64, in_reply_to: i64, text: &str) -> InboundReply {
        InboundReply {
            message_id: MessageToken(id),
            destination: DEST,
            sender: "fam_bot".to_string(),
            outgoing: false,
            in_reply_to: Some(MessageToken(in_reply_to)),
            body: MessageBody::text(text),
        }
    }

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_requests,
            window: Duration::from_secs(60),
        })
    }

    // =============================================================================
    // AT MOST ONE WAIT PER DESTINATION
    // =============================================================================

    #[tokio::test]
    async fn test_second_registration_fails_without_overwriting() {
        let store = Arc::new(PendingReplyStore::new());
        let first = store.register(DEST, MessageToken(10)).unwrap();

        assert_eq!(
            store.register(DEST, MessageToken(11)).err(),
            Some(CorrelatorError::AlreadyPending(DEST))
        );
        assert_eq!(store.reserve(DEST).err(), Some(CorrelatorError::AlreadyPending(DEST)));

        // The original wait is intact and still fulfilled by its own token
        assert!(store.on_inbound_reply(reply(20, 10, "NAME: First")));
        let got = first
            .wait_until(Instant::now() + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got.body.as_text(), Some("NAME: First"));

        // Slot is free again
        assert!(store.register(DEST, MessageToken(12)).is_ok());
    }

    // =============================================================================
    // CORRELATION
    // =============================================================================

    #[tokio::test]
    async fn test_only_matching_reply_fulfils_and_duplicates_are_ignored() {
        let store = Arc::new(PendingReplyStore::new());
        let wait = store.register(DEST, MessageToken(5)).unwrap();

        assert!(!store.on_inbound_reply(reply(30, 4, "stale")));
        assert!(!store.on_inbound_reply(reply(31, 6, "other")));
        assert!(store.on_inbound_reply(reply(32, 5, "NAME: Match")));
        assert!(!store.on_inbound_reply(reply(33, 5, "NAME: Duplicate")));

        let got = wait
            .wait_until(Instant::now() + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got.message_id, MessageToken(32));
        assert_eq!(
            store
                .stats()
                .total_ignored
                .load(std::sync::atomic::Ordering::Relaxed),
            3
        );
    }

    proptest! {
        #[test]
        fn prop_wait_sees_first_reply_to_its_token(
            tokens in proptest::collection::vec(0i64..8, 1..24),
            target in 0i64..8,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let store = Arc::new(PendingReplyStore::new());
                let wait = store.register(DEST, MessageToken(target)).unwrap();

                let mut fulfilled = 0;
                for (i, token) in tokens.iter().enumerate() {
                    if store.on_inbound_reply(reply(100 + i as i64, *token, "x")) {
                        fulfilled += 1;
                    }
                }

                let expected = tokens.iter().position(|t| *t == target);
                prop_assert_eq!(fulfilled, usize::from(expected.is_some()));

                let result = wait
                    .wait_until(Instant::now() + Duration::from_millis(10))
                    .await;
                match expected {
                    Some(i) => prop_assert_eq!(
                        result.map(|r| r.message_id),
                        Ok(MessageToken(100 + i as i64))
                    ),
                    None => prop_assert!(
                        matches!(result, Err(CorrelatorError::TimedOut { .. })),
                        "expected timeout"
                    ),
                }
                prop_assert_eq!(store.pending_count(), 0);
                Ok(())
            })?;
        }
    }

    // =============================================================================
    // TIMEOUT CLEANUP
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_after_timeout_is_ignored() {
        let store = Arc::new(PendingReplyStore::new());
        let wait = store.register(DEST, MessageToken(9)).unwrap();

        let result = wait
            .wait_until(Instant::now() + Duration::from_secs(25))
            .await;
        assert!(matches!(result, Err(CorrelatorError::TimedOut { .. })));
        assert!(!store.is_pending(DEST));

        assert!(!store.on_inbound_reply(reply(40, 9, "NAME: Late")));
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.snapshot().total_timeouts, 1);
    }

    // =============================================================================
    // CACHE FRESHNESS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_cache_entry_fresh_until_ttl() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(300), 0);
        cache.put("alice@fam", "v".to_string());

        advance(Duration::from_millis(299_999)).await;
        assert_eq!(cache.get("alice@fam"), Some("v".to_string()));

        advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("alice@fam"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_put_refreshes_expiry() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(300), 0);
        cache.put("k", 1);
        advance(Duration::from_secs(200)).await;
        cache.put("k", 2);
        advance(Duration::from_secs(200)).await;

        assert_eq!(cache.get("k"), Some(2));
    }

    // =============================================================================
    // RATE WINDOW
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_window_restores_one_slot_per_expired_admission() {
        let limiter = limiter(15);

        for _ in 0..15 {
            assert!(limiter.try_admit().is_admitted());
            advance(Duration::from_secs(1)).await;
        }
        match limiter.try_admit() {
            Admission::Rejected { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(45));
            }
            Admission::Admitted => panic!("sixteenth admission accepted"),
        }

        // Oldest admission (t=0) ages out at t=60
        advance(Duration::from_secs(45)).await;
        assert!(limiter.try_admit().is_admitted());
        assert!(!limiter.try_admit().is_admitted());

        // Second oldest (t=1) ages out one second later
        advance(Duration::from_secs(1)).await;
        assert!(limiter.try_admit().is_admitted());
        assert!(!limiter.try_admit().is_admitted());
    }
}
