//! # Lookup Flows
//!
//! Drives the public router end to end: HTTP request, facade, orchestrator,
//! in-memory channel, bot reply, correlator, parsed JSON.
//!
//! ## Flows Tested
//!
//! 1. First lookup is sent, answered, parsed and cached
//! 2. Repeat lookups inside the TTL never reach the channel
//! 3. Blank identifiers are rejected before any side effect
//! 4. Unanswered lookups time out, are not cached and leave no wait behind
//! 5. The sixteenth admitted miss inside a minute is rate limited
//! 6. Document replies are downloaded, parsed and removed

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    use fam_gateway::{ApiGatewayService, GatewayConfig};
    use fam_node::loopback::{loopback_destination, SILENT_PREFIX};
    use fam_node::{loopback_channel, LoopbackResponder};
    use shared_channel::{InMemoryChannel, MessageToken};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Gateway wired to a loopback channel whose bot answers every command
    async fn gateway_with_bot(
        config: GatewayConfig,
        as_file: bool,
    ) -> (ApiGatewayService, Arc<InMemoryChannel>) {
        let channel = loopback_channel();
        LoopbackResponder::new(channel.clone(), config.channel.command_keyword.clone())
            .with_file_replies(as_file)
            .spawn()
            .await
            .unwrap();
        let service = ApiGatewayService::new(config, channel.clone()).unwrap();
        (service, channel)
    }

    /// Gateway wired to a loopback channel with nobody answering
    fn gateway_without_bot(config: GatewayConfig) -> (ApiGatewayService, Arc<InMemoryChannel>) {
        let channel = loopback_channel();
        let service = ApiGatewayService::new(config, channel.clone()).unwrap();
        (service, channel)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(get(uri)).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Wait until the gateway has sent `count` commands, then return the last token
    async fn nth_sent(channel: &InMemoryChannel, count: usize) -> MessageToken {
        loop {
            let sent = channel.sent_messages();
            if sent.len() >= count {
                return sent[count - 1].message_id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    // =============================================================================
    // FLOW 1 + 2: SUCCESS, THEN CACHED
    // =============================================================================

    #[tokio::test]
    async fn test_first_lookup_is_parsed_and_cached() {
        let (service, channel) = gateway_without_bot(GatewayConfig::default());
        let router = service.http_router();

        let request = tokio::spawn(get_json(router.clone(), "/api?fam=alice@fam"));
        let token = nth_sent(&channel, 1).await;
        assert_eq!(
            channel.sent_messages()[0].body.as_text(),
            Some("/fam alice@fam")
        );
        channel.post_reply(
            loopback_destination().id,
            "fam_bot",
            Some(token),
            "NAME: Alice\nUPI: alice@fam",
        );

        let (status, body) = request.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["upi_id"], "alice@fam");
        assert_eq!(body["data"]["name"], "Alice");
        assert_eq!(body["data"]["upi"], "alice@fam");
        assert!(body["data"]["query_timestamp"].is_string());

        // Served from cache: identical body, no second command
        let (status, cached) = get_json(router, "/api?fam=ALICE@fam").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cached, body);
        assert_eq!(channel.sent_messages().len(), 1);
        assert_eq!(service.facade().limiter().snapshot().total_admitted, 1);
    }

    #[tokio::test]
    async fn test_repeat_within_ttl_skips_channel() {
        let (service, channel) = gateway_with_bot(GatewayConfig::default(), false).await;
        let router = service.http_router();

        let (status, first) = get_json(router.clone(), "/api?fam=bob@fam").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["data"]["status"], "ACTIVE");

        for _ in 0..5 {
            let (status, body) = get_json(router.clone(), "/api?fam=%20bob@fam%20").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, first);
        }
        assert_eq!(channel.sent_messages().len(), 1);

        let metrics = service.facade().metrics().to_json();
        assert_eq!(metrics["cache"]["hits"], 5);
        assert_eq!(metrics["cache"]["misses"], 1);
    }

    // =============================================================================
    // FLOW 3: VALIDATION
    // =============================================================================

    #[tokio::test]
    async fn test_blank_identifier_has_no_side_effects() {
        let (service, channel) = gateway_without_bot(GatewayConfig::default());
        let router = service.http_router();

        for uri in ["/api?fam=", "/api", "/api?fam=%20"] {
            let (status, body) = get_json(router.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["code"], "validation_error");
        }

        assert_eq!(channel.connect_calls(), 0);
        assert!(channel.sent_messages().is_empty());
        assert!(service.facade().cache().is_empty());
        assert_eq!(service.facade().limiter().snapshot().total_admitted, 0);
    }

    // =============================================================================
    // FLOW 4: TIMEOUT, NO NEGATIVE CACHING
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_lookup_times_out_without_caching() {
        let (service, channel) = gateway_with_bot(GatewayConfig::default(), false).await;
        let router = service.http_router();
        let uri = format!("/api?fam={SILENT_PREFIX}@fam");

        let started = tokio::time::Instant::now();
        let (status, body) = get_json(router.clone(), &uri).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["code"], "correlation_timeout");
        assert_eq!(body["max_retries"], 3);
        assert!(started.elapsed() >= Duration::from_secs(25));
        assert!(started.elapsed() < Duration::from_secs(30));

        assert!(service.facade().cache().is_empty());
        assert_eq!(service.pending_store().pending_count(), 0);

        // The next call with the same identifier runs the whole flow again
        let (status, _) = get_json(router, &uri).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(channel.sent_messages().len(), 2);

        let snapshot = service.pending_store().snapshot();
        assert_eq!(snapshot.total_timeouts, 2);
        assert_eq!(snapshot.pending, 0);
    }

    // =============================================================================
    // FLOW 5: RATE LIMIT
    // =============================================================================

    #[tokio::test]
    async fn test_sixteenth_miss_in_window_is_rejected() {
        let (service, channel) = gateway_with_bot(GatewayConfig::default(), false).await;
        let router = service.http_router();

        for i in 0..15 {
            let (status, body) = get_json(router.clone(), &format!("/api?fam=user{i}@fam")).await;
            assert_eq!(status, StatusCode::OK, "call {i}: {body}");
        }

        let response = router
            .clone()
            .oneshot(get("/api?fam=user15@fam"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
        assert_eq!(channel.sent_messages().len(), 15);

        // Cached identifiers are still served while limited
        let (status, _) = get_json(router, "/api?fam=user0@fam").await;
        assert_eq!(status, StatusCode::OK);
    }

    // =============================================================================
    // FLOW 6: DOCUMENT REPLIES
    // =============================================================================

    #[tokio::test]
    async fn test_document_reply_is_read_and_removed() {
        let downloads = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.channel.download_dir = downloads.path().to_path_buf();
        let (service, _channel) = gateway_with_bot(config, true).await;

        let (status, body) = get_json(service.http_router(), "/api?fam=carol@fam").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "carol");
        assert_eq!(body["data"]["fam_id"], "carol@fam");

        let leftovers = std::fs::read_dir(downloads.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    // =============================================================================
    // CONCURRENCY AND OBSERVABILITY
    // =============================================================================

    #[tokio::test]
    async fn test_concurrent_lookups_each_get_their_own_reply() {
        let (service, channel) = gateway_with_bot(GatewayConfig::default(), false).await;
        let router = service.http_router();

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let router = router.clone();
                tokio::spawn(async move {
                    get_json(router, &format!("/api?fam=peer{i}@fam")).await
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let (status, body) = handle.await.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["upi_id"], format!("peer{i}@fam"));
            assert_eq!(body["data"]["upi"], format!("peer{i}@fam"));
        }
        assert_eq!(channel.sent_messages().len(), 5);
        assert_eq!(service.pending_store().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let (service, _channel) = gateway_without_bot(GatewayConfig::default());
        let request_id = "0192b3c4-0000-7000-8000-000000000001";

        let response = service
            .http_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", request_id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], request_id);
    }

    #[tokio::test]
    async fn test_admin_reports_session_after_lookup() {
        let (service, _channel) = gateway_with_bot(GatewayConfig::default(), false).await;

        let (status, _) = get_json(service.http_router(), "/api?fam=dave@fam").await;
        assert_eq!(status, StatusCode::OK);

        let (status, metrics) = get_json(service.admin_router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(metrics["requests"]["total"], 1);
        assert_eq!(metrics["requests"]["success"], 1);
        assert_eq!(metrics["session"]["state"], "ready");
    }
}
