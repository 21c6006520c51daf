//! # FAM Gateway Benchmarks
//!
//! Hot paths of a lookup that do not involve waiting on the bot:
//!
//! | Component | Operation | Target |
//! |-----------|-----------|--------|
//! | Parser | Parse a full FAM reply | < 50µs |
//! | Cache | Hit on a populated cache | < 1µs |
//! | Limiter | Admission check | < 1µs |
//! | Correlator | Register, match and complete | < 5µs |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fam_gateway::domain::cache::TtlCache;
use fam_gateway::domain::config::RateLimitConfig;
use fam_gateway::domain::rate_limit::RateLimiter;
use fam_gateway::{FamResponseParser, PendingReplyStore, ResponseParser};
use shared_channel::{DestinationId, InboundReply, MessageBody, MessageToken};
use std::sync::Arc;
use std::time::Duration;

const FULL_REPLY: &str = "FAM ID: alice@fam\nNAME: Alice Example\nPHONE: 9999999999\n\
TYPE: Personal\nUPI: alice@fam\nBANK: Example Bank\nACCOUNT: XXXX1234\n\
IFSC: EXMP0001234\nSTATUS: ACTIVE\nTIMESTAMP: 2024-01-01 10:00:00\n";

// ============================================================================
// Parser
// ============================================================================

fn bench_parser(c: &mut Criterion) {
    let parser = FamResponseParser::new().expect("static patterns compile");
    let mut group = c.benchmark_group("parser");

    group.bench_function("full_reply", |b| {
        b.iter(|| black_box(parser.parse(black_box(FULL_REPLY))))
    });
    group.bench_function("unrecognized_reply", |b| {
        b.iter(|| black_box(parser.parse(black_box("No record found for that identifier"))))
    });

    group.finish();
}

// ============================================================================
// Cache
// ============================================================================

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    for size in [100usize, 10_000] {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(300), 0);
        for i in 0..size {
            cache.put(format!("user{i}@fam"), FULL_REPLY.to_string());
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("hit", size), &cache, |b, cache| {
            b.iter(|| black_box(cache.get(black_box("user42@fam"))))
        });
        group.bench_with_input(BenchmarkId::new("miss", size), &cache, |b, cache| {
            b.iter(|| black_box(cache.get(black_box("nobody@fam"))))
        });
    }

    group.finish();
}

// ============================================================================
// Rate limiter
// ============================================================================

fn bench_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");

    // Saturated: every check walks the full window and rejects
    let limiter = RateLimiter::new(RateLimitConfig {
        enabled: true,
        max_requests: 15,
        window: Duration::from_secs(3600),
    });
    for _ in 0..15 {
        limiter.try_admit();
    }
    group.bench_function("rejected", |b| b.iter(|| black_box(limiter.try_admit())));

    let disabled = RateLimiter::new(RateLimitConfig {
        enabled: false,
        ..RateLimitConfig::default()
    });
    group.bench_function("disabled", |b| b.iter(|| black_box(disabled.try_admit())));

    group.finish();
}

// ============================================================================
// Correlator
// ============================================================================

fn bench_correlator(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let store = Arc::new(PendingReplyStore::new());
    let destination = DestinationId(1);
    let mut next = 0i64;

    c.bench_function("correlator/register_match_complete", |b| {
        b.iter(|| {
            next += 2;
            let token = MessageToken(next);
            let wait = store.register(destination, token).expect("slot free");
            store.on_inbound_reply(InboundReply {
                message_id: MessageToken(next + 1),
                destination,
                sender: "fam_bot".to_string(),
                outgoing: false,
                in_reply_to: Some(token),
                body: MessageBody::text("NAME: Alice"),
            });
            let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
            black_box(rt.block_on(wait.wait_until(deadline)))
        })
    });
}

criterion_group!(benches, bench_parser, bench_cache, bench_limiter, bench_correlator);
criterion_main!(benches);
