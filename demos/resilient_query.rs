//! Resilient query example walking through an outage and recovery.
//!
//! This example shows how to:
//! - Wire a store, cache and breaker into a ResilientQueryExecutor
//! - Serve reads from the cache and fall back when the store fails
//! - Defer writes during an outage and replay them afterwards
//! - Rate limit and deduplicate outgoing content
//!
//! Run with: cargo run --example resilient_query

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tierguard::config::LoggingConfig;
use tierguard::health::HealthMonitor;
use tierguard::prelude::*;
use tierguard::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&LoggingConfig::default())?;

    println!("=== Tierguard Resilient Query Example ===\n");

    let store = Arc::new(MemoryStore::new().with_table(
        "posts",
        vec![
            json!({"id": 1, "author": "ada", "body": "Sleep is the best nootropic."}),
            json!({"id": 2, "author": "bob", "body": "Walk before lunch."}),
        ],
    ));
    let cache = Arc::new(HotPathCache::new(
        Arc::new(MemoryCacheBackend::new()),
        CacheConfig::default(),
    ));
    let breaker = Arc::new(CircuitBreaker::new(
        "posts-db",
        CircuitBreakerConfig::default()
            .with_failure_threshold(2)
            .with_base_backoff(Duration::from_secs(1)),
    ));
    let retry = RetryConfig::new().with_backoff(vec![Duration::from_millis(50)]);

    let executor = Arc::new(
        ResilientQueryExecutor::builder()
            .with_arc_store(store.clone())
            .with_cache(cache.clone())
            .with_breaker(breaker.clone())
            .with_config(ExecutorConfig::new().with_retry(retry))
            .build()?,
    );

    // Reads: the first goes to the store, the second is a cache hit.
    let query = Query::select("posts").eq("author", json!("ada"));
    let policy = CachePolicy::for_class("posts:ada", "posts", cache.config());
    for round in 1..=2 {
        let outcome = executor.execute_query(&query, Vec::new(), Some(&policy)).await;
        println!(
            "Read #{round}: {} row(s), from_cache={}, attempts={}",
            outcome.data.len(),
            outcome.from_cache,
            outcome.attempts
        );
    }

    // Outage: reads fall back, writes are deferred, the breaker opens.
    println!("\n--- Store outage ---");
    store.set_unavailable(true);

    let fallback = vec![json!({"id": 0, "body": "placeholder"})];
    let outcome = executor
        .execute_query(&Query::select("posts"), fallback, None)
        .await;
    println!(
        "Read during outage: fallback={}, error={:?}",
        outcome.is_fallback(),
        outcome.error_kind()
    );

    let write = executor
        .execute_write(
            Query::insert("posts", json!({"id": 3, "author": "cy", "body": "Hydrate."})),
            1,
        )
        .await;
    println!("Write during outage: deferred={}", write.is_deferred());

    executor.execute_query(&Query::select("posts"), Vec::new(), None).await;
    let report = executor.health_status();
    println!(
        "Health: {} (breaker {}, {} deferred write(s))",
        report.status, report.breaker.status, report.deferred_writes
    );

    // Recovery: the monitor probes, the breaker lets a trial through, and
    // the deferred write is replayed.
    println!("\n--- Recovery ---");
    store.set_unavailable(false);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let monitor = HealthMonitor::new(executor.clone(), HealthMonitorConfig::default());
    let tick = monitor.tick().await;
    println!(
        "Probe: durable_ok={}, replayed={:?}",
        tick.durable_ok,
        tick.replayed.map(|s| s.applied)
    );
    println!("Rows in store: {}", store.rows("posts").len());
    println!("Health: {}", executor.health_status().status);

    // Rate limiting and deduplication share the same cache.
    println!("\n--- Posting guards ---");
    let limiter = RateLimiter::new(cache.clone(), RateLimitConfig::default());
    for _ in 0..3 {
        let decision = limiter
            .check_and_increment("post:ada", 2, Duration::from_secs(3600))
            .await;
        println!("Rate limit: allowed={}, remaining={}", decision.allowed, decision.remaining);
    }

    let dedup = ContentDeduplicator::new(cache.clone(), DedupConfig::default());
    for text in ["Ship it today!", "ship it, TODAY", "Ship it tomorrow."] {
        let check = dedup.check(text, Some("ada")).await;
        println!("Dedup {text:?}: duplicate={} ({:?})", check.is_duplicate, check.reason);
    }

    Ok(())
}
