use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use git_bulk_core::error::Cancelled;
use git_bulk_core::ratelimit::{ApiLimits, EndpointClass, RateLimiter};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquires_are_all_counted() {
    let limiter = Arc::new(RateLimiter::new(&ApiLimits {
        core_burst: 5,
        ..ApiLimits::default()
    }));
    let cancel = CancellationToken::new();

    let tasks = (0..20).map(|_| {
        let limiter = limiter.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { limiter.acquire(EndpointClass::Core, &cancel).await })
    });
    let results = join_all(tasks).await;

    assert!(results.into_iter().all(|r| matches!(r, Ok(Ok(())))));
    let stats = limiter.stats();
    assert_eq!(stats.core_waits, 20);
    // 15 tokens beyond the burst at 1.25 tokens/s
    assert!(stats.total_wait_ms > 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_class_does_not_block_others() {
    let limiter = Arc::new(RateLimiter::default());
    let cancel = CancellationToken::new();
    while limiter.try_acquire(EndpointClass::Search) {}

    let blocked = {
        let limiter = limiter.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { limiter.acquire(EndpointClass::Search, &cancel).await })
    };

    let core = tokio::time::timeout(
        Duration::from_millis(10),
        limiter.acquire(EndpointClass::Core, &cancel),
    )
    .await;
    assert_eq!(core, Ok(Ok(())));

    cancel.cancel();
    assert_eq!(blocked.await.unwrap(), Err(Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_reset_races_with_acquires_without_losing_state() {
    let limiter = Arc::new(RateLimiter::new(&ApiLimits {
        core_burst: 1_000,
        ..ApiLimits::default()
    }));
    let cancel = CancellationToken::new();

    let acquires = (0..50).map(|_| {
        let limiter = limiter.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { limiter.acquire(EndpointClass::Core, &cancel).await })
    });
    let resets = (0..5).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            limiter.reset_stats();
            Ok::<(), Cancelled>(())
        })
    });

    for r in join_all(acquires.chain(resets)).await {
        assert!(matches!(r, Ok(Ok(()))));
    }
    assert!(limiter.stats().core_waits <= 50);
    limiter.reset_stats();
    assert_eq!(limiter.stats().core_waits, 0);
}
