use std::time::Duration;

use disposable_state::{CacheConfig, Disposer, ParentCache, PrecommitValue, TokioTimer, factory};
use disposable_state_test::DisposeLog;
use tokio::task::LocalSet;

use crate::setup;

fn cache(disposed: &DisposeLog) -> ParentCache<&'static str> {
    let disposed = disposed.clone();
    ParentCache::new(factory(move || {
        ("value", Disposer::new(disposed.callback("value")))
    }))
}

#[tokio::test(start_paused = true)]
async fn test_temporary_retain_expires_on_tokio_clock() {
    setup();
    let disposed = DisposeLog::new();

    LocalSet::new()
        .run_until(async {
            let cache = cache(&disposed);
            let (item, value, _retain) = cache.get_or_populate_and_temporary_retain();
            assert_eq!(value, "value");

            tokio::time::sleep(Duration::from_millis(4900)).await;
            assert!(!item.is_disposed());

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(item.is_disposed());
            assert!(cache.is_empty());
            assert_eq!(disposed.calls(), ["value"]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_commit_cancels_expiry() {
    setup();
    let disposed = DisposeLog::new();

    LocalSet::new()
        .run_until(async {
            let cache = cache(&disposed);
            let mut value = PrecommitValue::new(|| {});
            assert_eq!(value.attempt(&cache), Some("value"));
            value.commit();

            tokio::time::sleep(Duration::from_secs(60)).await;
            assert!(disposed.is_empty());
            assert_eq!(value.committed(), Some(&"value"));

            drop(value);
            assert_eq!(disposed.calls(), ["value"]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_configured_retain_time() {
    setup();
    let disposed = DisposeLog::new();
    let config = CacheConfig {
        temporary_retain_time: Duration::from_millis(100),
    };

    LocalSet::new()
        .run_until(async {
            let cache = ParentCache::with_config(
                factory({
                    let disposed = disposed.clone();
                    move || (1, Disposer::new(disposed.callback("short")))
                }),
                config,
                TokioTimer,
            );
            let (_item, _, _retain) = cache.get_or_populate_and_temporary_retain();

            tokio::time::sleep(Duration::from_millis(150)).await;
            assert!(cache.is_empty());
            assert_eq!(disposed.calls(), ["short"]);
        })
        .await;
}
