use std::time::Duration;

use disposable_state::{CacheItem, CacheItemStateKind, Disposer, ParentCache, VirtualTimer, factory};
use disposable_state_test::CallCounter;

use crate::{TestCache, setup};

#[test]
fn test_populates_once() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);

    let (first, first_value, _retain1) = test.cache.get_or_populate_and_temporary_retain();
    let (second, second_value, _retain2) = test.cache.get_or_populate_and_temporary_retain();

    assert_eq!(test.factory_calls.get(), 1);
    assert!(CacheItem::ptr_eq(&first, &second));
    assert_eq!(first_value, second_value);
}

#[test]
fn test_release_sole_temporary_retain() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);

    let (item, _, retain) = test.cache.get_or_populate_and_temporary_retain();
    retain.release();

    assert!(item.is_disposed());
    assert!(test.cache.is_empty());
    assert_eq!(test.disposed.calls(), ["item 1"]);

    // the cancelled expiry does not fire later
    assert_eq!(timer.pending(), 0);
    timer.run_all();
    assert_eq!(test.disposed.len(), 1);
}

#[test]
fn test_permanent_retain_leaves_parent_cache() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);

    let (item, _, retain) = test.cache.get_or_populate_and_temporary_retain();
    let (value, disposer) = item.permanent_retain_if_not_disposed(retain).unwrap();

    assert_eq!(value, 1);
    assert!(test.cache.is_empty());
    assert_eq!(item.state_kind(), CacheItemStateKind::NotInParentCacheAndNotDisposed);
    assert_eq!(item.get_value(), 1);

    disposer.dispose();
    assert!(item.is_disposed());
    assert_eq!(test.disposed.calls(), ["item 1"]);
}

#[test]
fn test_stale_retain_after_expiry() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);

    let (item, _, retain) = test.cache.get_or_populate_and_temporary_retain();
    timer.advance(Duration::from_secs(5));
    assert!(retain.is_expired());

    assert!(item.permanent_retain_if_not_disposed(retain).is_none());
    assert!(test.cache.get_and_permanent_retain_if_present().is_none());

    // a newer item populated by someone else is picked up
    let (newer, _, newer_retain) = test.cache.get_or_populate_and_temporary_retain();
    let (value, disposer) = test.cache.get_and_permanent_retain_if_present().unwrap();
    assert_eq!(value, 2);
    assert_eq!(test.factory_calls.get(), 2);

    newer_retain.release();
    assert!(!newer.is_disposed());
    disposer.dispose();
    assert_eq!(test.disposed.calls(), ["item 1", "item 2"]);
}

#[test]
fn test_unretained_value_expires_and_repopulates() {
    setup();
    let timer = VirtualTimer::new();
    let factory_calls = CallCounter::new();
    let cache = ParentCache::with_timer(
        factory({
            let factory_calls = factory_calls.clone();
            move || {
                factory_calls.bump();
                (42, Disposer::noop())
            }
        }),
        timer.clone(),
    );

    let (item, value, _retain) = cache.get_or_populate_and_temporary_retain();
    assert_eq!(value, 42);

    timer.advance(Duration::from_secs(5));
    assert!(cache.is_empty());
    assert!(item.is_disposed());

    let (fresh, value, _retain) = cache.get_or_populate_and_temporary_retain();
    assert_eq!(value, 42);
    assert_eq!(factory_calls.get(), 2);
    assert!(!CacheItem::ptr_eq(&item, &fresh));
}

#[test]
#[should_panic(expected = "attempted to access the disposed value of a cache item")]
fn test_value_unreachable_after_dispose() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);

    let (item, _, retain) = test.cache.get_or_populate_and_temporary_retain();
    retain.release();
    item.get_value();
}
