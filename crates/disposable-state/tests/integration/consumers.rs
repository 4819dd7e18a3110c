use std::time::Duration;

use disposable_state::{
    Disposer, DisposableState, ParentCacheMap, PrecommitValue, ResponsivePrecommitValue,
    SlotState, UpdatableSlot, VirtualTimer, create_reference_counted_pointer, factory,
};
use disposable_state_test::{CallCounter, DisposeLog};

use crate::{TestCache, setup};

#[test]
fn test_batched_assignments() {
    setup();
    let log = DisposeLog::new();
    let mut slot = UpdatableSlot::new();
    slot.commit();

    for name in ["d1", "d2", "d3"] {
        slot.assign(name, Disposer::new(log.callback(name)));
    }
    slot.commit();

    assert_eq!(log.calls(), ["d1", "d2"]);
    assert_eq!(slot.state(), SlotState::Assigned(&"d3"));

    drop(slot);
    assert_eq!(log.calls(), ["d1", "d2", "d3"]);
    assert_eq!(log.count("d3"), 1);
}

#[test]
fn test_responsive_rebind_releases_previous_cache_once() {
    setup();
    let timer = VirtualTimer::new();
    let disposed = DisposeLog::new();
    let c1 = TestCache::with_log("c1", &timer, disposed.clone());
    let c2 = TestCache::with_log("c2", &timer, disposed.clone());
    let mut value = ResponsivePrecommitValue::new(|| {});

    assert_eq!(value.attempt(&c1.cache), Some(1));
    value.commit();
    assert_eq!(value.committed(), Some(&1));

    assert_eq!(value.attempt(&c2.cache), Some(1));
    assert_eq!(value.committed(), None);
    assert!(disposed.is_empty());

    value.commit();
    assert_eq!(disposed.calls(), ["c1 1"]);
    assert_eq!(value.committed(), Some(&1));

    timer.run_all();
    drop(value);
    assert_eq!(disposed.calls(), ["c1 1", "c2 1"]);
}

#[test]
fn test_consumers_share_one_item() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);
    let mut first = PrecommitValue::new(|| {});
    let mut second = PrecommitValue::new(|| {});

    assert_eq!(first.attempt(&test.cache), Some(1));
    assert_eq!(second.attempt(&test.cache), Some(1));
    first.commit();
    second.commit();
    assert_eq!(test.factory_calls.get(), 1);

    drop(first);
    timer.run_all();
    assert!(test.disposed.is_empty());

    drop(second);
    assert_eq!(test.disposed.calls(), ["item 1"]);
}

#[test]
fn test_slow_commit_schedules_another_attempt() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);
    let attempts = CallCounter::new();
    let mut value = PrecommitValue::new(attempts.callback());

    assert_eq!(value.attempt(&test.cache), Some(1));
    timer.advance(Duration::from_secs(10));
    value.commit();

    assert_eq!(attempts.get(), 1);
    assert_eq!(value.committed(), Some(&2));
    assert_eq!(test.disposed.calls(), ["item 1"]);
}

#[test]
fn test_refetch_through_registry() {
    setup();
    let timer = VirtualTimer::new();
    let disposed = DisposeLog::new();
    let fetches = CallCounter::new();
    let mut map = ParentCacheMap::with_timer(Default::default(), timer.clone());
    let make_factory = || {
        let fetches = fetches.clone();
        let disposed = disposed.clone();
        factory(move || {
            let n = fetches.bump();
            (n, Disposer::new(disposed.callback(format!("fetch {n}"))))
        })
    };

    let cache = map.get_or_create("query", make_factory);
    let mut state = DisposableState::new(|| {});
    assert_eq!(state.attempt(&cache), 1);
    state.commit();

    // a refetch evicts whatever is cached and hands a fresh value to the committed consumer
    assert!(map.evict(&"query"));
    let (item, _, retain) = cache.get_or_populate_and_temporary_retain();
    let fetched = item.permanent_retain_if_not_disposed(retain).unwrap();
    let (pointer, disposer) = create_reference_counted_pointer(fetched);
    let value = pointer.get_item_if_not_disposed().unwrap();
    state.assign(value, disposer);
    assert_eq!(state.attempt(&cache), 2);

    state.commit();
    assert_eq!(disposed.calls(), ["fetch 1"]);
    assert!(!pointer.is_disposed());

    drop(state);
    assert!(pointer.is_disposed());
    assert_eq!(disposed.calls(), ["fetch 1", "fetch 2"]);
}
