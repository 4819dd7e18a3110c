use std::collections::BTreeMap;
use std::time::Duration;

use cadence::SpyMetricSink;
use disposable_state::metrics::{MetricsClient, with_local_client};
use disposable_state::{Disposer, PrecommitValue, UpdatableSlot, VirtualTimer};

use crate::{TestCache, setup};

/// Runs `f` and returns the metrics it sent, in order.
fn record_metrics(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = SpyMetricSink::new();
    with_local_client(
        MetricsClient::from_sink("disposable_state", sink, BTreeMap::new()),
        f,
    );
    rx.try_iter()
        .map(|metric| String::from_utf8(metric).unwrap())
        .collect()
}

#[test]
fn test_commit_recovered_from_factory() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);

    let sent = record_metrics(|| {
        let mut value = PrecommitValue::new(|| {});
        value.attempt(&test.cache);
        timer.advance(Duration::from_secs(10));
        value.commit();
    });

    insta::assert_debug_snapshot!(sent, @r###"
    [
        "disposable_state.cache_item.created:1|c",
        "disposable_state.temporary_retain.expired:1|c",
        "disposable_state.cache_item.disposed:1|c",
        "disposable_state.commit.recovered:1|c|#source:factory",
    ]
    "###);
}

#[test]
fn test_commit_recovered_from_parent_cache() {
    setup();
    let timer = VirtualTimer::new();
    let test = TestCache::new("item", &timer);

    let sent = record_metrics(|| {
        let mut slow = PrecommitValue::new(|| {});
        let mut fast = PrecommitValue::new(|| {});
        slow.attempt(&test.cache);
        timer.advance(Duration::from_secs(10));
        fast.attempt(&test.cache);
        slow.commit();
        assert_eq!(slow.committed(), Some(&2));
    });

    insta::assert_debug_snapshot!(sent, @r###"
    [
        "disposable_state.cache_item.created:1|c",
        "disposable_state.temporary_retain.expired:1|c",
        "disposable_state.cache_item.disposed:1|c",
        "disposable_state.cache_item.created:1|c",
        "disposable_state.commit.recovered:1|c|#source:parent_cache",
    ]
    "###);
}

#[test]
fn test_superseded_assignments_are_counted() {
    setup();

    let sent = record_metrics(|| {
        let mut slot = UpdatableSlot::new();
        for value in 1..=3 {
            slot.assign(value, Disposer::new(|| {}));
        }
        slot.commit();
        slot.commit();
    });

    insta::assert_debug_snapshot!(sent, @r###"
    [
        "disposable_state.updatable_slot.disposed:1|c",
        "disposable_state.updatable_slot.disposed:1|c",
    ]
    "###);
}
