use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use disposable_state::logging::{get_rust_log, subscriber};
use disposable_state::{Config, Disposer, ParentCacheMap, VirtualTimer, factory};
use disposable_state_test::DisposeLog;
use tracing_subscriber::fmt::MakeWriter;

use crate::setup;

/// Collects everything written by a subscriber.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn output(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn load(yaml: &str) -> Config {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    Config::get(Some(file.path())).unwrap()
}

#[test]
fn test_config_file_drives_caches_and_logs() {
    setup();
    let config = load(
        r#"
        logging:
          level: debug
          format: json
        cache:
          temporary_retain_time: 250ms
        "#,
    );

    let timer = VirtualTimer::new();
    let disposed = DisposeLog::new();
    let mut map = ParentCacheMap::with_timer(config.cache, timer.clone());
    let cache = map.get_or_create("query", || {
        let disposed = disposed.clone();
        factory(move || ("value", Disposer::new(disposed.callback("value"))))
    });

    let logs = Capture::default();
    let subscriber = subscriber(
        get_rust_log(config.logging.level),
        config.logging.format,
        logs.clone(),
    );
    let (_item, value, _retain) = tracing::subscriber::with_default(subscriber, || {
        let first = cache.get_or_populate_and_temporary_retain();
        // trace events are filtered out at the debug level
        let _second = cache.get_or_populate_and_temporary_retain();
        first
    });
    assert_eq!(value, "value");

    let output = logs.output();
    assert!(output.starts_with('{'));
    assert!(output.contains(r#""level":"DEBUG""#));
    assert!(output.contains("populating parent cache"));
    assert!(!output.contains("temporarily retaining cached item"));

    // both retains were taken at the same instant and expire together
    timer.advance(Duration::from_millis(249));
    assert!(disposed.is_empty());
    timer.advance(Duration::from_millis(1));
    assert_eq!(disposed.calls(), ["value"]);
    assert!(cache.is_empty());
}

#[test]
fn test_missing_config_file() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let err = Config::get(Some(&dir.path().join("missing.yml"))).unwrap_err();
    assert_eq!(err.to_string(), "failed to open configuration file");
}
