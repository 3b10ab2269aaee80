use std::time::Duration;

use frics::sources::{CatalogMirror, HttpCatalogSource, RetryPolicy, SkipReason, WalkEnd};
use frics::storage::{RecordStore, StoreError};
use serde_json::json;

mod util;
use util::{MockCatalog, Reply};

fn mirror(server: &MockCatalog, tmp: &tempfile::TempDir, timeout: Duration) -> CatalogMirror<HttpCatalogSource> {
    let source = HttpCatalogSource::new(&server.base_url, timeout).unwrap();
    CatalogMirror::new(source, RecordStore::in_dir(tmp.path())).with_retry(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
    })
}

#[test]
fn failed_detail_is_dropped_from_the_mirror() {
    let server = MockCatalog::start();
    server.listing(1, &["/@alice/ssl-bypass/", "/bob/broken/"]);
    server.detail("/api/project/alice/ssl-bypass/", "a-1", "ssl-bypass", json!("16.0.0"));
    // Nothing routed for bob: the detail request gets a 404.

    let tmp = tempfile::tempdir().unwrap();
    let mirror = mirror(&server, &tmp, Duration::from_secs(5));
    let report = mirror.sync(None).unwrap();

    assert_eq!(report.pages_walked, 1);
    assert_eq!(report.records_written, 1);
    assert_eq!(report.end, WalkEnd::Exhausted { page: 2, status: 404 });
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].href.as_deref(), Some("/bob/broken/"));

    let store = mirror.store();
    let rows: Vec<_> = store.scan_all().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "a-1");
    assert_eq!(rows[0].author, "alice");
    assert_eq!(rows[0].runtime_version, "16.0.0");
    assert!(matches!(store.get("b-1"), Err(StoreError::NotFound(_))));

    assert!(server.hits().contains(&"/api/project/bob/broken/".to_string()));
}

#[test]
fn list_version_is_normalized_over_http() {
    let server = MockCatalog::start();
    server.listing(1, &["/@carol/hook/"]);
    server.detail("/api/project/carol/hook/", "c-1", "hook", json!("['15.1.0', '14.2.0']"));

    let tmp = tempfile::tempdir().unwrap();
    let mirror = mirror(&server, &tmp, Duration::from_secs(5));
    mirror.sync(None).unwrap();

    let rows: Vec<_> = mirror.store().scan_all().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows[0].runtime_version, "15.1.0");
}

#[test]
fn transient_listing_failure_is_retried() {
    let server = MockCatalog::start();
    server.route(
        "/browse?page=1",
        vec![
            Reply::status(503),
            Reply::ok(r#"<article><a href="/@dave/trace/">trace</a></article>"#),
        ],
    );
    server.detail("/api/project/dave/trace/", "d-1", "trace", json!("16.1.0"));

    let tmp = tempfile::tempdir().unwrap();
    let mirror = mirror(&server, &tmp, Duration::from_secs(5));
    let report = mirror.sync(None).unwrap();

    assert_eq!(report.records_written, 1);
    assert_eq!(server.hit_count("/browse?page=1"), 2);
    assert!(report.is_complete());
}

#[test]
fn persistent_server_error_is_reported_as_suspect() {
    let server = MockCatalog::start();
    server.listing(1, &["/@erin/one/"]);
    server.detail("/api/project/erin/one/", "e-1", "one", json!("16.0.0"));
    server.route("/browse?page=2", vec![Reply::status(500)]);

    let tmp = tempfile::tempdir().unwrap();
    let mirror = mirror(&server, &tmp, Duration::from_secs(5));
    let report = mirror.sync(None).unwrap();

    assert_eq!(report.records_written, 1);
    assert!(matches!(report.end, WalkEnd::TransportFailure { page: 2, .. }));
    assert!(report.end.is_suspect());
    assert_eq!(server.hit_count("/browse?page=2"), 3);
}

#[test]
fn slow_detail_times_out_and_is_skipped() {
    let server = MockCatalog::start();
    server.listing(1, &["/@frank/slow/", "/@frank/fast/"]);
    server.route(
        "/api/project/frank/slow/",
        vec![Reply::json(json!({
            "id": "f-slow",
            "project_name": "slow",
            "frida_version": "16.0.0",
            "description": "",
            "source": "",
        }))
        .delayed(2_000)],
    );
    server.detail("/api/project/frank/fast/", "f-fast", "fast", json!(null));

    let tmp = tempfile::tempdir().unwrap();
    let source = HttpCatalogSource::new(&server.base_url, Duration::from_secs(1)).unwrap();
    let mirror = CatalogMirror::new(source, RecordStore::in_dir(tmp.path()))
        .with_retry(RetryPolicy::none());
    let report = mirror.sync(None).unwrap();

    assert_eq!(report.records_written, 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(matches!(report.skipped[0].reason, SkipReason::Detail { .. }));

    let store = mirror.store();
    assert!(store.get("f-fast").is_ok());
    assert!(matches!(store.get("f-slow"), Err(StoreError::NotFound(_))));
}

#[test]
fn undecodable_detail_is_skipped_without_retry() {
    let server = MockCatalog::start();
    server.listing(1, &["/@gina/garbled/"]);
    server.route("/api/project/gina/garbled/", vec![Reply::ok("{not json")]);

    let tmp = tempfile::tempdir().unwrap();
    let mirror = mirror(&server, &tmp, Duration::from_secs(5));
    let report = mirror.sync(None).unwrap();

    assert_eq!(report.records_written, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(server.hit_count("/api/project/gina/garbled/"), 1);
}
