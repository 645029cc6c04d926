//! End-to-end runs through the public `HarvestRunner` surface, backed by
//! wiremock servers and the in-memory store.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use civhub_common::types::{
    DataSource, EntityType, FieldMapping, RecordStatus, RunKind, SourceType,
};
use civhub_common::Config;
use civhub_harvest::testing::{FixedEmbedder, MemorySink};
use civhub_harvest::{DedupEngine, HarvestRunner, MemoryStore, SourceStore, SyncLedger};

fn runner(store: Arc<MemoryStore>, sink: Arc<MemorySink>) -> HarvestRunner {
    let config = Config::default();
    let dedup = Arc::new(DedupEngine::new(Arc::new(FixedEmbedder::new(8)), &config));
    HarvestRunner::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        dedup,
        sink,
        &config,
    )
    .expect("runner")
}

fn api_source(url: &str, limit: u32) -> DataSource {
    let mut source = DataSource::new("portal", url, SourceType::RestApi);
    source.field_mapping = Some(FieldMapping::minimal(EntityType::Municipality, "id", "name"));
    source.page_limit = limit;
    source
}

#[tokio::test]
async fn paginated_sync_with_one_bad_record() {
    let server = MockServer::start().await;
    // Page one: a good record and one missing its name.
    Mock::given(method("GET"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "id1", "name": "Gemeinde Adorf" },
                { "id": "id2" }
            ]
        })))
        .mount(&server)
        .await;
    // Page two, short: ends the pagination.
    Mock::given(method("GET"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "id3", "name": "Gemeinde Bedorf" }
            ]
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let source = api_source(&server.uri(), 2);
    let source_id = source.id;
    store.add_source(source);

    let summary = runner(store.clone(), Arc::new(MemorySink::new()))
        .run(source_id)
        .await
        .unwrap();

    assert_eq!(summary.kind, RunKind::Sync);
    let sync = summary.sync.expect("sync result");
    assert_eq!(sync.created, 2);
    assert_eq!(sync.failed, 1);
    assert_eq!(store.entity_count(), 2);

    let rows = store.records_for_source(source_id).await.unwrap();
    assert_eq!(rows.len(), 3);
    let bad = rows
        .iter()
        .find(|r| r.external_id == "id2")
        .expect("ledger row for the bad record");
    assert_eq!(bad.status, RecordStatus::Failed);
    assert!(bad.error.is_some());
}

#[tokio::test]
async fn rerun_does_not_duplicate_entities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "m-1", "name": "Musterstadt" }]
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let source = api_source(&server.uri(), 10);
    let source_id = source.id;
    store.add_source(source);

    let runner = runner(store.clone(), Arc::new(MemorySink::new()));

    let first = runner.run(source_id).await.unwrap();
    assert_eq!(first.sync.as_ref().unwrap().created, 1);

    let second = runner.run(source_id).await.unwrap();
    assert_eq!(second.sync.as_ref().unwrap().created, 0);
    assert_eq!(second.sync.as_ref().unwrap().total(), 0);
    assert_eq!(store.entity_count(), 1);
}

#[tokio::test]
async fn website_crawl_then_unchanged_poll() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"rev-1\"")
                .set_body_string(r#"<title>Stadt</title><a href="/rat">Rat</a>"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Rat</title>inhalt"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let source = DataSource::new("stadt", &format!("{}/", server.uri()), SourceType::Website);
    let source_id = source.id;
    store.add_source(source);

    let runner = runner(store.clone(), Arc::new(MemorySink::new()));
    let first = runner.run(source_id).await.unwrap();
    assert_eq!(first.processed, 2);

    let stored = store.get_source(source_id).await.unwrap().unwrap();
    assert_eq!(stored.etag.as_deref(), Some("\"rev-1\""));

    // The server now answers conditional requests with 304.
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let second = runner.run(source_id).await.unwrap();
    assert!(second.unchanged);
    assert_eq!(second.processed, 0);

    let stored = store.get_source(source_id).await.unwrap().unwrap();
    assert_eq!(stored.etag.as_deref(), Some("\"rev-1\""), "validators survive a 304");
}

#[tokio::test]
async fn concurrent_sources_run_independently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>A</title>seite"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let a = DataSource::new("a", &format!("{}/a", server.uri()), SourceType::Website);
    let b = DataSource::new("b", &format!("{}/b", server.uri()), SourceType::Website);
    let (id_a, id_b) = (a.id, b.id);
    store.add_source(a);
    store.add_source(b);

    let runner = Arc::new(runner(store, Arc::new(MemorySink::new())));
    let (ra, rb) = tokio::join!(runner.run(id_a), runner.run(id_b));
    assert!(ra.is_ok());
    assert!(rb.is_ok());
}

#[tokio::test]
async fn unknown_source_id_fails_cleanly() {
    let store = Arc::new(MemoryStore::new());
    let result = runner(store, Arc::new(MemorySink::new()))
        .run(Uuid::new_v4())
        .await;
    assert!(result.is_err());
}
