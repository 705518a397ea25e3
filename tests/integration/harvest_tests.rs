//! Parameter harvests against mock archives and candidate files

use kage_recon::harvest::{
    FileCandidates, HarvestContext, ParameterHarvester, WaybackCandidates, EMPTY_REPORT,
};
use kage_recon::state::HarvestStatus;
use kage_recon::storage::{ArtifactStore, SqliteStorage};
use kage_recon::task::TaskPool;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARCHIVED: &str = "\
https://example.com/search?q=shoes&page=2
https://example.com/logo.png?v=3
https://example.com/about
https://example.com/item?id=7&ref=home

https://example.com/search?q=hats&sort=asc
";

/// Store on disk with one registered target
fn setup(dir: &TempDir) -> (Arc<Mutex<SqliteStorage>>, HarvestContext) {
    let mut storage = SqliteStorage::new(&dir.path().join("recon.db")).unwrap();
    let target_id = storage
        .register_target("https://example.com/", "example.com", "cli")
        .unwrap();
    let crawl_run_id = storage.create_run(target_id, "test-hash").unwrap();
    let context = HarvestContext {
        target_id,
        owner: "cli".to_string(),
        crawl_run_id: Some(crawl_run_id),
    };
    (Arc::new(Mutex::new(storage)), context)
}

#[tokio::test]
async fn test_wayback_harvest_persists_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx"))
        .and(query_param("url", "example.com/*"))
        .and(query_param("fl", "original"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARCHIVED))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (store, context) = setup(&dir);
    let source = WaybackCandidates::new(format!("{}/cdx", server.uri())).unwrap();
    let harvester = ParameterHarvester::new(store.clone(), 2);

    let result = harvester
        .harvest(&context, "example.com", "png,jpg", 50, &source)
        .await
        .unwrap();

    assert_eq!(result.status, HarvestStatus::Completed);
    assert_eq!(result.total_urls, 3);
    assert_eq!(result.parameters, vec!["id", "page", "q", "ref", "sort"]);
    assert_eq!(result.unique_parameters, 5);

    let store = store.lock().unwrap();
    let record = store.get_latest_harvest(context.target_id).unwrap().unwrap();
    assert_eq!(record.id, result.harvest_id);
    assert_eq!(record.status, HarvestStatus::Completed);
    assert_eq!(record.crawl_run_id, context.crawl_run_id);
    assert_eq!(record.exclude, "png,jpg");
    assert_eq!(record.concurrency, 50);
    assert_eq!(record.total_urls, 3);

    let report = record.report.unwrap();
    assert!(report.contains("Domain: example.com"));
    assert!(report.contains("id, page, q, ref, sort"));
    assert!(report.contains("https://example.com/item?id=7&ref=home"));
    assert!(!report.contains("logo.png"));
}

#[tokio::test]
async fn test_file_harvest_without_parameters() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "https://example.com/").unwrap();
    writeln!(file, "https://example.com/contact").unwrap();

    let dir = TempDir::new().unwrap();
    let (store, context) = setup(&dir);
    let harvester = ParameterHarvester::new(store.clone(), 1000);

    let result = harvester
        .harvest(&context, "example.com", "", 10, &FileCandidates::new(file.path()))
        .await
        .unwrap();

    assert_eq!(result.status, HarvestStatus::Completed);
    assert_eq!(result.total_urls, 0);
    assert_eq!(result.unique_parameters, 0);

    let record = store.lock().unwrap().get_harvest(result.harvest_id).unwrap();
    assert!(record.report.unwrap().contains(EMPTY_REPORT));
}

#[tokio::test]
async fn test_archive_failure_through_task_pool() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (store, context) = setup(&dir);
    let source = WaybackCandidates::new(format!("{}/cdx", server.uri())).unwrap();
    let harvester = ParameterHarvester::new(store.clone(), 1000);

    let pool = TaskPool::new(2);
    let task_context = context.clone();
    let handle = pool.submit("harvest example.com", async move {
        harvester
            .harvest(&task_context, "example.com", "", 50, &source)
            .await
    });
    let outcome = handle.await_result(Duration::from_secs(10)).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, 500);
    assert!(outcome.payload["error"].as_str().unwrap().contains("503"));

    let record = store
        .lock()
        .unwrap()
        .get_latest_harvest(context.target_id)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, HarvestStatus::Error);
    assert!(record.error_message.is_some());
    assert_eq!(record.total_urls, 0);
}

#[tokio::test]
async fn test_successful_harvest_through_task_pool() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARCHIVED))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (store, context) = setup(&dir);
    let source = WaybackCandidates::new(format!("{}/cdx", server.uri())).unwrap();
    let harvester = ParameterHarvester::new(store, 1000);

    let pool = TaskPool::new(1);
    let handle = pool.submit("harvest example.com", async move {
        harvester.harvest(&context, "example.com", "", 50, &source).await
    });
    let outcome = handle.await_result(Duration::from_secs(10)).await;

    assert!(outcome.success);
    assert_eq!(outcome.status_code, 200);
    // the png URL carries a query string and no exclusion applies
    assert_eq!(outcome.payload["total_urls"], 4);
    assert_eq!(outcome.payload["status"], "completed");
}

#[tokio::test]
async fn test_abandoned_harvest_completes_before_pool_drains() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ARCHIVED)
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (store, context) = setup(&dir);
    let source = WaybackCandidates::new(format!("{}/cdx", server.uri())).unwrap();
    let harvester = ParameterHarvester::new(store.clone(), 1000);

    let pool = TaskPool::new(1);
    let task_context = context.clone();
    let handle = pool.submit("harvest example.com", async move {
        harvester
            .harvest(&task_context, "example.com", "", 50, &source)
            .await
    });
    let outcome = handle.await_result(Duration::from_millis(20)).await;
    assert_eq!(outcome.status_code, 408);
    assert!(!outcome.success);

    pool.wait_idle().await;
    assert_eq!(pool.pending(), 0);

    let record = store
        .lock()
        .unwrap()
        .get_latest_harvest(context.target_id)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, HarvestStatus::Completed);
    assert_eq!(record.total_urls, 4);
    assert!(record.report.is_some());
}
