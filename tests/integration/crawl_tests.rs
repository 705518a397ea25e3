//! End-to-end crawl runs against mock targets

use kage_recon::config::Config;
use kage_recon::crawler::{CrawlOrchestrator, Protection, ResourceKind, Transports};
use kage_recon::output::{format_crawl_summary, load_statistics};
use kage_recon::state::{CrawlRunState, TargetStatus};
use kage_recon::storage::{ArtifactStore, SqliteStorage};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Search Portal</title></head>
<body>
  <a href="/about">About</a>
  <img src="/logo.png" alt="logo">
  <form action="/search" method="get">
    <input type="text" name="q" required>
    <input type="hidden" name="lang" value="en">
  </form>
</body>
</html>"#;

/// Configuration with no circuit, a solver on the mock server and short retries
fn test_config(server: &MockServer, db_path: &str) -> Config {
    let mut config = Config::default();
    config.proxy.enabled = false;
    config.solver.endpoint = format!("{}/v1", server.uri());
    config.solver.max_timeout_ms = 1000;
    config.retry.max_attempts = 2;
    config.retry.retry_delay_ms = 1;
    config.http.timeout_secs = 5;
    config.http.probe_timeout_secs = 5;
    config.output.database_path = db_path.to_string();
    config
}

fn orchestrator(config: &Config) -> (CrawlOrchestrator<SqliteStorage>, Arc<Mutex<SqliteStorage>>) {
    let storage = SqliteStorage::new(std::path::Path::new(&config.output.database_path))
        .expect("Failed to open database");
    let store = Arc::new(Mutex::new(storage));
    let transports = Transports::from_config(config).expect("Failed to build transports");
    (
        CrawlOrchestrator::new(store.clone(), transports, config, "test-hash"),
        store,
    )
}

#[tokio::test]
async fn test_unprotected_target_full_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(SEARCH_PAGE),
        )
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("recon.db");
    let config = test_config(&server, db_path.to_str().unwrap());
    let (orchestrator, store) = orchestrator(&config);

    let outcome = orchestrator.process_url(&server.uri()).await.unwrap();

    assert_eq!(outcome.state, CrawlRunState::Completed);
    assert_eq!(outcome.protection, Some(Protection::Unprotected));
    assert_eq!(outcome.transport.as_deref(), Some("direct"));
    assert_eq!(
        outcome.transitions,
        vec![
            CrawlRunState::Created,
            CrawlRunState::Fetching,
            CrawlRunState::Parsing,
            CrawlRunState::Completed,
        ]
    );

    let summary = outcome.summary.as_ref().unwrap();
    assert_eq!(summary.title.as_deref(), Some("Search Portal"));
    assert_eq!(summary.forms, 1);

    let store = store.lock().unwrap();
    let run = store.get_run(outcome.run_id).unwrap();
    assert_eq!(run.state, CrawlRunState::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert!(run.completed_at.is_some());
    assert!(run.summary.unwrap().contains("\"forms\":1"));

    let target = store.get_target(outcome.target_id).unwrap();
    assert_eq!(target.status, TargetStatus::Done);

    let resources = store.list_resources(outcome.run_id).unwrap();
    assert_eq!(resources.len(), outcome.resources);
    assert_eq!(resources[0].kind, ResourceKind::Html);
    assert_eq!(resources[0].position, 0);

    let form = resources
        .iter()
        .find(|r| r.kind == ResourceKind::Form)
        .expect("form should be stored");
    assert_eq!(form.method.as_deref(), Some("GET"));
    assert!(form.url.ends_with("/search"));
    let payload = form.payload.as_deref().unwrap();
    assert!(payload.contains("\"name\":\"q\""));
    assert!(payload.contains("\"name\":\"lang\""));

    assert!(resources.iter().any(|r| r.kind == ResourceKind::Image));
    assert!(resources.iter().any(|r| r.kind == ResourceKind::Link));
}

#[tokio::test]
async fn test_protected_target_goes_through_solver() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("server", "cloudflare")
                .set_body_string("<html><title>Just a moment...</title></html>"),
        )
        .mount(&server)
        .await;

    let solved = serde_json::json!({
        "status": "ok",
        "message": "Challenge solved!",
        "solution": {
            "url": format!("{}/", server.uri()),
            "status": 200,
            "response": SEARCH_PAGE,
        }
    });
    Mock::given(method("POST"))
        .and(path("/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(solved))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("recon.db");
    let config = test_config(&server, db_path.to_str().unwrap());
    let (orchestrator, store) = orchestrator(&config);

    let outcome = orchestrator.process_url(&server.uri()).await.unwrap();

    assert!(outcome.is_success());
    assert!(matches!(outcome.protection, Some(Protection::Protected(_))));
    assert_eq!(outcome.transport.as_deref(), Some("challenge_solver"));
    assert_eq!(outcome.attempts, 1);

    let store = store.lock().unwrap();
    let resources = store.list_resources(outcome.run_id).unwrap();
    assert!(resources.iter().any(|r| r.kind == ResourceKind::Form));
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("recon.db");
    let config = test_config(&server, db_path.to_str().unwrap());
    let (orchestrator, store) = orchestrator(&config);

    let outcome = orchestrator.process_url(&server.uri()).await.unwrap();

    assert_eq!(outcome.state, CrawlRunState::Failed);
    assert_eq!(
        outcome.transitions,
        vec![
            CrawlRunState::Created,
            CrawlRunState::Fetching,
            CrawlRunState::Failed,
        ]
    );
    assert!(outcome.error.is_some());

    // one probe plus one request per attempt
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    let store = store.lock().unwrap();
    let run = store.get_run(outcome.run_id).unwrap();
    assert_eq!(run.state, CrawlRunState::Failed);
    assert!(run.error_message.is_some());
    assert!(run.completed_at.is_some());
    assert!(store.list_resources(outcome.run_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_reports_every_domain() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("recon.db");
    let config = test_config(&server, db_path.to_str().unwrap());
    let (orchestrator, store) = orchestrator(&config);

    let domains = vec![
        ".bad.example".to_string(),
        "a".to_string(),
        "*.wild.example".to_string(),
    ];
    let summary = orchestrator.process_domains(&domains).await;

    assert_eq!(summary.attempted, 0);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.skipped.len(), 3);
    assert!(summary.runs.is_empty());

    let markdown = format_crawl_summary(&summary);
    assert!(markdown.contains("## Skipped Domains"));

    let stats = load_statistics(&*store.lock().unwrap()).unwrap();
    assert_eq!(stats.targets, 0);
}
