//! Crawl orchestration across many target domains
//!
//! Each domain gets its own crawl run and is isolated from the others: a
//! failure is recorded on that run and in the summary, then the batch moves
//! on. Per run the pipeline is:
//! - register the target and create the run
//! - probe for a challenge layer and pick the transport
//! - fetch through the retry scheduler
//! - classify the document and persist its resources in document order

use crate::config::Config;
use crate::crawler::circuit::{IdentityRotator, TorCircuit};
use crate::crawler::classifier::{EventLevel, HtmlClassifier, InventorySummary};
use crate::crawler::detector::{Protection, ProtectionDetector, ProtectionProbe};
use crate::crawler::fetcher::{
    ChallengeSolverFetch, DirectFetch, FetchStrategy, Fetcher, ProxiedFetch,
};
use crate::crawler::identity::IdentityPool;
use crate::crawler::resource::{DiscoveredResource, ScriptDescriptor};
use crate::crawler::retry::{RetryPolicy, RetryScheduler};
use crate::state::{CrawlRunState, TargetStatus};
use crate::storage::{ArtifactStore, StorageError};
use crate::url::{strip_scheme, target_url, validate_domain};
use crate::KageError;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use url::Url;

/// Collaborators used to reach targets
pub struct Transports {
    pub probe: Arc<dyn ProtectionProbe>,
    pub direct: Arc<dyn Fetcher>,
    /// Escalation path for repeated rejections; absent when no circuit is configured
    pub proxied: Option<Arc<dyn Fetcher>>,
    pub solver: Arc<dyn Fetcher>,
    pub rotator: Option<Arc<dyn IdentityRotator>>,
}

impl Transports {
    /// Builds the real transports from configuration
    ///
    /// The identity pool is loaded once here and shared by every transport.
    pub fn from_config(config: &Config) -> Result<Self, KageError> {
        let identities = Arc::new(match &config.http.identity_pool {
            Some(path) => IdentityPool::load(Path::new(path)),
            None => IdentityPool::fallback(),
        });

        let probe = ProtectionDetector::new(&config.http, identities.clone())?;
        let direct = FetchStrategy::Direct(DirectFetch::new(&config.http, identities.clone())?);
        let solver = FetchStrategy::ChallengeSolver(ChallengeSolverFetch::new(
            config.solver.clone(),
            identities.clone(),
        )?);

        let (proxied, rotator): (Option<Arc<dyn Fetcher>>, Option<Arc<dyn IdentityRotator>>) =
            if config.proxy.enabled {
                let circuit = Arc::new(TorCircuit::new(config.proxy.clone()));
                let proxied =
                    FetchStrategy::Proxied(ProxiedFetch::new(&config.http, identities, circuit.clone())?);
                (
                    Some(Arc::new(proxied) as Arc<dyn Fetcher>),
                    Some(circuit as Arc<dyn IdentityRotator>),
                )
            } else {
                (None, None)
            };

        Ok(Self {
            probe: Arc::new(probe),
            direct: Arc::new(direct),
            proxied,
            solver: Arc::new(solver),
            rotator,
        })
    }

    fn by_name(&self, name: &str) -> &dyn Fetcher {
        if self.solver.name() == name {
            return self.solver.as_ref();
        }
        match &self.proxied {
            Some(proxied) if proxied.name() == name => proxied.as_ref(),
            _ => self.direct.as_ref(),
        }
    }
}

/// Result of one crawl run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub target: String,
    pub target_id: i64,
    pub run_id: i64,
    pub state: CrawlRunState,
    /// States entered, in order, starting with `created`
    pub transitions: Vec<CrawlRunState>,
    pub protection: Option<Protection>,
    pub transport: Option<String>,
    pub attempts: u32,
    pub resources: usize,
    pub summary: Option<InventorySummary>,
    pub error: Option<String>,
}

impl RunOutcome {
    fn new(target: &str, target_id: i64, run_id: i64) -> Self {
        Self {
            target: target.to_string(),
            target_id,
            run_id,
            state: CrawlRunState::Created,
            transitions: vec![CrawlRunState::Created],
            protection: None,
            transport: None,
            attempts: 0,
            resources: 0,
            summary: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == CrawlRunState::Completed
    }
}

/// A domain that was skipped or did not complete
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedDomain {
    pub domain: String,
    pub reason: String,
    pub run_id: Option<i64>,
}

/// Aggregate over one batch of domains
///
/// Returned even when nothing succeeded, so the reasons can be inspected.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    pub attempted: usize,
    pub succeeded: usize,
    /// Domains rejected by syntax validation; never attempted
    pub skipped: Vec<UnresolvedDomain>,
    pub unresolved: Vec<UnresolvedDomain>,
    pub runs: Vec<RunOutcome>,
}

impl CrawlSummary {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

/// Top-level crawl controller
pub struct CrawlOrchestrator<S> {
    store: Arc<Mutex<S>>,
    transports: Transports,
    scheduler: RetryScheduler,
    config_hash: String,
    owner: String,
    fetch_scripts: bool,
}

impl<S: ArtifactStore> CrawlOrchestrator<S> {
    pub fn new(
        store: Arc<Mutex<S>>,
        transports: Transports,
        config: &Config,
        config_hash: impl Into<String>,
    ) -> Self {
        let scheduler = RetryScheduler::new(
            RetryPolicy::from_config(&config.retry),
            transports.rotator.clone(),
        );
        Self {
            store,
            transports,
            scheduler,
            config_hash: config_hash.into(),
            owner: config.crawl.owner.clone(),
            fetch_scripts: config.crawl.fetch_scripts,
        }
    }

    /// Overrides the owning principal for registered targets
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Crawls each domain independently and aggregates the outcome
    pub async fn process_domains(&self, domains: &[String]) -> CrawlSummary {
        let mut summary = CrawlSummary::default();

        for raw in domains {
            let domain = raw.trim().to_lowercase();

            if let Err(e) = validate_domain(&domain) {
                warn!("Skipping {}: {}", raw, e);
                summary.skipped.push(UnresolvedDomain {
                    domain,
                    reason: e.to_string(),
                    run_id: None,
                });
                continue;
            }

            summary.attempted += 1;
            match self.process_url(&domain).await {
                Ok(outcome) if outcome.is_success() => {
                    summary.succeeded += 1;
                    summary.runs.push(outcome);
                }
                Ok(outcome) => {
                    summary.unresolved.push(UnresolvedDomain {
                        domain,
                        reason: outcome
                            .error
                            .clone()
                            .unwrap_or_else(|| format!("run ended in state {}", outcome.state)),
                        run_id: Some(outcome.run_id),
                    });
                    summary.runs.push(outcome);
                }
                Err(e) => {
                    error!("Could not start a run for {}: {}", domain, e);
                    summary.unresolved.push(UnresolvedDomain {
                        domain,
                        reason: e.to_string(),
                        run_id: None,
                    });
                }
            }
        }

        info!(
            "Crawl batch finished: {}/{} succeeded, {} skipped",
            summary.succeeded,
            summary.attempted,
            summary.skipped.len()
        );
        summary
    }

    /// Runs one crawl against a domain or URL
    ///
    /// Errors are returned only when the run could not be created; anything
    /// after that ends in a `failed` run reported through the outcome.
    pub async fn process_url(&self, target: &str) -> Result<RunOutcome, KageError> {
        let url = target_url(target)?;

        let (target_id, run_id) = {
            let mut store = self.lock();
            let target_id = store.register_target(url.as_str(), &strip_scheme(&url), &self.owner)?;
            let run_id = store.create_run(target_id, &self.config_hash)?;
            (target_id, run_id)
        };
        info!("Run {} started for {}", run_id, url);

        let mut outcome = RunOutcome::new(url.as_str(), target_id, run_id);

        if let Err(e) = self.drive_run(&url, run_id, &mut outcome).await {
            let message = e.to_string();
            warn!("Run {} for {} failed: {}", run_id, url, message);
            if let Err(mark_err) = self.transition(run_id, CrawlRunState::Failed, Some(&message), &mut outcome) {
                error!("Could not mark run {} as failed: {}", run_id, mark_err);
            }
            outcome.error = Some(message);
        }

        if let Err(e) = self.lock().update_target_status(target_id, TargetStatus::Done) {
            warn!("Could not close target {}: {}", target_id, e);
        }

        Ok(outcome)
    }

    async fn drive_run(&self, url: &Url, run_id: i64, outcome: &mut RunOutcome) -> Result<(), KageError> {
        self.lock()
            .update_target_status(outcome.target_id, TargetStatus::Active)?;
        self.transition(run_id, CrawlRunState::Fetching, None, outcome)?;

        let protection = self.transports.probe.detect(url.as_str()).await;
        info!("{}: {:?}", url, protection);
        let protected = protection.is_protected();
        outcome.protection = Some(protection);

        let fetched = if protected {
            self.scheduler
                .fetch(self.transports.solver.as_ref(), None, url.as_str())
                .await?
        } else {
            self.scheduler
                .fetch(
                    self.transports.direct.as_ref(),
                    self.transports.proxied.as_deref(),
                    url.as_str(),
                )
                .await?
        };
        let transport = fetched.document.transport;
        outcome.transport = Some(transport.to_string());
        outcome.attempts = fetched.attempts;

        self.transition(run_id, CrawlRunState::Parsing, None, outcome)?;

        let base = Url::parse(&fetched.document.url).unwrap_or_else(|_| url.clone());
        let html = fetched.document.text();

        let document = DiscoveredResource::HtmlDocument {
            url: base.to_string(),
            content: html.clone(),
        };
        self.lock().append_resource(run_id, &document, 0)?;
        outcome.resources += 1;

        let inventory = HtmlClassifier::parse(&html, &base);
        for event in &inventory.events {
            match event.level {
                EventLevel::Debug => debug!("{} [{}]: {}", base, event.section, event.message),
                EventLevel::Warn => warn!("{} [{}]: {}", base, event.section, event.message),
            }
        }

        let summary = inventory.summary();
        let mut resources = inventory.into_resources(&base);

        if self.fetch_scripts {
            self.attach_script_bodies(&mut resources, self.transports.by_name(transport))
                .await;
        }

        for (index, resource) in resources.iter().enumerate() {
            self.lock().append_resource(run_id, resource, index + 1)?;
            outcome.resources += 1;
        }

        self.lock()
            .set_run_summary(run_id, &serde_json::to_string(&summary)?)?;
        outcome.summary = Some(summary);

        self.transition(run_id, CrawlRunState::Completed, None, outcome)?;
        info!(
            "Run {} completed for {}: {} resources via {}",
            run_id, url, outcome.resources, transport
        );
        Ok(())
    }

    /// Fetches each external script once; failures leave a placeholder body
    async fn attach_script_bodies(&self, resources: &mut [DiscoveredResource], fetcher: &dyn Fetcher) {
        for resource in resources.iter_mut() {
            if let DiscoveredResource::Script {
                script: ScriptDescriptor::External { url, body, .. },
                ..
            } = resource
            {
                *body = Some(match fetcher.fetch(url).await {
                    Ok(document) => document.text(),
                    Err(e) => {
                        debug!("Script {} not retrieved: {}", url, e);
                        format!("// failed to fetch script from {}", url)
                    }
                });
            }
        }
    }

    fn transition(
        &self,
        run_id: i64,
        state: CrawlRunState,
        error: Option<&str>,
        outcome: &mut RunOutcome,
    ) -> Result<(), KageError> {
        self.lock()
            .update_run_state(run_id, state, error)
            .map_err(|e| match e {
                StorageError::InvalidTransition { from, to } => KageError::InvalidTransition { from, to },
                other => KageError::Storage(other),
            })?;
        debug!("Run {} -> {}", run_id, state);
        outcome.state = state;
        outcome.transitions.push(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::{FetchError, FetchedDocument};
    use crate::crawler::resource::ResourceKind;
    use crate::state::HarvestStatus;
    use crate::storage::{
        CrawlRunRecord, HarvestRecord, HarvestUpdate, NewHarvest, ResourceRecord, SqliteStorage,
        StorageResult, TargetRecord,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedProbe(Protection);

    #[async_trait]
    impl ProtectionProbe for FixedProbe {
        async fn detect(&self, _url: &str) -> Protection {
            self.0.clone()
        }
    }

    /// Serves pages by URL suffix; anything else fails
    struct StubFetcher {
        name: &'static str,
        pages: Vec<(&'static str, Result<&'static str, FetchError>)>,
        calls: AtomicU32,
    }

    impl StubFetcher {
        fn new(name: &'static str, pages: Vec<(&'static str, Result<&'static str, FetchError>)>) -> Arc<Self> {
            Arc::new(Self {
                name,
                pages,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page = self
                .pages
                .iter()
                .find(|(suffix, _)| url.ends_with(suffix))
                .map(|(_, page)| page.clone())
                .unwrap_or_else(|| {
                    Err(FetchError::Network {
                        url: url.to_string(),
                        message: "no route".to_string(),
                    })
                });
            page.map(|html| FetchedDocument {
                url: url.to_string(),
                status: 200,
                content_type: Some("text/html".to_string()),
                body: html.as_bytes().to_vec(),
                transport: self.name,
            })
        }
    }

    const SEARCH_PAGE: &str = r#"<html><head><title>Example</title></head><body>
        <form action="/search"><input type="text" name="q"></form>
        <script src="/app.js"></script>
        </body></html>"#;

    fn test_config(fetch_scripts: bool) -> Config {
        let mut config = Config::default();
        config.retry.max_attempts = 2;
        config.retry.retry_delay_ms = 1;
        config.crawl.fetch_scripts = fetch_scripts;
        config
    }

    fn orchestrator(
        probe: Protection,
        direct: Arc<StubFetcher>,
        proxied: Option<Arc<StubFetcher>>,
        solver: Arc<StubFetcher>,
        fetch_scripts: bool,
    ) -> (CrawlOrchestrator<SqliteStorage>, Arc<Mutex<SqliteStorage>>) {
        let store = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let transports = Transports {
            probe: Arc::new(FixedProbe(probe)),
            direct,
            proxied: proxied.map(|p| p as Arc<dyn Fetcher>),
            solver,
            rotator: None,
        };
        let orchestrator =
            CrawlOrchestrator::new(store.clone(), transports, &test_config(fetch_scripts), "hash");
        (orchestrator, store)
    }

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unprotected_domain_completes() {
        let direct = StubFetcher::new("direct", vec![("example.com/", Ok(SEARCH_PAGE))]);
        let solver = StubFetcher::new("challenge_solver", vec![]);
        let (orchestrator, store) =
            orchestrator(Protection::Unprotected, direct.clone(), None, solver.clone(), false);

        let summary = orchestrator.process_domains(&domains(&["example.com"])).await;

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.succeeded, 1);
        assert!(summary.unresolved.is_empty());

        let run = &summary.runs[0];
        assert_eq!(
            run.transitions,
            vec![
                CrawlRunState::Created,
                CrawlRunState::Fetching,
                CrawlRunState::Parsing,
                CrawlRunState::Completed
            ]
        );
        assert_eq!(run.transport.as_deref(), Some("direct"));
        assert_eq!(solver.calls(), 0);

        let store = store.lock().unwrap();
        let record = store.get_run(run.run_id).unwrap();
        assert!(record.completed_at.is_some());
        assert!(record.summary.unwrap().contains("\"forms\":1"));
        assert_eq!(store.get_target(run.target_id).unwrap().status, TargetStatus::Done);

        let resources = store.list_resources(run.run_id).unwrap();
        assert_eq!(resources[0].kind, ResourceKind::Html);
        let forms: Vec<_> = resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Form)
            .collect();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].method.as_deref(), Some("GET"));
        assert_eq!(forms[0].url, "https://example.com/search");
    }

    #[tokio::test]
    async fn test_protected_domain_uses_solver() {
        let direct = StubFetcher::new("direct", vec![]);
        let solver = StubFetcher::new("challenge_solver", vec![("example.com/", Ok(SEARCH_PAGE))]);
        let (orchestrator, _store) = orchestrator(
            Protection::Protected("challenge".to_string()),
            direct.clone(),
            None,
            solver.clone(),
            false,
        );

        let summary = orchestrator.process_domains(&domains(&["example.com"])).await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.runs[0].transport.as_deref(), Some("challenge_solver"));
        assert_eq!(direct.calls(), 0);
    }

    #[tokio::test]
    async fn test_undetermined_probe_takes_bypass_path() {
        let direct = StubFetcher::new("direct", vec![("example.com/", Ok(SEARCH_PAGE))]);
        let solver = StubFetcher::new("challenge_solver", vec![("example.com/", Ok(SEARCH_PAGE))]);
        let (orchestrator, _store) = orchestrator(
            Protection::Undetermined("probe timed out".to_string()),
            direct.clone(),
            None,
            solver.clone(),
            false,
        );

        orchestrator.process_domains(&domains(&["example.com"])).await;
        assert_eq!(solver.calls(), 1);
        assert_eq!(direct.calls(), 0);
    }

    #[tokio::test]
    async fn test_forbidden_escalates_to_proxy() {
        let forbidden = FetchError::ProtocolRejected {
            url: "https://example.com/".to_string(),
            status: 403,
        };
        let direct = StubFetcher::new("direct", vec![("example.com/", Err(forbidden))]);
        let proxied = StubFetcher::new("proxied", vec![("example.com/", Ok(SEARCH_PAGE))]);
        let solver = StubFetcher::new("challenge_solver", vec![]);
        let (orchestrator, _store) = orchestrator(
            Protection::Unprotected,
            direct.clone(),
            Some(proxied.clone()),
            solver,
            false,
        );

        let summary = orchestrator.process_domains(&domains(&["example.com"])).await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.runs[0].transport.as_deref(), Some("proxied"));
        assert_eq!(direct.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_domain() {
        let direct = StubFetcher::new("direct", vec![("good.example/", Ok(SEARCH_PAGE))]);
        let solver = StubFetcher::new("challenge_solver", vec![]);
        let (orchestrator, store) =
            orchestrator(Protection::Unprotected, direct, None, solver, false);

        let summary = orchestrator
            .process_domains(&domains(&["bad.example", "-", ".x.com", "good.example"]))
            .await;

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(summary.unresolved.len(), 1);

        let unresolved = &summary.unresolved[0];
        assert_eq!(unresolved.domain, "bad.example");
        assert!(unresolved.reason.contains("gave up"));

        let run = store.lock().unwrap().get_run(unresolved.run_id.unwrap()).unwrap();
        assert_eq!(run.state, CrawlRunState::Failed);
        assert!(run.completed_at.is_some());
        assert!(run.error_message.unwrap().contains("2 attempts"));
    }

    #[tokio::test]
    async fn test_zero_successes_still_summarized() {
        let direct = StubFetcher::new("direct", vec![]);
        let solver = StubFetcher::new("challenge_solver", vec![]);
        let (orchestrator, _store) =
            orchestrator(Protection::Unprotected, direct, None, solver, false);

        let summary = orchestrator
            .process_domains(&domains(&["one.example", "two.example"]))
            .await;
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.unresolved.len(), 2);
        assert!(summary
            .runs
            .iter()
            .all(|run| run.transitions.last() == Some(&CrawlRunState::Failed)));
    }

    #[tokio::test]
    async fn test_script_bodies_fetched_once_with_placeholder() {
        let direct = StubFetcher::new("direct", vec![("example.com/", Ok(SEARCH_PAGE))]);
        let solver = StubFetcher::new("challenge_solver", vec![]);
        let (orchestrator, store) =
            orchestrator(Protection::Unprotected, direct.clone(), None, solver, true);

        let outcome = orchestrator.process_url("example.com").await.unwrap();
        assert!(outcome.is_success());
        // page plus one script attempt, no retry for the script
        assert_eq!(direct.calls(), 2);

        let resources = store.lock().unwrap().list_resources(outcome.run_id).unwrap();
        let script = resources
            .iter()
            .find(|r| r.kind == ResourceKind::Script)
            .unwrap();
        assert_eq!(
            script.content.as_deref(),
            Some("// failed to fetch script from https://example.com/app.js")
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_run() {
        let direct = StubFetcher::new("direct", vec![]);
        let solver = StubFetcher::new("challenge_solver", vec![]);
        let (orchestrator, store) =
            orchestrator(Protection::Unprotected, direct, None, solver, false);

        assert!(matches!(
            orchestrator.process_url("ftp://example.com").await,
            Err(KageError::Validation(_))
        ));
        assert_eq!(store.lock().unwrap().count_targets().unwrap(), 0);
    }
    /// In-memory store that fails selected writes
    #[derive(Default)]
    struct FlakyStore {
        inner: Option<SqliteStorage>,
        /// Number of resource appends allowed before they start failing
        appends_allowed: Option<usize>,
        appends: usize,
        fail_activation: bool,
        fail_fetching: bool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: Some(SqliteStorage::new_in_memory().unwrap()),
                ..Self::default()
            }
        }

        fn db(&self) -> &SqliteStorage {
            self.inner.as_ref().unwrap()
        }

        fn db_mut(&mut self) -> &mut SqliteStorage {
            self.inner.as_mut().unwrap()
        }

        fn disk_full() -> StorageError {
            StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }
    }

    impl ArtifactStore for FlakyStore {
        fn register_target(&mut self, url: &str, url_no_scheme: &str, owner: &str) -> StorageResult<i64> {
            self.db_mut().register_target(url, url_no_scheme, owner)
        }

        fn get_target(&self, target_id: i64) -> StorageResult<TargetRecord> {
            self.db().get_target(target_id)
        }

        fn find_target(&self, url: &str, owner: &str) -> StorageResult<Option<TargetRecord>> {
            self.db().find_target(url, owner)
        }

        fn update_target_status(&mut self, target_id: i64, status: TargetStatus) -> StorageResult<()> {
            if self.fail_activation && status == TargetStatus::Active {
                return Err(Self::disk_full());
            }
            self.db_mut().update_target_status(target_id, status)
        }

        fn create_run(&mut self, target_id: i64, config_hash: &str) -> StorageResult<i64> {
            self.db_mut().create_run(target_id, config_hash)
        }

        fn get_run(&self, run_id: i64) -> StorageResult<CrawlRunRecord> {
            self.db().get_run(run_id)
        }

        fn get_latest_run(&self, target_id: i64) -> StorageResult<Option<CrawlRunRecord>> {
            self.db().get_latest_run(target_id)
        }

        fn update_run_state(&mut self, run_id: i64, state: CrawlRunState, error: Option<&str>) -> StorageResult<()> {
            if self.fail_fetching && state == CrawlRunState::Fetching {
                return Err(Self::disk_full());
            }
            self.db_mut().update_run_state(run_id, state, error)
        }

        fn set_run_summary(&mut self, run_id: i64, summary: &str) -> StorageResult<()> {
            self.db_mut().set_run_summary(run_id, summary)
        }

        fn append_resource(&mut self, run_id: i64, resource: &DiscoveredResource, position: usize) -> StorageResult<i64> {
            if self.appends_allowed.map_or(false, |allowed| self.appends >= allowed) {
                return Err(Self::disk_full());
            }
            self.appends += 1;
            self.db_mut().append_resource(run_id, resource, position)
        }

        fn list_resources(&self, run_id: i64) -> StorageResult<Vec<ResourceRecord>> {
            self.db().list_resources(run_id)
        }

        fn create_harvest(&mut self, harvest: &NewHarvest<'_>) -> StorageResult<i64> {
            self.db_mut().create_harvest(harvest)
        }

        fn update_harvest(&mut self, harvest_id: i64, update: &HarvestUpdate<'_>) -> StorageResult<()> {
            self.db_mut().update_harvest(harvest_id, update)
        }

        fn get_harvest(&self, harvest_id: i64) -> StorageResult<HarvestRecord> {
            self.db().get_harvest(harvest_id)
        }

        fn get_latest_harvest(&self, target_id: i64) -> StorageResult<Option<HarvestRecord>> {
            self.db().get_latest_harvest(target_id)
        }

        fn count_targets(&self) -> StorageResult<u64> {
            self.db().count_targets()
        }

        fn count_runs_by_state(&self, state: CrawlRunState) -> StorageResult<u64> {
            self.db().count_runs_by_state(state)
        }

        fn count_resources_by_kind(&self, kind: ResourceKind) -> StorageResult<u64> {
            self.db().count_resources_by_kind(kind)
        }

        fn count_harvests_by_status(&self, status: HarvestStatus) -> StorageResult<u64> {
            self.db().count_harvests_by_status(status)
        }
    }

    fn flaky_orchestrator(store: FlakyStore) -> (CrawlOrchestrator<FlakyStore>, Arc<Mutex<FlakyStore>>) {
        let store = Arc::new(Mutex::new(store));
        let transports = Transports {
            probe: Arc::new(FixedProbe(Protection::Unprotected)),
            direct: StubFetcher::new("direct", vec![("example.com/", Ok(SEARCH_PAGE))]),
            proxied: None,
            solver: StubFetcher::new("challenge_solver", vec![]),
            rotator: None,
        };
        let orchestrator = CrawlOrchestrator::new(store.clone(), transports, &test_config(false), "hash");
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_parsing_failure_keeps_partial_resources() {
        let mut flaky = FlakyStore::new();
        // the document and the form go in, the script append fails
        flaky.appends_allowed = Some(2);
        let (orchestrator, store) = flaky_orchestrator(flaky);

        let outcome = orchestrator.process_url("example.com").await.unwrap();

        assert_eq!(
            outcome.transitions,
            vec![
                CrawlRunState::Created,
                CrawlRunState::Fetching,
                CrawlRunState::Parsing,
                CrawlRunState::Failed
            ]
        );
        assert!(outcome.error.as_deref().unwrap().contains("disk full"));

        let store = store.lock().unwrap();
        let record = store.get_run(outcome.run_id).unwrap();
        assert_eq!(record.state, CrawlRunState::Failed);
        assert!(record.error_message.unwrap().contains("disk full"));
        assert!(record.completed_at.is_some());

        let kinds: Vec<_> = store
            .list_resources(outcome.run_id)
            .unwrap()
            .iter()
            .map(|r| r.kind)
            .collect();
        assert_eq!(kinds, vec![ResourceKind::Html, ResourceKind::Form]);
    }

    #[tokio::test]
    async fn test_activation_failure_fails_the_run() {
        let mut flaky = FlakyStore::new();
        flaky.fail_activation = true;
        let (orchestrator, store) = flaky_orchestrator(flaky);

        let summary = orchestrator.process_domains(&domains(&["example.com"])).await;
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.unresolved.len(), 1);

        let run = &summary.runs[0];
        assert_eq!(run.transitions, vec![CrawlRunState::Created, CrawlRunState::Failed]);
        assert_eq!(summary.unresolved[0].run_id, Some(run.run_id));

        let record = store.lock().unwrap().get_run(run.run_id).unwrap();
        assert_eq!(record.state, CrawlRunState::Failed);
        assert!(record.error_message.is_some());
    }

    #[tokio::test]
    async fn test_rejected_fetching_transition_fails_the_run() {
        let mut flaky = FlakyStore::new();
        flaky.fail_fetching = true;
        let (orchestrator, store) = flaky_orchestrator(flaky);

        let outcome = orchestrator.process_url("example.com").await.unwrap();
        assert_eq!(outcome.state, CrawlRunState::Failed);
        assert_eq!(outcome.transitions, vec![CrawlRunState::Created, CrawlRunState::Failed]);

        let store = store.lock().unwrap();
        let record = store.get_run(outcome.run_id).unwrap();
        assert_eq!(record.state, CrawlRunState::Failed);
        assert!(record.completed_at.is_some());
        assert_eq!(
            store.get_target(outcome.target_id).unwrap().status,
            TargetStatus::Done
        );
    }
}
