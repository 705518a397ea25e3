//! Batched parameter harvesting with incremental commits

use crate::harvest::params::process_batch;
use crate::harvest::report::{render_empty_report, render_report, ReportHeader};
use crate::harvest::source::{CandidateSource, ExclusionFilter};
use crate::state::HarvestStatus;
use crate::storage::{ArtifactStore, HarvestUpdate, NewHarvest};
use crate::KageError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info};

/// Default number of candidates per committed batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Ownership of a harvest run
#[derive(Debug, Clone)]
pub struct HarvestContext {
    pub target_id: i64,
    pub owner: String,
    pub crawl_run_id: Option<i64>,
}

/// Final totals of a harvest run
#[derive(Debug, Clone, Serialize)]
pub struct HarvestResult {
    pub harvest_id: i64,
    pub status: HarvestStatus,
    pub total_urls: u64,
    pub unique_parameters: u64,
    pub parameters: Vec<String>,
    pub message: String,
}

/// Streams a candidate corpus through parameter extraction
///
/// Batches run strictly in sequence; each one commits a `processing` update
/// with cumulative totals and a regenerated report, so progress is visible
/// while the run is in flight and survives up to the last commit.
pub struct ParameterHarvester<S> {
    store: Arc<Mutex<S>>,
    batch_size: usize,
}

impl<S: ArtifactStore> ParameterHarvester<S> {
    pub fn new(store: Arc<Mutex<S>>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs one harvest pass for `domain`
    ///
    /// Candidate-source and store failures mark the run `error` (best
    /// effort) and are returned to the caller.
    pub async fn harvest(
        &self,
        context: &HarvestContext,
        domain: &str,
        exclude: &str,
        concurrency: u32,
        source: &dyn CandidateSource,
    ) -> Result<HarvestResult, KageError> {
        let harvest_id = self.lock().create_harvest(&NewHarvest {
            target_id: context.target_id,
            owner: &context.owner,
            crawl_run_id: context.crawl_run_id,
            exclude,
            concurrency,
        })?;
        info!(
            "Harvest {} started for {} using {} source",
            harvest_id,
            domain,
            source.name()
        );

        match self
            .run_batches(harvest_id, context, domain, exclude, source)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Harvest {} for {} failed: {}", harvest_id, domain, e);
                let message = e.to_string();
                let marked = {
                    let mut store = self.lock();
                    // Totals stay at the last committed batch
                    let (total_urls, unique_parameters) = store
                        .get_harvest(harvest_id)
                        .map(|record| (record.total_urls, record.unique_parameters))
                        .unwrap_or((0, 0));
                    store.update_harvest(
                        harvest_id,
                        &HarvestUpdate {
                            status: HarvestStatus::Error,
                            total_urls,
                            unique_parameters,
                            report: None,
                            error_message: Some(&message),
                        },
                    )
                };
                if let Err(mark_err) = marked {
                    error!("Could not mark harvest {} as error: {}", harvest_id, mark_err);
                }
                Err(e)
            }
        }
    }

    async fn run_batches(
        &self,
        harvest_id: i64,
        context: &HarvestContext,
        domain: &str,
        exclude: &str,
        source: &dyn CandidateSource,
    ) -> Result<HarvestResult, KageError> {
        let filter = ExclusionFilter::parse(exclude);
        let candidates = source.candidates(domain, &filter).await?;
        let header = ReportHeader {
            target_id: context.target_id,
            owner: &context.owner,
            crawl_run_id: context.crawl_run_id,
            domain,
        };

        let mut parameters = BTreeSet::new();
        let mut urls = Vec::new();

        for (index, batch) in candidates.chunks(self.batch_size).enumerate() {
            let extraction = process_batch(batch);
            parameters.extend(extraction.parameters);
            urls.extend(extraction.urls);

            let report = render_report(&header, urls.len() as u64, &parameters, &urls);
            self.lock().update_harvest(
                harvest_id,
                &HarvestUpdate {
                    status: HarvestStatus::Processing,
                    total_urls: urls.len() as u64,
                    unique_parameters: parameters.len() as u64,
                    report: Some(&report),
                    error_message: None,
                },
            )?;
            debug!(
                "Harvest {} batch {}: {} URLs, {} parameters so far",
                harvest_id,
                index + 1,
                urls.len(),
                parameters.len()
            );
        }

        let report = if urls.is_empty() {
            render_empty_report(&header)
        } else {
            render_report(&header, urls.len() as u64, &parameters, &urls)
        };
        let total_urls = urls.len() as u64;
        let unique_parameters = parameters.len() as u64;

        self.lock().update_harvest(
            harvest_id,
            &HarvestUpdate {
                status: HarvestStatus::Completed,
                total_urls,
                unique_parameters,
                report: Some(&report),
                error_message: None,
            },
        )?;

        let message = if total_urls == 0 {
            format!("{}: no URLs found with query parameters", domain)
        } else {
            format!(
                "{}: {} URLs, {} unique parameters",
                domain, total_urls, unique_parameters
            )
        };
        info!("Harvest {} completed: {}", harvest_id, message);

        Ok(HarvestResult {
            harvest_id,
            status: HarvestStatus::Completed,
            total_urls,
            unique_parameters,
            parameters: parameters.into_iter().collect(),
            message,
        })
    }
}
