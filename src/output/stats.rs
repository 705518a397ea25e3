//! Statistics generation from the artifact store

use crate::crawler::ResourceKind;
use crate::state::{CrawlRunState, HarvestStatus};
use crate::storage::ArtifactStore;
use crate::KageError;
use serde::Serialize;

/// Store-wide counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconStatistics {
    pub targets: u64,

    /// Non-zero run counts, in lifecycle order
    pub runs_by_state: Vec<(CrawlRunState, u64)>,

    /// Non-zero resource counts, in persistence order
    pub resources_by_kind: Vec<(ResourceKind, u64)>,

    pub harvests_by_status: Vec<(HarvestStatus, u64)>,
}

impl ReconStatistics {
    pub fn total_runs(&self) -> u64 {
        self.runs_by_state.iter().map(|(_, count)| count).sum()
    }

    pub fn total_resources(&self) -> u64 {
        self.resources_by_kind.iter().map(|(_, count)| count).sum()
    }

    pub fn runs_in(&self, state: CrawlRunState) -> u64 {
        self.runs_by_state
            .iter()
            .find(|(s, _)| *s == state)
            .map_or(0, |(_, count)| *count)
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn ArtifactStore) -> Result<ReconStatistics, KageError> {
    let targets = storage.count_targets()?;

    let mut runs_by_state = Vec::new();
    for state in CrawlRunState::all_states() {
        let count = storage.count_runs_by_state(state)?;
        if count > 0 {
            runs_by_state.push((state, count));
        }
    }

    let mut resources_by_kind = Vec::new();
    for kind in ResourceKind::all_kinds() {
        let count = storage.count_resources_by_kind(kind)?;
        if count > 0 {
            resources_by_kind.push((kind, count));
        }
    }

    let mut harvests_by_status = Vec::new();
    for status in [
        HarvestStatus::Running,
        HarvestStatus::Processing,
        HarvestStatus::Completed,
        HarvestStatus::Error,
    ] {
        let count = storage.count_harvests_by_status(status)?;
        if count > 0 {
            harvests_by_status.push((status, count));
        }
    }

    Ok(ReconStatistics {
        targets,
        runs_by_state,
        resources_by_kind,
        harvests_by_status,
    })
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &ReconStatistics) {
    println!("=== Reconnaissance Statistics ===\n");

    println!("Targets: {}", stats.targets);
    println!();

    let total_runs = stats.total_runs();
    println!("Crawl runs ({}):", total_runs);
    for (state, count) in &stats.runs_by_state {
        let percentage = if total_runs > 0 {
            (*count as f64 / total_runs as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    println!("Resources ({}):", stats.total_resources());
    for (kind, count) in &stats.resources_by_kind {
        println!("  {}: {}", kind.to_db_string(), count);
    }
    println!();

    if !stats.harvests_by_status.is_empty() {
        println!("Harvest runs:");
        for (status, count) in &stats.harvests_by_status {
            println!("  {}: {}", status, count);
        }
        println!();
    }

    let completed = stats.runs_in(CrawlRunState::Completed);
    let success_rate = if total_runs > 0 {
        (completed as f64 / total_runs as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Success Rate: {:.1}% ({} / {} runs completed)",
        success_rate, completed, total_runs
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::DiscoveredResource;
    use crate::storage::SqliteStorage;

    #[test]
    fn test_empty_store() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.targets, 0);
        assert_eq!(stats.total_runs(), 0);
        assert!(stats.resources_by_kind.is_empty());
    }

    #[test]
    fn test_counts_by_state_and_kind() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let target_id = storage
            .register_target("https://example.com/", "example.com", "cli")
            .unwrap();
        let done = storage.create_run(target_id, "h").unwrap();
        storage.create_run(target_id, "h").unwrap();
        for state in [
            CrawlRunState::Fetching,
            CrawlRunState::Parsing,
            CrawlRunState::Completed,
        ] {
            storage.update_run_state(done, state, None).unwrap();
        }
        storage
            .append_resource(
                done,
                &DiscoveredResource::HtmlDocument {
                    url: "https://example.com/".to_string(),
                    content: "<html></html>".to_string(),
                },
                0,
            )
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.targets, 1);
        assert_eq!(stats.total_runs(), 2);
        assert_eq!(stats.runs_in(CrawlRunState::Completed), 1);
        assert_eq!(stats.runs_in(CrawlRunState::Created), 1);
        assert_eq!(stats.resources_by_kind, vec![(ResourceKind::Html, 1)]);
    }
}
