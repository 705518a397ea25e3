//! Kage-Recon main entry point
//!
//! Command-line interface over the crawl orchestrator, the parameter
//! harvester and the artifact store.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kage_recon::config::{load_config_with_hash, Config};
use kage_recon::crawler::{CrawlOrchestrator, Transports};
use kage_recon::harvest::{
    CandidateSource, FileCandidates, HarvestContext, ParameterHarvester, WaybackCandidates,
};
use kage_recon::output::{load_statistics, print_statistics, write_crawl_summary};
use kage_recon::storage::{open_storage, ArtifactStore, SqliteStorage};
use kage_recon::task::{TaskOutcome, TaskPool, STATUS_TIMEOUT};
use kage_recon::url::{parse_domain_list, strip_scheme, target_url};
use kage_recon::KageError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Kage-Recon: unauthenticated web reconnaissance
///
/// Probes targets for bot-mitigation layers, retrieves and classifies their
/// documents, and harvests query parameters from archived URL corpora.
#[derive(Parser, Debug)]
#[command(name = "kage-recon")]
#[command(version)]
#[command(about = "Unauthenticated web reconnaissance", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl one or more domains
    Crawl {
        /// Domains or URLs to crawl
        domains: Vec<String>,

        /// File holding a domain list (JSON array or free text)
        #[arg(long, value_name = "PATH")]
        domains_file: Option<PathBuf>,

        /// Owner recorded on registered targets
        #[arg(long, value_name = "ID")]
        owner: Option<String>,
    },

    /// Harvest query parameters for a domain
    Harvest {
        domain: String,

        /// Read candidate URLs from a file, one per line
        #[arg(long, value_name = "PATH", conflicts_with = "wayback")]
        urls: Option<PathBuf>,

        /// Query the web archive for candidate URLs (default)
        #[arg(long)]
        wayback: bool,

        /// Comma-separated file extensions to skip
        #[arg(long, value_name = "EXTS")]
        exclude: Option<String>,

        #[arg(long, value_name = "N")]
        concurrency: Option<u32>,

        /// Crawl run the harvest belongs to (defaults to the latest)
        #[arg(long, value_name = "ID")]
        run: Option<i64>,
    },

    /// Print the latest harvest report for a domain
    Show { domain: String },

    /// Print store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    match cli.command {
        Command::Crawl {
            domains,
            domains_file,
            owner,
        } => handle_crawl(config, config_hash, domains, domains_file, owner).await,
        Command::Harvest {
            domain,
            urls,
            wayback: _,
            exclude,
            concurrency,
            run,
        } => handle_harvest(config, domain, urls, exclude, concurrency, run).await,
        Command::Show { domain } => handle_show(&config, &domain),
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("kage_recon=info,warn"),
            1 => EnvFilter::new("kage_recon=debug,info"),
            2 => EnvFilter::new("kage_recon=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    open_storage(path).with_context(|| format!("failed to open database {}", path.display()))
}

fn print_outcome(outcome: &TaskOutcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome.payload)?);
    println!("success: {} (status {})", outcome.success, outcome.status_code);
    Ok(())
}

/// Prints the outcome, then keeps the runtime alive until the run has
/// reached a terminal state in the store
async fn finish(pool: &TaskPool, outcome: TaskOutcome) -> anyhow::Result<()> {
    print_outcome(&outcome)?;
    if outcome.status_code == STATUS_TIMEOUT {
        println!("Still running in the background; waiting for it to finish...");
    }
    pool.wait_idle().await;
    Ok(())
}

async fn handle_crawl(
    config: Config,
    config_hash: String,
    mut domains: Vec<String>,
    domains_file: Option<PathBuf>,
    owner: Option<String>,
) -> anyhow::Result<()> {
    if let Some(path) = domains_file {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        domains.extend(parse_domain_list(&raw));
    }
    if domains.is_empty() {
        bail!("no domains given; pass them as arguments or with --domains-file");
    }
    tracing::info!("Crawling {} domain(s)", domains.len());

    let store = Arc::new(Mutex::new(open_store(&config)?));
    let transports = Transports::from_config(&config)?;
    let mut orchestrator = CrawlOrchestrator::new(store, transports, &config, config_hash);
    if let Some(owner) = owner {
        orchestrator = orchestrator.with_owner(owner);
    }

    let summary_path = config.output.summary_path.clone().map(PathBuf::from);
    let pool = TaskPool::new(config.tasks.max_concurrent_runs);
    let handle = pool.submit("crawl", async move {
        let summary = orchestrator.process_domains(&domains).await;
        if let Some(path) = summary_path {
            write_crawl_summary(&summary, &path)?;
            tracing::info!("Summary written to {}", path.display());
        }
        Ok::<_, KageError>(summary)
    });

    let outcome = handle
        .await_result(Duration::from_secs(config.tasks.await_timeout_secs))
        .await;
    finish(&pool, outcome).await
}

async fn handle_harvest(
    config: Config,
    domain: String,
    urls: Option<PathBuf>,
    exclude: Option<String>,
    concurrency: Option<u32>,
    run: Option<i64>,
) -> anyhow::Result<()> {
    let url = target_url(&domain.trim().to_lowercase())?;
    let domain = url.host_str().unwrap_or_default().to_string();
    let owner = config.crawl.owner.clone();

    let mut store = open_store(&config)?;
    let target_id = store.register_target(url.as_str(), &strip_scheme(&url), &owner)?;
    let crawl_run_id = match run {
        Some(id) => Some(store.get_run(id)?.id),
        None => store.get_latest_run(target_id)?.map(|record| record.id),
    };

    let source: Box<dyn CandidateSource> = match urls {
        Some(path) => Box::new(FileCandidates::new(path)),
        None => Box::new(WaybackCandidates::new(&config.harvest.wayback_endpoint)?),
    };
    let exclude = exclude.unwrap_or_else(|| config.harvest.exclude.clone());
    let concurrency = concurrency.unwrap_or(config.harvest.concurrency);
    let context = HarvestContext {
        target_id,
        owner,
        crawl_run_id,
    };

    let harvester = ParameterHarvester::new(Arc::new(Mutex::new(store)), config.harvest.batch_size);
    let pool = TaskPool::new(config.tasks.max_concurrent_runs);
    let handle = pool.submit(format!("harvest {}", domain), async move {
        harvester
            .harvest(&context, &domain, &exclude, concurrency, source.as_ref())
            .await
    });

    let outcome = handle
        .await_result(Duration::from_secs(config.tasks.await_timeout_secs))
        .await;
    finish(&pool, outcome).await
}

fn handle_show(config: &Config, domain: &str) -> anyhow::Result<()> {
    let url = target_url(domain.trim())?;
    let store = open_store(config)?;

    let Some(target) = store.find_target(url.as_str(), &config.crawl.owner)? else {
        bail!("no target registered for {}", url);
    };
    match store.get_latest_harvest(target.id)? {
        Some(harvest) => {
            println!(
                "Harvest {} ({}), updated {}",
                harvest.id, harvest.status, harvest.updated_at
            );
            if let Some(error) = &harvest.error_message {
                println!("Error: {}", error);
            }
            println!();
            println!("{}", harvest.report.as_deref().unwrap_or("(no report yet)"));
        }
        None => println!("No harvest recorded for {}", url),
    }
    Ok(())
}

fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);
    let store = open_store(config)?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);
    Ok(())
}
