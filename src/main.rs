//! News-Harvest main entry point
//!
//! This is the command-line interface for the News-Harvest article harvester.

use clap::Parser;
use news_harvest::config::{load_config_with_hash, Config};
use news_harvest::crawler::{
    harvest, resolve_proxy, Coordinator, CrawlSettings, HttpFetcherFactory,
};
use news_harvest::storage::{SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// News-Harvest: an incremental news article harvester
///
/// News-Harvest walks the category listings of configured news sites,
/// skips articles fetched in earlier runs, and saves the new ones as JSON.
#[derive(Parser, Debug)]
#[command(name = "news-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An incremental news article harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and list the articles that would be fetched
    #[arg(long, conflicts_with_all = ["stats", "every"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "every"])]
    stats: bool,

    /// Repeat the harvest every MINUTES minutes
    #[arg(long, value_name = "MINUTES", value_parser = clap::value_parser!(u64).range(1..))]
    every: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config).await?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(minutes) = cli.every {
        handle_periodic(&config, &config_hash, minutes).await;
    } else {
        handle_harvest(&config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("news_harvest=info,warn"),
            1 => EnvFilter::new("news_harvest=debug,info"),
            2 => EnvFilter::new("news_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows configuration and pending articles
async fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== News-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.max_workers);
    println!("  Max attempts: {}", config.crawler.max_retries);
    println!(
        "  Backoff: {}ms base, {}ms jitter",
        config.crawler.base_delay_ms, config.crawler.jitter_ms
    );
    println!(
        "  Politeness delay: {}-{}ms",
        config.crawler.politeness_min_ms, config.crawler.politeness_max_ms
    );

    println!("\nBrowser:");
    println!("  User agents: {}", config.browser.user_agents.len());
    println!(
        "  Proxy: {}",
        config.browser.proxy.as_deref().unwrap_or("none")
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!(
        "  Files: {}/{}_<category>.json",
        config.output.output_dir, config.output.file_prefix
    );

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(Path::new(
        &config.output.database_path,
    ))?);
    let proxy = resolve_proxy(&config.browser).await;
    let settings = CrawlSettings::from_config(&config.crawler, &config.browser, proxy);

    println!("\n✓ Configuration is valid");

    for site in &config.sites {
        println!(
            "\nSite {} ({:?} pagination, {} categories):",
            site.name,
            site.pagination,
            site.categories.len()
        );

        let coordinator = Coordinator::new(
            site.clone(),
            settings.clone(),
            Arc::clone(&storage),
            HttpFetcherFactory,
        );
        let pending = coordinator.plan(&site.categories).await?;

        for article in &pending {
            println!("  - [{}] {}", article.category, article.url);
        }
        println!("✓ Would fetch {} articles", pending.len());
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use news_harvest::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    // Open the database
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    // Load statistics
    let stats = load_statistics(&storage, 10)?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: &Config,
    config_hash: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Sites: {}, workers: {}",
        config.sites.len(),
        config.crawler.max_workers
    );

    match harvest(config, config_hash).await {
        Ok(output) => {
            tracing::info!(
                "Harvest completed: {} new articles ({} failed)",
                output.totals.succeeded,
                output.totals.failed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the --every mode: harvests on a fixed interval until interrupted
///
/// A failed harvest is logged and the schedule continues.
async fn handle_periodic(config: &Config, config_hash: &str, minutes: u64) {
    let period = Duration::from_secs(minutes * 60);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        tracing::info!("Running scheduled harvest");

        if let Err(e) = handle_harvest(config, config_hash).await {
            tracing::error!("Scheduled harvest failed: {}", e);
        }

        tracing::info!("Next harvest in {} minutes", minutes);
    }
}
