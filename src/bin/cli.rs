//! Portfolio crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use portfolio_crawler::{
    error::{AppError, Result},
    models::{BuildManifest, Config},
    pipeline::{self, BuildOptions, CircuitBreaker},
    services::{ChangeDetectionCache, HttpTransport},
    storage::{self, LocalPublisher},
};

/// Portfolio directory crawler and static JSON publisher
#[derive(Parser, Debug)]
#[command(
    name = "portfolio-crawler",
    version,
    about = "Crawl a portfolio directory and publish it as static JSON"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "crawler.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl, build and publish
    Build {
        /// Output directory (default: paths.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process at most N directory entries
        #[arg(long)]
        limit: Option<usize>,

        /// Ignore the change-detection cache for this run
        #[arg(long)]
        no_cache: bool,

        /// Publish even if the company count dropped past the threshold
        #[arg(long)]
        force: bool,
    },

    /// Check a published tree for internal consistency
    Verify {
        /// Tree to check (default: paths.output_dir)
        dir: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,

    /// Show the published manifest
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Build {
            output,
            limit,
            no_cache,
            force,
        } => {
            config.validate()?;
            let output_dir = output.unwrap_or_else(|| config.paths.output_dir.clone());
            let cache_file = &config.paths.cache_file;

            let cache = if no_cache {
                log::info!("Cache disabled for this run");
                ChangeDetectionCache::new()
            } else {
                ChangeDetectionCache::load(cache_file).await?
            };
            log::info!("Cache: {} known URL(s)", cache.len());

            let transport = Arc::new(HttpTransport::new(&config.crawler)?);
            let publisher =
                LocalPublisher::new(&output_dir, CircuitBreaker::new(&config.safety));
            let options = BuildOptions { force, limit };

            let outcome =
                pipeline::run_build(&config, transport, &cache, &publisher, &options).await?;

            cache.save(cache_file).await?;
            pipeline::save_report(&outcome.report, &config.paths.report_file).await?;
            log::info!("Run report saved to {}", config.paths.report_file.display());

            let report = outcome.into_result()?;
            if report.unchanged {
                log::info!("Nothing changed; {} left as-is", output_dir.display());
            } else {
                log::info!(
                    "Published {} companies to {}",
                    report.published_count,
                    output_dir.display()
                );
            }
        }

        Command::Verify { dir } => {
            let dir = dir.unwrap_or_else(|| config.paths.output_dir.clone());
            let problems = storage::verify_tree(&dir, config.safety.min_companies).await?;
            if !problems.is_empty() {
                for problem in &problems {
                    log::error!("{}", problem);
                }
                return Err(AppError::validation(format!(
                    "{} problem(s) in {}",
                    problems.len(),
                    dir.display()
                )));
            }
            log::info!("✓ {} is consistent", dir.display());
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({})", cli.config.display());
        }

        Command::Info => {
            let meta_path = config.paths.output_dir.join("meta.json");
            if !meta_path.exists() {
                log::info!("No published build in {}", config.paths.output_dir.display());
                return Ok(());
            }
            let manifest: BuildManifest =
                serde_json::from_slice(&tokio::fs::read(&meta_path).await?)?;
            log::info!("Last updated: {}", manifest.last_updated_iso);
            log::info!("Schema version: {}", manifest.schema_version);
            log::info!("Source: {}", manifest.source_entry_url);
            log::info!("Companies: {}", manifest.total_companies);
            for (stage, count) in &manifest.counts_by_stage {
                log::info!("  {:<14} {}", stage, count);
            }
            log::info!("Categories: {}", manifest.counts_by_category.len());
        }
    }

    Ok(())
}
