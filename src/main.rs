//! bestseller-board: scrape category bestsellers, cache them, render a link page.

mod cache;
mod config;
mod extract;
mod fetch;
mod model;
mod pipeline;
mod pool;
mod render;
mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::cache::ResultCache;
use crate::config::{Settings, DEFAULT_OUTPUT_PATH};
use crate::fetch::Fetcher;
use crate::pipeline::Origin;
use crate::pool::SessionPool;
use crate::source::{HttpSource, PageSource};

#[derive(Parser)]
#[command(name = "bestseller-board")]
#[command(about = "Scrape bestseller lists and render a static page of affiliate links")]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch bestsellers (or reuse a fresh cache) and write the HTML page.
    Build {
        /// Output HTML file.
        #[arg(long, short, default_value = DEFAULT_OUTPUT_PATH)]
        output: PathBuf,

        /// Cache file (defaults to BESTSELLERS_CACHE_FILE or products_cache.json).
        #[arg(long, short)]
        cache: Option<PathBuf>,

        /// Ignore any cached snapshot and scrape again.
        #[arg(long)]
        refresh: bool,

        /// JSON file with [{"name": ..., "url": ...}] to use instead of the built-in categories.
        #[arg(long)]
        categories: Option<PathBuf>,
    },

    /// Show what the cache file holds, fresh or not.
    Inspect {
        /// Cache file (defaults to BESTSELLERS_CACHE_FILE or products_cache.json).
        #[arg(long, short)]
        cache: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut settings = Settings::from_env();
    match cli.command {
        Command::Build {
            output,
            cache,
            refresh,
            categories,
        } => {
            if let Some(cache) = cache {
                settings.cache_path = cache;
            }
            run_build(settings, &output, refresh, categories.as_deref())?;
        }
        Command::Inspect { cache } => {
            if let Some(cache) = cache {
                settings.cache_path = cache;
            }
            run_inspect(&settings)?;
        }
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_build(
    settings: Settings,
    output: &Path,
    refresh: bool,
    categories_path: Option<&Path>,
) -> anyhow::Result<()> {
    let categories = match categories_path {
        Some(path) => config::load_categories(path)?,
        None => config::default_categories(),
    };

    let settings = Arc::new(settings);
    let pool = Arc::new(SessionPool::new(settings.pool_capacity, settings.user_agent.as_str()));
    let source: Arc<dyn PageSource> = Arc::new(HttpSource::new(Arc::clone(&pool)));
    let fetcher = Fetcher::new(source, Arc::clone(&settings));
    let cache = ResultCache::new(settings.cache_path.clone(), settings.cache_max_age);

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(pipeline::run(&fetcher, &settings, &categories, &cache, refresh));
    tracing::debug!(idle = pool.idle(), capacity = pool.capacity(), "session pool after run");

    render::write_page(&outcome.products, &settings, output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    let total = outcome.products.total_products();
    let secs = outcome.elapsed.as_secs_f64();
    tracing::info!(
        output = %output.display(),
        products = total,
        categories = outcome.products.len(),
        from_cache = outcome.origin == Origin::Cache,
        elapsed_secs = %format!("{secs:.1}"),
        products_per_sec = %format!("{:.1}", total as f64 / secs.max(f64::EPSILON)),
        "page written"
    );
    Ok(())
}

fn run_inspect(settings: &Settings) -> anyhow::Result<()> {
    let cache = ResultCache::new(settings.cache_path.clone(), settings.cache_max_age);
    let snapshot = cache
        .peek()
        .with_context(|| format!("failed to read {}", cache.path().display()))?;
    let Some(snapshot) = snapshot else {
        println!("No cache at {}", cache.path().display());
        return Ok(());
    };

    let now = Utc::now();
    let age = snapshot.age(now);
    let fresh = snapshot.is_fresh(now, settings.cache_max_age);
    println!(
        "{}: captured {} ({} min ago, {})",
        cache.path().display(),
        snapshot.captured_at.to_rfc3339(),
        age.num_minutes(),
        if fresh { "fresh" } else { "stale" }
    );
    if snapshot.products.is_empty() {
        println!("  (no categories)");
    }
    for (category, products) in snapshot.products.iter() {
        println!("  {:>3}  {}", products.len(), category);
    }
    println!("  {:>3}  total", snapshot.products.total_products());
    Ok(())
}
