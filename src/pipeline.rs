//! One run: reuse a fresh cache, or fetch every category and save the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::cache::ResultCache;
use crate::config::{CategorySpec, Settings};
use crate::fetch::Fetcher;
use crate::model::{CategoryMap, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Fresh,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub products: CategoryMap,
    pub origin: Origin,
    pub elapsed: Duration,
}

/// Produce the category mapping for this run.
///
/// With `refresh` the cache is not read, but a fresh result is still saved.
pub async fn run(
    fetcher: &Fetcher,
    settings: &Settings,
    categories: &[CategorySpec],
    cache: &ResultCache,
    refresh: bool,
) -> RunOutcome {
    let started = Instant::now();

    if !refresh {
        if let Some(snapshot) = cache.load() {
            tracing::info!(captured_at = %snapshot.captured_at, "using cached data, skipping scrape");
            return RunOutcome {
                products: snapshot.products,
                origin: Origin::Cache,
                elapsed: started.elapsed(),
            };
        }
    }

    if settings.product_api.enabled {
        tracing::warn!(
            credentials = settings.product_api.has_credentials(),
            "structured product API is enabled but not supported; using page extraction"
        );
    }

    tracing::info!(categories = categories.len(), "no valid cache, starting fresh scrape");
    let products = collect_all(fetcher, categories, settings).await;
    cache.save(&products);

    RunOutcome {
        products,
        origin: Origin::Fresh,
        elapsed: started.elapsed(),
    }
}

/// Fetch all categories concurrently. A category that panics or overruns its
/// wait ceiling contributes an empty list; the rest are unaffected.
///
/// The result lists categories in `categories` order.
pub async fn collect_all(
    fetcher: &Fetcher,
    categories: &[CategorySpec],
    settings: &Settings,
) -> CategoryMap {
    let wait = settings.timeouts.category_wait;
    let permits = Arc::new(Semaphore::new(settings.limits.category_concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for spec in categories.iter().cloned() {
        let fetcher = fetcher.clone();
        let permits = Arc::clone(&permits);
        join_set.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (spec.name, Vec::new());
            };
            let name = spec.name.clone();
            let mut handle = tokio::spawn(async move { fetcher.fetch_category(&spec).await });
            match timeout(wait, &mut handle).await {
                Ok(Ok((_, products))) => (name, products),
                Ok(Err(err)) => {
                    tracing::warn!(category = %name, panicked = err.is_panic(), error = %err, "category processing failed");
                    (name, Vec::new())
                }
                Err(_) => {
                    handle.abort();
                    tracing::warn!(category = %name, wait_secs = wait.as_secs(), "category timed out");
                    (name, Vec::new())
                }
            }
        });
    }

    let mut finished: HashMap<String, Vec<Product>> = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((name, products)) => {
                finished.insert(name, products);
            }
            // The wrapper task only awaits; it fails only if the runtime shuts down.
            Err(err) => tracing::warn!(error = %err, "category task failed"),
        }
    }

    let mut map = CategoryMap::new();
    for spec in categories {
        let products = finished.remove(&spec.name).unwrap_or_default();
        map.insert(spec.name.clone(), products);
    }
    map
}
