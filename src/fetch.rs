//! Product and category fetching.
//!
//! A category fetch reads one listing page, then fans out one product fetch per
//! id under a semaphore. Products are accepted in the order their fetches
//! complete, so a category's list is not in listing-rank order. Once the
//! per-category cap is reached the remaining product tasks are aborted.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::config::{CategorySpec, Settings};
use crate::extract::{extract_ids, extract_product};
use crate::model::{Product, ProductId};
use crate::source::PageSource;

/// Shared handle the fetch tasks clone into themselves.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn PageSource>,
    settings: Arc<Settings>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn PageSource>, settings: Arc<Settings>) -> Self {
        Self { source, settings }
    }

    /// Fetch and parse one product page. Every failure is logged and becomes `None`.
    pub async fn fetch_product(&self, id: ProductId) -> Option<Product> {
        let url = self.settings.product_url(id.as_str());
        let html = match self.source.fetch(&url, self.settings.timeouts.request).await {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(asin = %id, url = %url, kind = err.kind(), error = %err, "product fetch failed");
                return None;
            }
        };

        let Some(details) = extract_product(&html, id.as_str()) else {
            tracing::debug!(asin = %id, "skipping non-product page");
            return None;
        };

        Some(Product {
            title: truncate_chars(&details.title, self.settings.limits.title_max_chars),
            image_url: details.image_url,
            canonical_url: url,
            id,
        })
    }

    /// Fetch one category: listing page, then its products concurrently.
    ///
    /// Never fails; a broken listing page gives an empty list.
    pub async fn fetch_category(&self, spec: &CategorySpec) -> (String, Vec<Product>) {
        let limits = self.settings.limits;
        let wait = self.settings.timeouts.product_wait;
        tracing::info!(category = %spec.name, "processing category");
        if limits.per_category == 0 {
            return (spec.name.clone(), Vec::new());
        }

        let html = match self
            .source
            .fetch(&spec.listing_url, self.settings.timeouts.request)
            .await
        {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(
                    category = %spec.name,
                    url = %spec.listing_url,
                    kind = err.kind(),
                    error = %err,
                    "listing fetch failed"
                );
                return (spec.name.clone(), Vec::new());
            }
        };

        let ids = extract_ids(&html, limits.listing);
        if ids.is_empty() {
            tracing::warn!(category = %spec.name, "no product ids found");
            return (spec.name.clone(), Vec::new());
        }

        let permits = Arc::new(Semaphore::new(limits.product_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        for id in ids {
            let fetcher = self.clone();
            let permits = Arc::clone(&permits);
            join_set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return None;
                };
                match timeout(wait, fetcher.fetch_product(id.clone())).await {
                    Ok(product) => product,
                    Err(_) => {
                        tracing::warn!(asin = %id, wait_secs = wait.as_secs(), "product fetch timed out");
                        None
                    }
                }
            });
        }

        let mut products = Vec::with_capacity(limits.per_category);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some(product)) => {
                    products.push(product);
                    if products.len() >= limits.per_category {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(category = %spec.name, panicked = err.is_panic(), error = %err, "product task failed");
                }
            }
        }

        if !join_set.is_empty() {
            tracing::debug!(category = %spec.name, outstanding = join_set.len(), "cap reached, aborting remaining fetches");
            join_set.abort_all();
        }

        tracing::info!(category = %spec.name, products = products.len(), "category done");
        (spec.name.clone(), products)
    }
}

/// First `max` characters of `s`, never splitting a character.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => s[..end].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::{listing_html, product_html, FakePage, FakeSource};
    use std::time::Duration;

    const BASE: &str = "https://shop.test";
    const LISTING: &str = "https://shop.test/gp/bestsellers/books";

    fn settings() -> Settings {
        Settings {
            base_url: BASE.to_string(),
            ..Settings::default()
        }
    }

    fn fetcher(source: FakeSource, settings: Settings) -> (Fetcher, Arc<FakeSource>) {
        let source = Arc::new(source);
        let shared: Arc<dyn PageSource> = source.clone();
        (Fetcher::new(shared, Arc::new(settings)), source)
    }

    fn id(n: usize) -> String {
        format!("B{n:09}")
    }

    fn product_url(id: &str) -> String {
        format!("{BASE}/dp/{id}")
    }

    fn books() -> CategorySpec {
        CategorySpec::new("Books", LISTING)
    }

    fn category_source(count: usize) -> FakeSource {
        let ids: Vec<String> = (1..=count).map(id).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut source = FakeSource::new().html(LISTING, listing_html(&refs));
        for id in &ids {
            source = source.html(
                product_url(id),
                product_html(&format!("Book {id}"), "https://m.media-amazon.com/images/I/b.jpg"),
            );
        }
        source
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("åäöåäö", 4), "åäöå");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[tokio::test]
    async fn product_is_built_from_page() {
        let long_title = "x".repeat(150);
        let source = FakeSource::new().html(
            product_url("B000000001"),
            product_html(&long_title, "//m.media-amazon.com/images/I/p._SX38_.jpg"),
        );
        let (fetcher, _) = fetcher(source, settings());

        let product = fetcher
            .fetch_product(ProductId::parse("B000000001").unwrap())
            .await
            .unwrap();
        assert_eq!(product.id.as_str(), "B000000001");
        assert_eq!(product.title.chars().count(), 100);
        assert_eq!(product.canonical_url, "https://shop.test/dp/B000000001");
        assert_eq!(
            product.image_url.as_deref(),
            Some("https://m.media-amazon.com/images/I/p._AC_SL300_.jpg")
        );
    }

    #[tokio::test]
    async fn failed_or_denied_products_are_absent() {
        let source = FakeSource::new()
            .page(product_url("B000000001"), FakePage::Status(503))
            .html(product_url("B000000002"), product_html("Presentkort 500 kr", "https://x.test/a.jpg"));
        let (fetcher, _) = fetcher(source, settings());

        for raw in ["B000000001", "B000000002", "B000000003"] {
            let product = fetcher.fetch_product(ProductId::parse(raw).unwrap()).await;
            assert_eq!(product, None, "{raw}");
        }
    }

    #[tokio::test]
    async fn listing_failure_yields_empty_category() {
        let source = FakeSource::new().page(LISTING, FakePage::Status(500));
        let (fetcher, source) = fetcher(source, settings());

        let (name, products) = fetcher.fetch_category(&books()).await;
        assert_eq!(name, "Books");
        assert!(products.is_empty());
        assert_eq!(source.requests(), 1);
    }

    #[tokio::test]
    async fn category_stops_at_cap() {
        let (fetcher, _) = fetcher(category_source(15), settings());
        let (_, products) = fetcher.fetch_category(&books()).await;
        assert_eq!(products.len(), 12);
        let unique: std::collections::HashSet<_> = products.iter().map(|p| p.id.clone()).collect();
        assert_eq!(unique.len(), 12);
    }

    #[tokio::test]
    async fn listing_cap_bounds_product_requests() {
        let mut settings = settings();
        settings.limits.listing = 4;
        settings.limits.per_category = 10;
        let (fetcher, source) = fetcher(category_source(15), settings);

        let (_, products) = fetcher.fetch_category(&books()).await;
        assert_eq!(products.len(), 4);
        assert_eq!(source.requests(), 5);
    }

    #[tokio::test]
    async fn panicking_product_does_not_spoil_category() {
        let source = category_source(5).page(product_url(&id(3)), FakePage::Panic);
        let (fetcher, _) = fetcher(source, settings());

        let (_, products) = fetcher.fetch_category(&books()).await;
        let mut got: Vec<String> = products.iter().map(|p| p.id.to_string()).collect();
        got.sort();
        assert_eq!(got, [id(1), id(2), id(4), id(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_product_times_out() {
        let source = category_source(3).page(product_url(&id(2)), FakePage::Hang);
        let (fetcher, _) = fetcher(source, settings());

        let (_, products) = fetcher.fetch_category(&books()).await;
        let mut got: Vec<String> = products.iter().map(|p| p.id.to_string()).collect();
        got.sort();
        assert_eq!(got, [id(1), id(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn acceptance_follows_completion_order() {
        let source = category_source(2).page(
            product_url(&id(1)),
            FakePage::Slow(
                Duration::from_secs(3),
                product_html("Slow book", "https://x.test/s.jpg"),
            ),
        );
        let (fetcher, _) = fetcher(source, settings());

        let (_, products) = fetcher.fetch_category(&books()).await;
        let got: Vec<String> = products.iter().map(|p| p.id.to_string()).collect();
        assert_eq!(got, [id(2), id(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn product_fetches_respect_concurrency_limit() {
        let ids: Vec<String> = (1..=10).map(id).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut source = FakeSource::new().html(LISTING, listing_html(&refs));
        for id in &ids {
            source = source.page(
                product_url(id),
                FakePage::Slow(Duration::from_millis(500), product_html(id, "https://x.test/a.jpg")),
            );
        }
        let mut settings = settings();
        settings.limits.product_concurrency = 3;
        let (fetcher, source) = fetcher(source, settings);

        let (_, products) = fetcher.fetch_category(&books()).await;
        assert_eq!(products.len(), 10);
        // The listing request is finished before any product starts.
        assert!(source.peak_in_flight() <= 3);
        assert!(source.peak_in_flight() >= 2);
    }
}
