//! Static run configuration: categories, limits, timeouts and the env surface.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://www.amazon.se";
pub const DEFAULT_ASSOCIATE_TAG: &str = "amzing2025-21";
pub const DEFAULT_CACHE_PATH: &str = "products_cache.json";
pub const DEFAULT_OUTPUT_PATH: &str = "index.html";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                      (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

const DEFAULT_POOL_CAPACITY: usize = 5;
const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(2 * 60 * 60);

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Beauty & Personal Care", "https://www.amazon.se/gp/bestsellers/beauty"),
    ("Home & Kitchen", "https://www.amazon.se/gp/bestsellers/kitchen"),
    ("Clothing, Shoes & Jewelry", "https://www.amazon.se/gp/bestsellers/fashion"),
    ("Electronics", "https://www.amazon.se/gp/bestsellers/electronics"),
    ("Toys & Games", "https://www.amazon.se/gp/bestsellers/toys"),
    ("Books", "https://www.amazon.se/gp/bestsellers/books"),
    ("Sports & Outdoors", "https://www.amazon.se/gp/bestsellers/sports"),
    ("Health & Household", "https://www.amazon.se/gp/bestsellers/health"),
    ("Tools & Home Improvement", "https://www.amazon.se/gp/bestsellers/industrial"),
    ("Pet Supplies", "https://www.amazon.se/gp/bestsellers/pet-supplies"),
];

/// One bestseller category and its listing page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    #[serde(rename = "url")]
    pub listing_url: String,
}

impl CategorySpec {
    pub fn new(name: impl Into<String>, listing_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listing_url: listing_url.into(),
        }
    }
}

/// The built-in category list, in display order.
pub fn default_categories() -> Vec<CategorySpec> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, url)| CategorySpec::new(*name, *url))
        .collect()
}

/// Load categories from a JSON array of `{"name": ..., "url": ...}`.
///
/// Names key the result mapping, so each must appear once.
pub fn load_categories(path: &Path) -> anyhow::Result<Vec<CategorySpec>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read categories file {}", path.display()))?;
    let categories: Vec<CategorySpec> = serde_json::from_str(&json)
        .with_context(|| format!("invalid categories file {}", path.display()))?;
    if categories.is_empty() {
        bail!("categories file {} lists no categories", path.display());
    }
    let mut seen = HashSet::new();
    if let Some(dup) = categories.iter().find(|c| !seen.insert(c.name.as_str())) {
        bail!("categories file {} lists {:?} more than once", path.display(), dup.name);
    }
    Ok(categories)
}

/// Caps on how much work a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Accepted products kept per category.
    pub per_category: usize,
    /// Ids taken from a listing page; larger than `per_category` since some get dropped.
    pub listing: usize,
    /// Product pages fetched at once within one category.
    pub product_concurrency: usize,
    /// Categories processed at once.
    pub category_concurrency: usize,
    /// Display titles are cut to this many characters.
    pub title_max_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            per_category: 12,
            listing: 15,
            product_concurrency: 5,
            category_concurrency: 3,
            title_max_chars: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Network timeout for a single listing or product request.
    pub request: Duration,
    /// Ceiling on waiting for one product fetch to finish.
    pub product_wait: Duration,
    /// Ceiling on waiting for one whole category to finish.
    pub category_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(15),
            product_wait: Duration::from_secs(20),
            category_wait: Duration::from_secs(60),
        }
    }
}

/// Credentials for a structured product-data API. Read from the environment
/// and reported, but no code path calls the API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductApiConfig {
    pub enabled: bool,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub partner_tag: Option<String>,
}

impl ProductApiConfig {
    pub fn has_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some() && self.partner_tag.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub associate_tag: String,
    pub user_agent: String,
    pub pool_capacity: usize,
    pub cache_path: PathBuf,
    pub cache_max_age: Duration,
    pub limits: Limits,
    pub timeouts: Timeouts,
    pub product_api: ProductApiConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            associate_tag: DEFAULT_ASSOCIATE_TAG.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            product_api: ProductApiConfig::default(),
        }
    }
}

impl Settings {
    /// Defaults overlaid with whatever the environment sets.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Self::default();

        if let Some(tag) = var("BESTSELLERS_ASSOCIATE_TAG") {
            settings.associate_tag = tag;
        }
        if let Some(path) = var("BESTSELLERS_CACHE_FILE") {
            settings.cache_path = PathBuf::from(path);
        }
        if let Some(minutes) = var("BESTSELLERS_CACHE_MAX_AGE_MINUTES") {
            match minutes.parse::<u64>().ok().and_then(|m| m.checked_mul(60)) {
                Some(secs) => settings.cache_max_age = Duration::from_secs(secs),
                None => tracing::warn!(value = %minutes, "ignoring BESTSELLERS_CACHE_MAX_AGE_MINUTES"),
            }
        }
        if let Some(ua) = var("BESTSELLERS_USER_AGENT") {
            settings.user_agent = ua;
        }

        settings.product_api = ProductApiConfig {
            enabled: var("PRODUCT_API_ENABLED")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            access_key: var("PRODUCT_API_ACCESS_KEY"),
            secret_key: var("PRODUCT_API_SECRET_KEY"),
            partner_tag: var("PRODUCT_API_PARTNER_TAG"),
        };
        settings
    }

    /// Canonical product page for `id`.
    pub fn product_url(&self, id: &str) -> String {
        format!("{}/dp/{}", self.base_url.trim_end_matches('/'), id)
    }

    /// Product page carrying the affiliate tag.
    pub fn affiliate_link(&self, id: &str) -> String {
        format!("{}/?tag={}", self.product_url(id), self.associate_tag)
    }
}
