//! HTML extraction for listing and product pages.
//!
//! Every lookup walks an ordered list of selectors and the first hit wins, so
//! layout changes on one selector degrade to the next instead of failing.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::model::ProductId;

const TITLE_SELECTORS: &[&str] = &[
    "#productTitle",
    "span.a-size-large",
    "h1.a-size-large",
    ".product-title",
];

const IMAGE_SELECTORS: &[&str] = &[
    "#landingImage",
    "#imgTagWrapperId img",
    ".a-dynamic-image",
    "img.a-dynamic-image",
    "[data-old-hires]",
    "[data-a-dynamic-image]",
];

/// High-res hint, dynamic-image JSON, plain source, lazy-load source.
const IMAGE_ATTRIBUTES: &[&str] = &["data-old-hires", "data-a-dynamic-image", "src", "data-src"];

/// Titles containing any of these (case-insensitive) are not real products.
pub const DENY_LIST: &[&str] = &["gift card", "presentkort", "gavekort"];

const ROOT_RELATIVE_IMAGE_HOST: &str = "https://images-na.ssl-images-amazon.com";
// Only the size-token rewrite is host-gated; images served from other hosts are kept as found.
const KNOWN_IMAGE_HOSTS: &[&str] = &["images-amazon.com", "media-amazon.com"];
const PREFERRED_SIZE_TOKEN: &str = "._AC_SL300_.";

static ID_ATTRIBUTE: LazyLock<Selector> = LazyLock::new(|| selector("[data-asin]"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static TITLES: LazyLock<Vec<Selector>> =
    LazyLock::new(|| TITLE_SELECTORS.iter().map(|css| selector(css)).collect());
static IMAGES: LazyLock<Vec<Selector>> =
    LazyLock::new(|| IMAGE_SELECTORS.iter().map(|css| selector(css)).collect());

static PRODUCT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/dp/([A-Z0-9]{10})").expect("product link regex is valid"));
static SIZE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\._[A-Z0-9,_]+_\.").expect("size token regex is valid"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("static selector {css:?} is invalid: {err}"))
}

/// What a product page yields before it becomes a `Product`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDetails {
    pub title: String,
    pub image_url: Option<String>,
}

/// Collect up to `limit` distinct product ids from a listing page.
///
/// Elements carrying a `data-asin` attribute are read first, in document order.
/// Only if that leaves room are `/dp/<ID>` links scanned for further ids.
pub fn extract_ids(html: &str, limit: usize) -> Vec<ProductId> {
    if limit == 0 {
        return Vec::new();
    }
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for element in document.select(&ID_ATTRIBUTE) {
        if ids.len() >= limit {
            break;
        }
        let Some(id) = element.value().attr("data-asin").and_then(ProductId::parse) else {
            continue;
        };
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }

    if ids.len() < limit {
        for element in document.select(&LINKS) {
            if ids.len() >= limit {
                break;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(id) = PRODUCT_LINK
                .captures(href)
                .and_then(|caps| caps.get(1))
                .and_then(|m| ProductId::parse(m.as_str()))
            else {
                continue;
            };
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }

    ids
}

/// Pull the display title and image from a product page.
///
/// `fallback_title` is used when no title selector matches. Returns `None`
/// when the resolved title marks the page as a non-product (see [`DENY_LIST`]).
pub fn extract_product(html: &str, fallback_title: &str) -> Option<ProductDetails> {
    let document = Html::parse_document(html);

    let title = TITLES
        .iter()
        .find_map(|sel| {
            document
                .select(sel)
                .next()
                .map(element_text)
                .filter(|title| !title.is_empty())
        })
        .unwrap_or_else(|| fallback_title.to_string());

    if is_denied(&title) {
        return None;
    }

    let image_url = IMAGES
        .iter()
        .filter_map(|sel| document.select(sel).next())
        .find_map(image_from_element);

    Some(ProductDetails { title, image_url })
}

/// Case-insensitive deny-list check.
pub fn is_denied(title: &str) -> bool {
    let lower = title.to_lowercase();
    DENY_LIST.iter().any(|term| lower.contains(term))
}

/// Text content with runs of whitespace collapsed to single spaces.
fn element_text(element: ElementRef<'_>) -> String {
    let text: String = element.text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn image_from_element(element: ElementRef<'_>) -> Option<String> {
    IMAGE_ATTRIBUTES
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .find_map(resolve_image)
}

/// Turn one raw attribute value into a usable absolute image URL.
fn resolve_image(raw: &str) -> Option<String> {
    if raw.starts_with("data:") {
        return None;
    }
    let candidate = if raw.starts_with('{') {
        largest_dynamic_image(raw)?
    } else {
        raw.to_string()
    };
    if candidate.starts_with("data:") {
        return None;
    }
    let absolute = absolutize(&candidate)?;
    Some(prefer_size(absolute))
}

/// Pick the largest entry of a dynamic-image JSON map.
///
/// Two shapes occur: `{"<url>": [width, height]}` and `{"<width>,<height>": "<url>"}`.
/// The leading dimension decides. On a tie the key that sorts first wins, since
/// the parsed map iterates in key order.
fn largest_dynamic_image(raw: &str) -> Option<String> {
    let map: serde_json::Map<String, Value> = serde_json::from_str(raw).ok()?;
    let mut best: Option<(u64, String)> = None;
    for (key, value) in map {
        let (url, width) = match value {
            Value::Array(dims) => {
                let width = dims.first().and_then(Value::as_u64).unwrap_or(0);
                (key, width)
            }
            Value::String(url) => {
                let width = leading_number(&key);
                (url, width)
            }
            _ => continue,
        };
        if best.as_ref().map_or(true, |(w, _)| width > *w) {
            best = Some((width, url));
        }
    }
    best.map(|(_, url)| url)
}

fn leading_number(s: &str) -> u64 {
    let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

fn absolutize(url: &str) -> Option<String> {
    let absolute = if url.starts_with("//") {
        format!("https:{url}")
    } else if url.starts_with('/') {
        format!("{ROOT_RELATIVE_IMAGE_HOST}{url}")
    } else {
        url.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}

/// Swap the size token in known image-CDN URLs for the preferred one.
fn prefer_size(url: String) -> String {
    let known_host = Url::parse(&url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .is_some_and(|host| KNOWN_IMAGE_HOSTS.iter().any(|known| host.ends_with(known)));
    if known_host {
        SIZE_TOKEN.replace_all(&url, PREFERRED_SIZE_TOKEN).into_owned()
    } else {
        url
    }
}
