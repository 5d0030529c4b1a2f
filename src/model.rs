//! Products and the per-category mapping that flows from fetch to cache to page.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a catalog identifier (ASIN).
pub const PRODUCT_ID_LEN: usize = 10;

/// Opaque 10-character alphanumeric catalog identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Accepts exactly ten ASCII alphanumerics; anything else is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == PRODUCT_ID_LEN && raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProductId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid product id: {value:?}"))
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

/// A product accepted into a category. Field names on disk match the cache
/// format (`asin`, `title`, `img`, `url`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "asin")]
    pub id: ProductId,
    pub title: String,
    #[serde(rename = "img")]
    pub image_url: Option<String>,
    #[serde(rename = "url")]
    pub canonical_url: String,
}

/// Category name -> products, in insertion order.
///
/// Serialized as a JSON object whose key order is the insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    entries: Vec<(String, Vec<Product>)>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the products for `name`. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, products: Vec<Product>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = products,
            None => self.entries.push((name, products)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Product])> {
        self.entries
            .iter()
            .map(|(name, products)| (name.as_str(), products.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_products(&self) -> usize {
        self.entries.iter().map(|(_, products)| products.len()).sum()
    }
}

impl Serialize for CategoryMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, products) in &self.entries {
            map.serialize_entry(name, products)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CategoryMapVisitor;

        impl<'de> Visitor<'de> for CategoryMapVisitor {
            type Value = CategoryMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category name to product list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = CategoryMap::new();
                while let Some((name, products)) = access.next_entry::<String, Vec<Product>>()? {
                    out.insert(name, products);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(CategoryMapVisitor)
    }
}

#[cfg(test)]
impl CategoryMap {
    pub(crate) fn get(&self, name: &str) -> Option<&[Product]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, products)| products.as_slice())
    }
}
