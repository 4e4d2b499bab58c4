use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One normalized product row. Identity is the canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Item Category")]
    pub item_category: String,
    #[serde(rename = "Display Name")]
    pub display_name: String,
    #[serde(rename = "Color")]
    pub color: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Sale Price")]
    pub sale_price: String,
    #[serde(rename = "Original Price")]
    pub original_price: String,
    #[serde(
        rename = "Sizes In Stock",
        serialize_with = "join_sizes",
        deserialize_with = "split_sizes"
    )]
    pub sizes_in_stock: Vec<String>,
    #[serde(
        rename = "Sizes OOS",
        serialize_with = "join_sizes",
        deserialize_with = "split_sizes"
    )]
    pub sizes_out_of_stock: Vec<String>,
}

impl ProductRecord {
    pub fn new(url: String, display_name: String) -> Self {
        Self {
            category: String::new(),
            item_category: String::new(),
            display_name,
            color: String::new(),
            url,
            sale_price: String::new(),
            original_price: String::new(),
            sizes_in_stock: Vec::new(),
            sizes_out_of_stock: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

pub const SIZE_SEPARATOR: &str = ", ";

/// Joins size labels with `, `. Commas and backslashes inside a label are
/// backslash-escaped so `split_size_labels` gives the same labels back.
pub fn join_size_labels(sizes: &[String]) -> String {
    sizes
        .iter()
        .map(|label| label.replace('\\', "\\\\").replace(',', "\\,"))
        .collect::<Vec<_>>()
        .join(SIZE_SEPARATOR)
}

pub fn split_size_labels(raw: &str) -> Vec<String> {
    let mut labels = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            ',' => labels.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    labels.push(current);

    labels
        .into_iter()
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .collect()
}

fn join_sizes<S: Serializer>(sizes: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&join_size_labels(sizes))
}

fn split_sizes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(split_size_labels(&raw))
}

/// Why a single tile produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileIssueKind {
    MissingLink,
    MissingNamePayload,
    PayloadNotDecodable,
    PayloadNotParseable(String),
    MissingProductName,
    MissingPrice,
    Detached,
}

impl fmt::Display for TileIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileIssueKind::MissingLink => write!(f, "no product link"),
            TileIssueKind::MissingNamePayload => write!(f, "no name payload"),
            TileIssueKind::PayloadNotDecodable => write!(f, "name payload is not valid percent-encoded UTF-8"),
            TileIssueKind::PayloadNotParseable(e) => write!(f, "name payload is not valid JSON: {}", e),
            TileIssueKind::MissingProductName => write!(f, "name payload has no product.name"),
            TileIssueKind::MissingPrice => write!(f, "no price"),
            TileIssueKind::Detached => write!(f, "tile detached while being read"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileIssue {
    /// Zero-based position of the tile in the listing.
    pub index: usize,
    pub url: Option<String>,
    pub kind: TileIssueKind,
}

impl fmt::Display for TileIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "tile #{} ({}): {}", self.index, url, self.kind),
            None => write!(f, "tile #{}: {}", self.index, self.kind),
        }
    }
}

/// Everything the extractor got out of one materialized listing.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<ProductRecord>,
    pub issues: Vec<TileIssue>,
    pub tiles_seen: usize,
    pub duplicates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display_with_url() {
        let issue = TileIssue {
            index: 3,
            url: Some("https://shop.example/p/a".to_string()),
            kind: TileIssueKind::MissingPrice,
        };
        assert_eq!(issue.to_string(), "tile #3 (https://shop.example/p/a): no price");
    }

    #[test]
    fn test_issue_display_without_url() {
        let issue = TileIssue {
            index: 0,
            url: None,
            kind: TileIssueKind::MissingLink,
        };
        assert_eq!(issue.to_string(), "tile #0: no product link");
    }

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_sizes_join_with_comma_space() {
        assert_eq!(join_size_labels(&labels(&["XS", "S", "M"])), "XS, S, M");
        assert_eq!(split_size_labels("XS, S, M"), labels(&["XS", "S", "M"]));
        assert!(split_size_labels("").is_empty());
    }

    #[test]
    fn test_size_label_with_comma_survives() {
        let sizes = labels(&["XS, S", "M", r"L\XL"]);
        let joined = join_size_labels(&sizes);
        assert_eq!(joined, r"XS\, S, M, L\\XL");
        assert_eq!(split_size_labels(&joined), sizes);
    }
}
