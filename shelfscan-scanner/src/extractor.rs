use crate::error::{Result, SurfaceError};
use crate::result::{Extraction, ProductRecord, TileIssue, TileIssueKind};
use crate::surface::{RenderSurface, normalize_text};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

/// Structural selectors for the parts of a product tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSelectors {
    pub tile: String,
    pub link: String,
    pub name: String,
    /// Attribute on the name element holding the percent-encoded JSON payload.
    pub name_payload_attribute: String,
    pub color: String,
    pub sale_price: String,
    pub list_price: String,
    pub size: String,
    /// `"false"` in this attribute marks a size as out of stock.
    pub size_available_attribute: String,
    /// A class on the size element that also marks it as out of stock.
    pub size_unavailable_class: String,
}

impl Default for TileSelectors {
    fn default() -> Self {
        Self {
            tile: "div.product-tile".to_string(),
            link: "a[href]".to_string(),
            name: "h3.product-tile__product-name a".to_string(),
            name_payload_attribute: "data-lulu-attributes".to_string(),
            color: ".product-tile__colour".to_string(),
            sale_price: ".product-tile__price--sale".to_string(),
            list_price: ".product-tile__price--list".to_string(),
            size: ".product-tile__sizes li".to_string(),
            size_available_attribute: "data-available".to_string(),
            size_unavailable_class: "product-tile__size--oos".to_string(),
        }
    }
}

/// Fields projected out of a tile's name payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePayload {
    pub name: String,
    pub category: Option<String>,
    pub color: Option<String>,
}

/// Strips everything from the first `?` on.
pub fn canonical_url(raw: &str) -> &str {
    raw.split_once('?').map_or(raw, |(base, _)| base)
}

/// Resolves `href` against the listing URL, then drops the query string.
pub fn canonicalize_href(page_url: &str, href: &str) -> String {
    let absolute = Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string());
    canonical_url(&absolute).to_string()
}

fn decode_component(raw: &str) -> std::result::Result<String, TileIssueKind> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| TileIssueKind::PayloadNotDecodable)
}

fn string_field(product: &Value, key: &str) -> Option<String> {
    product
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decodes `%7B%22product%22...` into the product name and friends.
pub fn decode_name_payload(raw: &str) -> std::result::Result<NamePayload, TileIssueKind> {
    let decoded = decode_component(raw)?;
    let value: Value = serde_json::from_str(&decoded)
        .map_err(|e| TileIssueKind::PayloadNotParseable(e.to_string()))?;
    let product = value.get("product").ok_or(TileIssueKind::MissingProductName)?;
    let name = product
        .get("name")
        .and_then(Value::as_str)
        .ok_or(TileIssueKind::MissingProductName)?;
    let name = normalize_text(&decode_component(name)?);
    if name.is_empty() {
        return Err(TileIssueKind::MissingProductName);
    }

    Ok(NamePayload {
        name,
        category: string_field(product, "category"),
        color: string_field(product, "color"),
    })
}

/// Walks a materialized listing and turns each tile into a `ProductRecord`.
pub struct Extractor {
    selectors: TileSelectors,
}

enum TileOutcome {
    Record(ProductRecord),
    Duplicate(String),
    Issue(Option<String>, TileIssueKind),
}

impl Extractor {
    pub fn new(selectors: TileSelectors) -> Self {
        Self { selectors }
    }

    /// Extracts every tile currently on the page. Per-tile problems become
    /// `TileIssue`s; only render surface failures abort.
    pub async fn extract<S: RenderSurface>(
        &self,
        surface: &mut S,
        page_url: &str,
    ) -> Result<Extraction> {
        let tiles = surface.find_all(&self.selectors.tile).await?;
        info!("Extracting {} tiles from {}", tiles.len(), page_url);

        let mut extraction = Extraction {
            tiles_seen: tiles.len(),
            ..Extraction::default()
        };
        let mut seen: HashSet<String> = HashSet::new();

        for (index, tile) in tiles.iter().enumerate() {
            let outcome = match self.extract_tile(surface, page_url, tile, &seen).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_stale() => TileOutcome::Issue(None, TileIssueKind::Detached),
                Err(e) => return Err(e.into()),
            };

            match outcome {
                TileOutcome::Record(record) => {
                    seen.insert(record.url.clone());
                    extraction.records.push(record);
                }
                TileOutcome::Duplicate(url) => {
                    debug!("Dropping duplicate tile #{} for {}", index, url);
                    extraction.duplicates += 1;
                }
                TileOutcome::Issue(url, kind) => {
                    let issue = TileIssue { index, url, kind };
                    warn!("Skipping {}", issue);
                    extraction.issues.push(issue);
                }
            }
        }

        info!(
            "{} records, {} duplicates, {} skipped on {}",
            extraction.records.len(),
            extraction.duplicates,
            extraction.issues.len(),
            page_url
        );
        Ok(extraction)
    }

    async fn extract_tile<S: RenderSurface>(
        &self,
        surface: &mut S,
        page_url: &str,
        tile: &S::Element,
        seen: &HashSet<String>,
    ) -> std::result::Result<TileOutcome, SurfaceError> {
        let s = &self.selectors;

        let href = match surface.find_within(tile, &s.link).await? {
            Some(link) => surface.attribute(&link, "href").await?,
            None => None,
        };
        let Some(href) = href.filter(|h| !h.trim().is_empty()) else {
            return Ok(TileOutcome::Issue(None, TileIssueKind::MissingLink));
        };
        let url = canonicalize_href(page_url, href.trim());
        if seen.contains(&url) {
            return Ok(TileOutcome::Duplicate(url));
        }

        let payload = match surface.find_within(tile, &s.name).await? {
            Some(name) => surface.attribute(&name, &s.name_payload_attribute).await?,
            None => None,
        };
        let Some(payload) = payload else {
            return Ok(TileOutcome::Issue(Some(url), TileIssueKind::MissingNamePayload));
        };
        let payload = match decode_name_payload(&payload) {
            Ok(payload) => payload,
            Err(kind) => return Ok(TileOutcome::Issue(Some(url), kind)),
        };

        let sale = self.first_text(surface, tile, &s.sale_price).await?;
        let list = self.first_text(surface, tile, &s.list_price).await?;
        let (sale_price, original_price) = match (sale, list) {
            (Some(sale), Some(list)) => (sale, list),
            (None, Some(only)) | (Some(only), None) => (String::new(), only),
            (None, None) => return Ok(TileOutcome::Issue(Some(url), TileIssueKind::MissingPrice)),
        };

        let color = match payload.color {
            Some(color) => color,
            None => self
                .first_text(surface, tile, &s.color)
                .await?
                .unwrap_or_default(),
        };

        let (sizes_in_stock, sizes_out_of_stock) = self.sizes(surface, tile).await?;

        let mut record = ProductRecord::new(url, payload.name);
        record.item_category = payload.category.unwrap_or_default();
        record.color = color;
        record.sale_price = sale_price;
        record.original_price = original_price;
        record.sizes_in_stock = sizes_in_stock;
        record.sizes_out_of_stock = sizes_out_of_stock;
        Ok(TileOutcome::Record(record))
    }

    async fn first_text<S: RenderSurface>(
        &self,
        surface: &mut S,
        tile: &S::Element,
        selector: &str,
    ) -> std::result::Result<Option<String>, SurfaceError> {
        let Some(element) = surface.find_within(tile, selector).await? else {
            return Ok(None);
        };
        let text = normalize_text(&surface.text(&element).await?);
        Ok((!text.is_empty()).then_some(text))
    }

    async fn sizes<S: RenderSurface>(
        &self,
        surface: &mut S,
        tile: &S::Element,
    ) -> std::result::Result<(Vec<String>, Vec<String>), SurfaceError> {
        let s = &self.selectors;
        let mut in_stock: Vec<String> = Vec::new();
        let mut out_of_stock: Vec<String> = Vec::new();

        for size in surface.find_all_within(tile, &s.size).await? {
            let label = normalize_text(&surface.text(&size).await?);
            if label.is_empty() {
                continue;
            }
            let flagged_unavailable = surface
                .attribute(&size, &s.size_available_attribute)
                .await?
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"));
            let classed_unavailable = surface
                .attribute(&size, "class")
                .await?
                .is_some_and(|c| c.split_whitespace().any(|c| c == s.size_unavailable_class));

            let bucket = if flagged_unavailable || classed_unavailable {
                &mut out_of_stock
            } else {
                &mut in_stock
            };
            if !bucket.contains(&label) {
                bucket.push(label);
            }
        }
        Ok((in_stock, out_of_stock))
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(TileSelectors::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_url_strips_query() {
        assert_eq!(canonical_url("a?x=1"), "a");
        assert_eq!(canonical_url("a?x=1?y=2"), "a");
        assert_eq!(canonical_url("b"), "b");
    }

    #[test]
    fn test_canonicalize_relative_href() {
        assert_eq!(
            canonicalize_href("https://shop.example/c/women/_/N-815", "/p/align-pant/LW5CTIS.html?dwvar=0001"),
            "https://shop.example/p/align-pant/LW5CTIS.html"
        );
    }

    #[test]
    fn test_canonicalize_absolute_href() {
        assert_eq!(
            canonicalize_href("https://shop.example/c/men", "https://cdn.example/p/x?color=1"),
            "https://cdn.example/p/x"
        );
    }

    #[test]
    fn test_decode_name_payload() {
        let raw = "%7B%22product%22%3A%7B%22name%22%3A%22Align%E2%84%A2%20Pant%2025%22%2C%22category%22%3A%22Pants%22%2C%22color%22%3A%22Black%22%7D%7D";
        let payload = decode_name_payload(raw).unwrap();
        assert_eq!(payload.name, "Align™ Pant 25");
        assert_eq!(payload.category.as_deref(), Some("Pants"));
        assert_eq!(payload.color.as_deref(), Some("Black"));
    }

    #[test]
    fn test_decode_plain_json_payload() {
        let payload = decode_name_payload(r#"{"product":{"name":"Define Jacket"}}"#).unwrap();
        assert_eq!(payload.name, "Define Jacket");
        assert_eq!(payload.category, None);
    }

    #[test]
    fn test_decode_name_inside_payload_is_unescaped() {
        let payload = decode_name_payload(r#"{"product":{"name":"Swiftly%20Tech"}}"#).unwrap();
        assert_eq!(payload.name, "Swiftly Tech");
    }

    #[test]
    fn test_decode_invalid_utf8() {
        assert_eq!(
            decode_name_payload("%FF%FE%FD"),
            Err(TileIssueKind::PayloadNotDecodable)
        );
    }

    #[test]
    fn test_decode_not_json() {
        assert!(matches!(
            decode_name_payload("%7Bproduct"),
            Err(TileIssueKind::PayloadNotParseable(_))
        ));
    }

    #[test]
    fn test_decode_missing_name() {
        assert_eq!(
            decode_name_payload(r#"{"product":{"id":"123"}}"#),
            Err(TileIssueKind::MissingProductName)
        );
        assert_eq!(
            decode_name_payload(r#"{"sku":"123"}"#),
            Err(TileIssueKind::MissingProductName)
        );
        assert_eq!(
            decode_name_payload(r#"{"product":{"name":"   "}}"#),
            Err(TileIssueKind::MissingProductName)
        );
    }
}
