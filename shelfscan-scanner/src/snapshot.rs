use crate::error::SurfaceError;
use crate::surface::{RenderSurface, SurfaceResult, normalize_text};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// An element captured from a snapshot. Owns its markup so nested lookups can
/// re-parse it without borrowing the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotElement {
    html: String,
    text: String,
    attributes: Vec<(String, String)>,
}

impl SnapshotElement {
    fn capture(element: ElementRef<'_>) -> Self {
        Self {
            html: element.html(),
            text: element.text().collect::<String>(),
            attributes: element
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Render surface over saved HTML pages.
///
/// Nothing is ever injected into a snapshot: clicking an element only marks it
/// as used so the same control is not found again, which makes every listing
/// terminal after at most one expansion attempt.
#[derive(Debug, Default)]
pub struct SnapshotSurface {
    pages: HashMap<String, String>,
    current: Option<String>,
    clicked: HashSet<String>,
    closed: bool,
}

impl SnapshotSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn with_page_file(self, url: impl Into<String>, path: &Path) -> SurfaceResult<Self> {
        let html = std::fs::read_to_string(path)?;
        Ok(self.with_page(url, html))
    }

    fn document(&self) -> SurfaceResult<Html> {
        let html = self
            .current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .ok_or_else(|| SurfaceError::Script("no page loaded".to_string()))?;
        Ok(Html::parse_document(html))
    }

    fn selector(selector: &str) -> SurfaceResult<Selector> {
        Selector::parse(selector).map_err(|_| SurfaceError::InvalidSelector(selector.to_string()))
    }
}

#[async_trait]
impl RenderSurface for SnapshotSurface {
    type Element = SnapshotElement;

    async fn navigate(&mut self, url: &str) -> SurfaceResult<()> {
        if self.closed {
            return Err(SurfaceError::Script("surface is closed".to_string()));
        }
        if !self.pages.contains_key(url) {
            return Err(SurfaceError::Script(format!("no snapshot for {}", url)));
        }
        debug!("Loading snapshot for {}", url);
        self.current = Some(url.to_string());
        self.clicked.clear();
        Ok(())
    }

    async fn document_extent(&mut self) -> SurfaceResult<u64> {
        Ok(0)
    }

    async fn scroll_to(&mut self, _offset: u64) -> SurfaceResult<()> {
        Ok(())
    }

    /// Matches an element with a direct text node equal to `text`, untrimmed,
    /// the same test as the XPath `text()=` lookup on a live page.
    async fn find_by_text(&mut self, text: &str) -> SurfaceResult<Option<SnapshotElement>> {
        let document = self.document()?;
        let found = document
            .root_element()
            .descendent_elements()
            .filter(|el| {
                el.children()
                    .any(|c| c.value().as_text().is_some_and(|t| &**t == text))
            })
            .map(SnapshotElement::capture)
            .find(|el| !self.clicked.contains(&el.html));
        Ok(found)
    }

    async fn find_all(&mut self, selector: &str) -> SurfaceResult<Vec<SnapshotElement>> {
        let selector = Self::selector(selector)?;
        let document = self.document()?;
        Ok(document.select(&selector).map(SnapshotElement::capture).collect())
    }

    async fn find_all_within(
        &mut self,
        scope: &SnapshotElement,
        selector: &str,
    ) -> SurfaceResult<Vec<SnapshotElement>> {
        let selector = Self::selector(selector)?;
        let fragment = Html::parse_fragment(&scope.html);
        // The fragment's first element is the scope itself; only descendants count.
        let Some(root) = fragment.root_element().child_elements().next() else {
            return Ok(Vec::new());
        };
        Ok(root
            .descendent_elements()
            .skip(1)
            .filter(|el| selector.matches(el))
            .map(SnapshotElement::capture)
            .collect())
    }

    async fn bring_into_view(&mut self, _element: &SnapshotElement) -> SurfaceResult<()> {
        Ok(())
    }

    async fn click(&mut self, element: &SnapshotElement) -> SurfaceResult<()> {
        self.clicked.insert(element.html.clone());
        Ok(())
    }

    async fn attribute(
        &mut self,
        element: &SnapshotElement,
        name: &str,
    ) -> SurfaceResult<Option<String>> {
        Ok(element
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone()))
    }

    async fn text(&mut self, element: &SnapshotElement) -> SurfaceResult<String> {
        Ok(normalize_text(&element.text))
    }

    async fn close(&mut self) -> SurfaceResult<()> {
        self.closed = true;
        self.current = None;
        Ok(())
    }
}
