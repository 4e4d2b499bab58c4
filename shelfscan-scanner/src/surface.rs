use crate::error::SurfaceError;
use async_trait::async_trait;

pub type SurfaceResult<T> = std::result::Result<T, SurfaceError>;

/// A controllable view of a dynamically loading page.
///
/// One surface is one exclusively owned session: every method takes
/// `&mut self` and callers drive it strictly serially. Element handles are
/// only meaningful while the page they were found on is still loaded.
#[async_trait]
pub trait RenderSurface: Send {
    type Element: Clone + Send + Sync;

    async fn navigate(&mut self, url: &str) -> SurfaceResult<()>;

    /// Current scrollable height of the document.
    async fn document_extent(&mut self) -> SurfaceResult<u64>;

    async fn scroll_to(&mut self, offset: u64) -> SurfaceResult<()>;

    /// Finds the element whose own visible text is exactly `text`.
    /// Absence is `Ok(None)`, never an error.
    async fn find_by_text(&mut self, text: &str) -> SurfaceResult<Option<Self::Element>>;

    /// All elements matching a CSS selector, in document order.
    async fn find_all(&mut self, selector: &str) -> SurfaceResult<Vec<Self::Element>>;

    /// Descendants of `scope` matching a CSS selector, in document order.
    async fn find_all_within(
        &mut self,
        scope: &Self::Element,
        selector: &str,
    ) -> SurfaceResult<Vec<Self::Element>>;

    async fn bring_into_view(&mut self, element: &Self::Element) -> SurfaceResult<()>;

    async fn click(&mut self, element: &Self::Element) -> SurfaceResult<()>;

    async fn attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> SurfaceResult<Option<String>>;

    async fn text(&mut self, element: &Self::Element) -> SurfaceResult<String>;

    /// Releases the underlying session. Called exactly once, on every exit path.
    async fn close(&mut self) -> SurfaceResult<()>;

    /// First descendant of `scope` matching `selector`, if any.
    async fn find_within(
        &mut self,
        scope: &Self::Element,
        selector: &str,
    ) -> SurfaceResult<Option<Self::Element>> {
        Ok(self.find_all_within(scope, selector).await?.into_iter().next())
    }
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
