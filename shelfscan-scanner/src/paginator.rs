use crate::error::{Result, ScanError};
use crate::surface::RenderSurface;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_LOAD_MORE_TEXT: &str = "View more products";
pub const DEFAULT_TILE_SELECTOR: &str = "div.product-tile";

#[derive(Debug, Clone)]
pub struct PaginationOptions {
    /// Exact visible text of the "load more" control.
    pub load_more_text: String,
    /// Selector counted to decide whether rendering has settled.
    pub tile_selector: String,
    /// How far past the document end to scroll to trigger lazy loading.
    pub overshoot: u64,
    pub poll_interval: Duration,
    /// Consecutive unchanged tile counts required before the page counts as settled.
    pub quiet_polls: usize,
    pub settle_timeout: Duration,
    pub max_expansions: usize,
    pub max_stalled_cycles: usize,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            load_more_text: DEFAULT_LOAD_MORE_TEXT.to_string(),
            tile_selector: DEFAULT_TILE_SELECTOR.to_string(),
            overshoot: 1000,
            poll_interval: Duration::from_millis(500),
            quiet_polls: 3,
            settle_timeout: Duration::from_secs(30),
            max_expansions: 200,
            max_stalled_cycles: 3,
        }
    }
}

/// Outcome of one expand cycle. Failures travel in the surrounding `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// Live state of one category listing while it is being expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub url: String,
    pub scroll_offset: u64,
    pub tile_count: usize,
    pub expansions: usize,
    pub terminal: bool,
    stalled_cycles: usize,
    count_at_last_click: Option<usize>,
}

impl ListingPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            scroll_offset: 0,
            tile_count: 0,
            expansions: 0,
            terminal: false,
            stalled_cycles: 0,
            count_at_last_click: None,
        }
    }
}

pub type ExpandCallback = Arc<dyn Fn(&ListingPage) + Send + Sync>;

/// Drives a render surface through scroll / settle / "load more" cycles until
/// the control disappears.
pub struct Paginator {
    options: PaginationOptions,
    progress_callback: Option<ExpandCallback>,
}

impl Paginator {
    pub fn new() -> Self {
        Self::with_options(PaginationOptions::default())
    }

    pub fn with_options(options: PaginationOptions) -> Self {
        Self {
            options,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ExpandCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Checks `url` and loads it, leaving the listing unexpanded.
    pub async fn open<S: RenderSurface>(&self, surface: &mut S, url: &str) -> Result<ListingPage> {
        Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        surface.navigate(url).await?;
        Ok(ListingPage::new(url))
    }

    /// Navigates to `url` and expands the listing until it is terminal.
    pub async fn materialize<S: RenderSurface>(
        &self,
        surface: &mut S,
        url: &str,
    ) -> Result<ListingPage> {
        let mut page = self.open(surface, url).await?;
        self.expand_all(surface, &mut page).await?;
        Ok(page)
    }

    /// Runs expand cycles on an already loaded page. `Step::Done` is the only
    /// normal way out; the cycle bound turns a control that never goes away
    /// into an error.
    pub async fn expand_all<S: RenderSurface>(
        &self,
        surface: &mut S,
        page: &mut ListingPage,
    ) -> Result<()> {
        let mut cycles = 0;
        loop {
            match self.expand_once(surface, page).await? {
                Step::Done => {
                    page.terminal = true;
                    info!(
                        "Listing {} is complete: {} tiles after {} expansions",
                        page.url, page.tile_count, page.expansions
                    );
                    return Ok(());
                }
                Step::Continue => {
                    cycles += 1;
                    if let Some(ref callback) = self.progress_callback {
                        callback(&*page);
                    }
                    // Stale clicks never count as expansions; bound them too.
                    if cycles > self.options.max_expansions {
                        warn!("Stopping {} after {} expand cycles", page.url, cycles);
                        return Err(ScanError::ExpansionLimit(page.expansions));
                    }
                }
            }
        }
    }

    /// One scroll / settle / click cycle.
    pub async fn expand_once<S: RenderSurface>(
        &self,
        surface: &mut S,
        page: &mut ListingPage,
    ) -> Result<Step> {
        let extent = surface.document_extent().await?;
        let target = extent + self.options.overshoot;
        surface.scroll_to(target).await?;
        page.scroll_offset = target;
        page.tile_count = self.settle(surface).await?;

        let Some(control) = surface.find_by_text(&self.options.load_more_text).await? else {
            debug!("No '{}' control on {}", self.options.load_more_text, page.url);
            return Ok(Step::Done);
        };

        if let Some(previous) = page.count_at_last_click {
            if page.tile_count > previous {
                page.stalled_cycles = 0;
            } else {
                page.stalled_cycles += 1;
                warn!(
                    "Last click on {} loaded nothing ({} in a row)",
                    page.url, page.stalled_cycles
                );
                if page.stalled_cycles >= self.options.max_stalled_cycles {
                    return Err(ScanError::Stalled(page.stalled_cycles));
                }
            }
        }

        if page.expansions >= self.options.max_expansions {
            warn!(
                "'{}' still present on {} after {} expansions",
                self.options.load_more_text, page.url, page.expansions
            );
            return Err(ScanError::ExpansionLimit(page.expansions));
        }

        let activated = match surface.bring_into_view(&control).await {
            Ok(()) => surface.click(&control).await,
            Err(e) => Err(e),
        };
        match activated {
            Ok(()) => {}
            Err(e) if e.is_stale() => {
                // The control was re-rendered under us; look it up again next cycle.
                debug!("'{}' control went stale on {}", self.options.load_more_text, page.url);
                return Ok(Step::Continue);
            }
            Err(e) => return Err(e.into()),
        }

        page.count_at_last_click = Some(page.tile_count);
        page.expansions += 1;
        debug!(
            "Expansion {} on {} ({} tiles so far)",
            page.expansions, page.url, page.tile_count
        );
        Ok(Step::Continue)
    }

    /// Polls the tile count until it stops changing, or fails once the settle
    /// timeout has passed.
    async fn settle<S: RenderSurface>(&self, surface: &mut S) -> Result<usize> {
        let deadline = Instant::now() + self.options.settle_timeout;
        let mut last = surface.find_all(&self.options.tile_selector).await?.len();
        let mut quiet = 0;

        loop {
            if quiet >= self.options.quiet_polls {
                return Ok(last);
            }
            if Instant::now() >= deadline {
                return Err(ScanError::RenderTimeout(self.options.settle_timeout));
            }
            tokio::time::sleep(self.options.poll_interval).await;

            let current = surface.find_all(&self.options.tile_selector).await?.len();
            if current == last {
                quiet += 1;
            } else {
                debug!("Tile count {} -> {}", last, current);
                last = current;
                quiet = 0;
            }
        }
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;
    use crate::surface::SurfaceResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum ClickBehavior {
        Grow(usize),
        Nothing,
        Stale,
        Fail,
    }

    /// Listing whose "load more" control is present for the first
    /// `presence` lookups.
    struct ScriptedSurface {
        presence: usize,
        lookups: usize,
        tiles: usize,
        clicks: usize,
        on_click: ClickBehavior,
        /// Tiles added on every count, to simulate a page that never settles.
        churn: usize,
    }

    impl ScriptedSurface {
        fn new(presence: usize) -> Self {
            Self {
                presence,
                lookups: 0,
                tiles: 12,
                clicks: 0,
                on_click: ClickBehavior::Grow(12),
                churn: 0,
            }
        }
    }

    #[async_trait]
    impl RenderSurface for ScriptedSurface {
        type Element = usize;

        async fn navigate(&mut self, _url: &str) -> SurfaceResult<()> {
            Ok(())
        }
        async fn document_extent(&mut self) -> SurfaceResult<u64> {
            Ok(self.tiles as u64 * 100)
        }
        async fn scroll_to(&mut self, _offset: u64) -> SurfaceResult<()> {
            Ok(())
        }
        async fn find_by_text(&mut self, _text: &str) -> SurfaceResult<Option<usize>> {
            self.lookups += 1;
            Ok((self.lookups <= self.presence).then_some(0))
        }
        async fn find_all(&mut self, _selector: &str) -> SurfaceResult<Vec<usize>> {
            self.tiles += self.churn;
            Ok((0..self.tiles).collect())
        }
        async fn find_all_within(&mut self, _s: &usize, _sel: &str) -> SurfaceResult<Vec<usize>> {
            Ok(Vec::new())
        }
        async fn bring_into_view(&mut self, _e: &usize) -> SurfaceResult<()> {
            Ok(())
        }
        async fn click(&mut self, _e: &usize) -> SurfaceResult<()> {
            match self.on_click {
                ClickBehavior::Grow(n) => self.tiles += n,
                ClickBehavior::Nothing => {}
                ClickBehavior::Stale => return Err(SurfaceError::Stale),
                ClickBehavior::Fail => {
                    return Err(SurfaceError::Script("element not interactable".to_string()));
                }
            }
            self.clicks += 1;
            Ok(())
        }
        async fn attribute(&mut self, _e: &usize, _n: &str) -> SurfaceResult<Option<String>> {
            Ok(None)
        }
        async fn text(&mut self, _e: &usize) -> SurfaceResult<String> {
            Ok(String::new())
        }
        async fn close(&mut self) -> SurfaceResult<()> {
            Ok(())
        }
    }

    fn fast_options() -> PaginationOptions {
        PaginationOptions {
            poll_interval: Duration::from_millis(100),
            quiet_polls: 2,
            settle_timeout: Duration::from_secs(5),
            ..PaginationOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_n_expansions_then_done() {
        for n in [0, 1, 2, 7] {
            let mut surface = ScriptedSurface::new(n);
            let paginator = Paginator::with_options(fast_options());

            let page = paginator
                .materialize(&mut surface, "https://shop.example/c/women")
                .await
                .unwrap();

            assert_eq!(surface.clicks, n, "clicks for presence {}", n);
            assert_eq!(page.expansions, n);
            assert!(page.terminal);
            assert_eq!(page.tile_count, 12 + 12 * n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrolls_past_document_end() {
        let mut surface = ScriptedSurface::new(0);
        let paginator = Paginator::with_options(fast_options());
        let page = paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap();
        assert_eq!(page.scroll_offset, 1200 + 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_settling_page_times_out() {
        let mut surface = ScriptedSurface::new(5);
        surface.churn = 1;
        let paginator = Paginator::with_options(fast_options());

        let err = paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::RenderTimeout(d) if d == Duration::from_secs(5)));
        assert_eq!(surface.clicks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_that_loads_nothing_is_stalled() {
        let mut surface = ScriptedSurface::new(usize::MAX);
        surface.on_click = ClickBehavior::Nothing;
        let paginator = Paginator::with_options(fast_options());

        let err = paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Stalled(3)));
        assert_eq!(surface.clicks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expansion_limit() {
        let mut surface = ScriptedSurface::new(usize::MAX);
        let paginator = Paginator::with_options(PaginationOptions {
            max_expansions: 4,
            ..fast_options()
        });

        let err = paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::ExpansionLimit(4)));
        assert_eq!(surface.clicks, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_needing_exactly_max_expansions_completes() {
        let mut surface = ScriptedSurface::new(4);
        let paginator = Paginator::with_options(PaginationOptions {
            max_expansions: 4,
            ..fast_options()
        });

        let page = paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap();

        assert!(page.terminal);
        assert_eq!(page.expansions, 4);
        assert_eq!(surface.clicks, 4);
        assert_eq!(surface.lookups, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endless_stale_clicks_hit_cycle_bound() {
        let mut surface = ScriptedSurface::new(usize::MAX);
        surface.on_click = ClickBehavior::Stale;
        let paginator = Paginator::with_options(PaginationOptions {
            max_expansions: 3,
            ..fast_options()
        });

        let err = paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::ExpansionLimit(0)));
        assert_eq!(surface.lookups, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_click_continues_until_control_is_gone() {
        let mut surface = ScriptedSurface::new(2);
        surface.on_click = ClickBehavior::Stale;
        let paginator = Paginator::with_options(fast_options());

        let page = paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap();

        assert!(page.terminal);
        assert_eq!(page.expansions, 0);
        assert_eq!(surface.lookups, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_click_failure_is_fatal() {
        let mut surface = ScriptedSurface::new(3);
        surface.on_click = ClickBehavior::Fail;
        let paginator = Paginator::with_options(fast_options());

        let err = paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Surface(SurfaceError::Script(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_url() {
        let mut surface = ScriptedSurface::new(0);
        let err = Paginator::new()
            .materialize(&mut surface, "not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidUrl(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_loads_without_expanding() {
        let mut surface = ScriptedSurface::new(3);
        let page = Paginator::new()
            .open(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap();

        assert_eq!(page, ListingPage::new("https://shop.example/c/women"));
        assert_eq!(surface.lookups, 0);
        assert_eq!(surface.clicks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_callback_sees_each_cycle() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let mut surface = ScriptedSurface::new(4);
        let paginator = Paginator::with_options(fast_options()).with_progress_callback(Arc::new(
            move |_page: &ListingPage| {
                seen_clone.fetch_add(1, Ordering::Relaxed);
            },
        ));

        paginator
            .materialize(&mut surface, "https://shop.example/c/women")
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::Relaxed), 4);
    }
}
