use crate::dataset::CatalogDataset;
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use shelfscan_scanner::{
    Extraction, Extractor, ListingPage, PaginationOptions, Paginator, RenderSurface, ScanError,
    SurfaceError, TileIssue, TileSelectors,
};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A labelled listing to scrape, e.g. `Women` → its catalog URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub label: String,
    pub url: String,
}

impl CategorySpec {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Options for configuring a catalog run
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    pub pagination: PaginationOptions,
    pub selectors: TileSelectors,
    /// Continue with the next category after a failure instead of stopping.
    pub keep_going: bool,
    pub show_progress_bars: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Navigate,
    Paginate,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Navigate => "navigate",
            Stage::Paginate => "paginate",
            Stage::Extract => "extract",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct CategoryFailure {
    pub category: String,
    pub stage: Stage,
    pub error: ScanError,
}

impl fmt::Display for CategoryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "category '{}' failed during {}: {}",
            self.category, self.stage, self.error
        )
    }
}

impl std::error::Error for CategoryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone)]
pub struct CategoryOutcome {
    pub category: String,
    pub url: String,
    pub expansions: usize,
    pub tiles_seen: usize,
    pub added: usize,
    pub duplicates: usize,
    pub issues: Vec<TileIssue>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub dataset: CatalogDataset,
    pub outcomes: Vec<CategoryOutcome>,
    pub failures: Vec<CategoryFailure>,
    pub close_error: Option<SurfaceError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn issue_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.issues.len()).sum()
    }
}

/// Callback for reporting catalog progress
pub type CatalogProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Runs pagination and extraction for each category in turn and merges the
/// records into one dataset.
pub struct CatalogAggregator {
    options: CatalogOptions,
    extractor: Extractor,
    progress_callback: Option<CatalogProgressCallback>,
}

impl CatalogAggregator {
    pub fn new(options: CatalogOptions) -> Self {
        let extractor = Extractor::new(options.selectors.clone());
        Self {
            options,
            extractor,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: CatalogProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Scrapes every category through `surface`, then closes it.
    ///
    /// The surface is closed on every way out of the run: success, a failed
    /// category, or a panic inside pagination/extraction (which is resumed
    /// after the close).
    pub async fn run<S: RenderSurface>(
        &self,
        mut surface: S,
        categories: &[CategorySpec],
    ) -> RunReport {
        let progress_bar = if self.options.show_progress_bars {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Starting catalog run...");
            Some(pb)
        } else {
            None
        };

        let mut report = RunReport::default();
        let scraped = AssertUnwindSafe(self.scrape_all(
            &mut surface,
            categories,
            &mut report,
            progress_bar.as_ref(),
        ))
        .catch_unwind()
        .await;

        if let Err(e) = surface.close().await {
            warn!("Failed to close render surface: {}", e);
            report.close_error = Some(e);
        }

        if let Some(ref pb) = progress_bar {
            pb.finish_with_message(format!(
                "Catalog run complete! {} products",
                report.dataset.len()
            ));
        }

        if let Err(panic) = scraped {
            std::panic::resume_unwind(panic);
        }
        report
    }

    async fn scrape_all<S: RenderSurface>(
        &self,
        surface: &mut S,
        categories: &[CategorySpec],
        report: &mut RunReport,
        progress_bar: Option<&ProgressBar>,
    ) {
        for (idx, spec) in categories.iter().enumerate() {
            self.notify(format!(
                "Scraping category {}/{}: {}",
                idx + 1,
                categories.len(),
                spec.label
            ));

            match self.scrape_category(surface, spec, progress_bar).await {
                Ok((extraction, page)) => {
                    let outcome = Self::merge(&mut report.dataset, spec, extraction, &page);
                    info!(
                        "{}: {} products added ({} tiles, {} expansions)",
                        spec.label, outcome.added, outcome.tiles_seen, outcome.expansions
                    );
                    report.outcomes.push(outcome);
                }
                Err(failure) => {
                    error!("{}", failure);
                    self.notify(format!("[!] {}", failure));
                    report.failures.push(failure);
                    if !self.options.keep_going {
                        break;
                    }
                }
            }
        }
    }

    async fn scrape_category<S: RenderSurface>(
        &self,
        surface: &mut S,
        spec: &CategorySpec,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<(Extraction, ListingPage), CategoryFailure> {
        let fail = |stage: Stage, error: ScanError| CategoryFailure {
            category: spec.label.clone(),
            stage,
            error,
        };

        let mut paginator = Paginator::with_options(self.options.pagination.clone());
        if let Some(pb) = progress_bar {
            let pb = pb.clone();
            let label = spec.label.clone();
            paginator = paginator.with_progress_callback(Arc::new(move |page: &ListingPage| {
                pb.set_message(format!(
                    "{}: {} tiles after {} expansions",
                    label, page.tile_count, page.expansions
                ));
            }));
        }

        let mut page = paginator
            .open(surface, &spec.url)
            .await
            .map_err(|e| fail(Stage::Navigate, e))?;
        paginator
            .expand_all(surface, &mut page)
            .await
            .map_err(|e| fail(Stage::Paginate, e))?;

        let extraction = self
            .extractor
            .extract(surface, &spec.url)
            .await
            .map_err(|e| fail(Stage::Extract, e))?;

        Ok((extraction, page))
    }

    fn merge(
        dataset: &mut CatalogDataset,
        spec: &CategorySpec,
        extraction: Extraction,
        page: &ListingPage,
    ) -> CategoryOutcome {
        let Extraction {
            records,
            issues,
            tiles_seen,
            mut duplicates,
        } = extraction;

        let offered = records.len();
        let added = dataset.extend(
            records
                .into_iter()
                .map(|record| record.with_category(spec.label.as_str())),
        );
        duplicates += offered - added;

        CategoryOutcome {
            category: spec.label.clone(),
            url: spec.url.clone(),
            expansions: page.expansions,
            tiles_seen,
            added,
            duplicates,
            issues,
        }
    }

    fn notify(&self, message: String) {
        if let Some(ref callback) = self.progress_callback {
            callback(message);
        }
    }
}

impl Default for CatalogAggregator {
    fn default() -> Self {
        Self::new(CatalogOptions::default())
    }
}
