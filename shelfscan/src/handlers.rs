use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use shelfscan_core::catalog::{CatalogAggregator, CatalogOptions, CategorySpec};
use shelfscan_core::config::{Config, expand_path};
use shelfscan_core::report::generate_run_summary;
use shelfscan_core::sink::{CsvFileSink, DatasetSink, SpreadsheetSink, deliver};
use shelfscan_scanner::{SnapshotSurface, WebDriverSurface};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A `CATEGORY=FILE` pair from `--snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotArg {
    pub category: String,
    pub path: PathBuf,
}

pub fn parse_snapshot_arg(raw: &str) -> Result<SnapshotArg, String> {
    let Some((category, path)) = raw.split_once('=') else {
        return Err(format!("expected CATEGORY=FILE, got '{}'", raw));
    };
    let category = category.trim();
    let path = path.trim();
    if category.is_empty() || path.is_empty() {
        return Err(format!("expected CATEGORY=FILE, got '{}'", raw));
    }
    Ok(SnapshotArg {
        category: category.to_string(),
        path: expand_path(path),
    })
}

/// Command line choices that layer on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub quiet: bool,
    pub config_path: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub no_upload: bool,
    pub keep_going: bool,
    pub snapshots: Vec<SnapshotArg>,
}

impl RunSettings {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            quiet: matches.get_flag("quiet"),
            config_path: matches.get_one::<PathBuf>("config").cloned(),
            output: matches.get_one::<PathBuf>("output").cloned(),
            no_upload: matches.get_flag("no-upload"),
            keep_going: matches.get_flag("keep-going"),
            snapshots: matches
                .get_many::<SnapshotArg>("snapshot")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        }
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(ref output) = self.output {
            config.output.csv_path = output.to_string_lossy().into_owned();
        }
        if self.no_upload {
            config.output.spreadsheet = None;
        }
        if self.keep_going {
            config.keep_going = true;
        }
    }
}

/// Install the fmt subscriber; `RUST_LOG` wins over the quiet default.
pub fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second install (e.g. from tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn catalog_options(config: &Config, quiet: bool) -> CatalogOptions {
    CatalogOptions {
        pagination: config.pagination.to_options(&config.selectors),
        selectors: config.selectors.clone(),
        keep_going: config.keep_going,
        show_progress_bars: !quiet,
    }
}

/// Local CSV first, then the spreadsheet if one is configured.
pub fn build_sinks(config: &Config) -> Result<Vec<Box<dyn DatasetSink>>> {
    let mut sinks: Vec<Box<dyn DatasetSink>> =
        vec![Box::new(CsvFileSink::new(expand_path(&config.output.csv_path)))];
    if let Some(ref sheet) = config.output.spreadsheet {
        let sink = SpreadsheetSink::new(
            sheet.api_base.as_str(),
            sheet.spreadsheet_id.as_str(),
            expand_path(&sheet.credentials_path),
        )
        .with_context(|| format!("Failed to set up upload to spreadsheet {}", sheet.spreadsheet_id))?;
        sinks.push(Box::new(sink));
    }
    Ok(sinks)
}

/// Loads each snapshot under its category's URL and returns the categories to
/// scrape, in config order. Categories without a snapshot are left out.
pub fn snapshot_categories(
    categories: &[CategorySpec],
    snapshots: &[SnapshotArg],
) -> Result<(SnapshotSurface, Vec<CategorySpec>)> {
    for snapshot in snapshots {
        if !categories.iter().any(|c| c.label == snapshot.category) {
            bail!("--snapshot names unknown category '{}'", snapshot.category);
        }
    }

    let mut surface = SnapshotSurface::new();
    let mut selected = Vec::new();
    for category in categories {
        let Some(snapshot) = snapshots.iter().rev().find(|s| s.category == category.label) else {
            continue;
        };
        surface = surface
            .with_page_file(category.url.as_str(), &snapshot.path)
            .with_context(|| format!("Failed to read snapshot {}", snapshot.path.display()))?;
        selected.push(category.clone());
    }
    Ok((surface, selected))
}

/// Runs a full scrape and delivery. `Ok(false)` means the run finished but a
/// category or a sink failed.
pub async fn handle_run(matches: &ArgMatches) -> Result<bool> {
    let settings = RunSettings::from_matches(matches);
    let mut config = Config::load_or_default(settings.config_path.as_deref())
        .context("Failed to load configuration")?;
    settings.apply(&mut config);

    let mut aggregator = CatalogAggregator::new(catalog_options(&config, settings.quiet));
    if !settings.quiet {
        aggregator = aggregator.with_progress_callback(Arc::new(|msg: String| {
            println!("{}", msg);
        }));
    }

    let report = if settings.snapshots.is_empty() {
        info!("Connecting to WebDriver at {}", config.webdriver_url);
        let surface = WebDriverSurface::connect(&config.webdriver_url)
            .await
            .with_context(|| {
                format!("Failed to start a browser session at {}", config.webdriver_url)
            })?;
        aggregator.run(surface, &config.categories).await
    } else {
        let (surface, categories) = snapshot_categories(&config.categories, &settings.snapshots)?;
        aggregator.run(surface, &categories).await
    };

    let sinks = build_sinks(&config)?;
    let delivery = deliver(&report.dataset, &sinks)
        .await
        .context("Failed to render the dataset as CSV")?;

    if !settings.quiet {
        println!("\n{} Catalog run complete!\n", "✓".green());
    }
    print!("{}", generate_run_summary(&report, Some(&delivery)));

    Ok(report.is_success() && delivery.is_success())
}
