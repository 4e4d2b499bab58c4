use crate::catalog::CategorySpec;
use serde::{Deserialize, Serialize};
use shelfscan_scanner::{PaginationOptions, TileSelectors};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/shelfscan/config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level run configuration. Every field has a default, so an empty JSON
/// object (or no file at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub webdriver_url: String,
    pub categories: Vec<CategorySpec>,
    pub pagination: PaginationConfig,
    pub selectors: TileSelectors,
    pub output: OutputConfig,
    /// Keep scraping later categories after one fails.
    pub keep_going: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            categories: vec![
                CategorySpec::new("Women", "https://shop.lululemon.com/c/women-maintops/_/N-815"),
                CategorySpec::new("Men", "https://shop.lululemon.com/c/men-maintops/_/N-816"),
            ],
            pagination: PaginationConfig::default(),
            selectors: TileSelectors::default(),
            output: OutputConfig::default(),
            keep_going: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub load_more_text: String,
    pub overshoot: u64,
    pub poll_interval_ms: u64,
    pub quiet_polls: usize,
    pub settle_timeout_secs: u64,
    pub max_expansions: usize,
    pub max_stalled_cycles: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        let defaults = PaginationOptions::default();
        Self {
            load_more_text: defaults.load_more_text,
            overshoot: defaults.overshoot,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            quiet_polls: defaults.quiet_polls,
            settle_timeout_secs: defaults.settle_timeout.as_secs(),
            max_expansions: defaults.max_expansions,
            max_stalled_cycles: defaults.max_stalled_cycles,
        }
    }
}

impl PaginationConfig {
    /// Pagination options; tiles are counted with the same selector the
    /// extractor walks.
    pub fn to_options(&self, selectors: &TileSelectors) -> PaginationOptions {
        PaginationOptions {
            load_more_text: self.load_more_text.clone(),
            tile_selector: selectors.tile.clone(),
            overshoot: self.overshoot,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            quiet_polls: self.quiet_polls,
            settle_timeout: Duration::from_secs(self.settle_timeout_secs),
            max_expansions: self.max_expansions,
            max_stalled_cycles: self.max_stalled_cycles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: String,
    pub spreadsheet: Option<SpreadsheetConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: "luluwmtm.csv".to_string(),
            spreadsheet: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadsheetConfig {
    pub spreadsheet_id: String,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_credentials_path() -> String {
    "client_secret.json".to_string()
}

fn default_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

/// Expands a leading `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

impl Config {
    pub fn from_json(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw, path)
    }

    /// Loads an explicit path, else the default path if it exists, else the
    /// built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = expand_path(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load(&default_path);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid("no categories configured".to_string()));
        }
        let mut labels = HashSet::new();
        for category in &self.categories {
            if category.label.trim().is_empty() {
                return Err(ConfigError::Invalid("category with empty label".to_string()));
            }
            if !labels.insert(category.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate category '{}'",
                    category.label
                )));
            }
            Url::parse(&category.url).map_err(|e| {
                ConfigError::Invalid(format!("category '{}': bad URL: {}", category.label, e))
            })?;
        }
        if self.pagination.max_expansions == 0 || self.pagination.max_stalled_cycles == 0 {
            return Err(ConfigError::Invalid(
                "max_expansions and max_stalled_cycles must be at least 1".to_string(),
            ));
        }
        if self.pagination.settle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "settle_timeout_secs must be at least 1".to_string(),
            ));
        }
        if let Some(ref sheet) = self.output.spreadsheet
            && sheet.spreadsheet_id.trim().is_empty()
        {
            return Err(ConfigError::Invalid("spreadsheet_id is empty".to_string()));
        }
        Ok(())
    }
}
