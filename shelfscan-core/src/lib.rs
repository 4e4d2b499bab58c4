pub mod catalog;
pub mod config;
pub mod dataset;
pub mod report;
pub mod sink;

use colored::Colorize;

pub use catalog::{
    CatalogAggregator, CatalogOptions, CatalogProgressCallback, CategoryFailure, CategoryOutcome,
    CategorySpec, RunReport, Stage,
};
pub use config::{Config, ConfigError};
pub use dataset::{CSV_HEADERS, CatalogDataset};
pub use sink::{CsvFileSink, DatasetSink, DeliveryReport, SinkError, SpreadsheetSink, deliver};

pub fn print_banner() {
    let banner = r#"
     _          _  __
 ___| |__   ___| |/ _|___  ___ __ _ _ __
/ __| '_ \ / _ \ | |_/ __|/ __/ _` | '_ \
\__ \ | | |  __/ |  _\__ \ (_| (_| | | | |
|___/_| |_|\___|_|_| |___/\___\__,_|_| |_|
"#;
    println!("{}", banner.cyan());
    println!(
        "  {} {}\n",
        "catalog scraper".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
