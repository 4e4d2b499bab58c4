// Dataset delivery: local CSV file and remote spreadsheet upload

use crate::dataset::CatalogDataset;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unusable credential file {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },

    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for the rendered CSV bytes of a finished dataset.
#[async_trait]
pub trait DatasetSink: Send + Sync {
    fn describe(&self) -> String;

    async fn write(&self, csv: &[u8]) -> Result<(), SinkError>;
}

pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DatasetSink for CsvFileSink {
    fn describe(&self) -> String {
        format!("CSV file {}", self.path.display())
    }

    async fn write(&self, csv: &[u8]) -> Result<(), SinkError> {
        let io_err = |source| SinkError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&self.path, csv).await.map_err(io_err)?;
        info!("Wrote {} bytes to {}", csv.len(), self.path.display());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Credentials {
    access_token: String,
}

/// Replaces the contents of a remote spreadsheet with the CSV bytes.
///
/// The bearer token comes from an externally managed credential file; this
/// sink never refreshes or requests tokens itself.
pub struct SpreadsheetSink {
    client: Client,
    api_base: String,
    spreadsheet_id: String,
    credentials_path: PathBuf,
}

impl SpreadsheetSink {
    pub fn new(
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        credentials_path: impl Into<PathBuf>,
    ) -> Result<Self, SinkError> {
        let client = Client::builder()
            .user_agent(concat!("shelfscan/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            credentials_path: credentials_path.into(),
        })
    }

    pub fn upload_url(&self) -> String {
        format!(
            "{}/upload/drive/v2/files/{}?uploadType=media&convert=true",
            self.api_base, self.spreadsheet_id
        )
    }

    async fn access_token(&self) -> Result<String, SinkError> {
        let bad = |reason: String| SinkError::Credentials {
            path: self.credentials_path.clone(),
            reason,
        };
        let raw = tokio::fs::read_to_string(&self.credentials_path)
            .await
            .map_err(|e| bad(e.to_string()))?;
        let credentials: Credentials =
            serde_json::from_str(&raw).map_err(|e| bad(e.to_string()))?;
        if credentials.access_token.trim().is_empty() {
            return Err(bad("access_token is empty".to_string()));
        }
        Ok(credentials.access_token)
    }
}

#[async_trait]
impl DatasetSink for SpreadsheetSink {
    fn describe(&self) -> String {
        format!("spreadsheet {}", self.spreadsheet_id)
    }

    async fn write(&self, csv: &[u8]) -> Result<(), SinkError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .put(self.upload_url())
            .bearer_auth(token)
            .header("content-type", "text/csv")
            .body(csv.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!("Uploaded {} bytes to spreadsheet {}", csv.len(), self.spreadsheet_id);
        Ok(())
    }
}

pub struct SinkOutcome {
    pub sink: String,
    pub result: Result<(), SinkError>,
}

#[derive(Default)]
pub struct DeliveryReport {
    pub outcomes: Vec<SinkOutcome>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SinkOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Renders the dataset once and hands it to every sink in order. A failing
/// sink never stops the ones after it.
pub async fn deliver(
    dataset: &CatalogDataset,
    sinks: &[Box<dyn DatasetSink>],
) -> Result<DeliveryReport, SinkError> {
    let csv = dataset.to_csv_bytes()?;
    let mut report = DeliveryReport::default();

    for sink in sinks {
        let name = sink.describe();
        let result = sink.write(&csv).await;
        if let Err(ref e) = result {
            error!("Delivery to {} failed: {}", name, e);
        }
        report.outcomes.push(SinkOutcome { sink: name, result });
    }

    Ok(report)
}
