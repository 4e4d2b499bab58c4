use std::time::Duration;
use thiserror::Error;

/// Failures reported by a render surface adapter.
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("WebDriver command failed: {0}")]
    WebDriver(#[from] fantoccini::error::CmdError),

    #[error("WebDriver session could not be created: {0}")]
    Session(#[from] fantoccini::error::NewSessionError),

    #[error("Element is no longer attached to the page")]
    Stale,

    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("Unexpected script result: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SurfaceError {
    pub fn is_stale(&self) -> bool {
        match self {
            SurfaceError::Stale => true,
            SurfaceError::WebDriver(e) => e.is_stale_element_reference(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Render surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Listing did not settle within {0:?}")]
    RenderTimeout(Duration),

    #[error("Gave up after {0} expansions; the load-more control never went away")]
    ExpansionLimit(usize),

    #[error("Load-more control is present but {0} consecutive clicks loaded nothing")]
    Stalled(usize),
}

pub type Result<T> = std::result::Result<T, ScanError>;
