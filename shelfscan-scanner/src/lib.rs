pub mod error;
pub mod extractor;
pub mod paginator;
pub mod result;
pub mod snapshot;
pub mod surface;
pub mod webdriver;

pub use error::{ScanError, SurfaceError};
pub use extractor::{Extractor, TileSelectors};
pub use paginator::{ExpandCallback, ListingPage, PaginationOptions, Paginator, Step};
pub use result::{Extraction, ProductRecord, TileIssue, TileIssueKind};
pub use snapshot::SnapshotSurface;
pub use surface::RenderSurface;
pub use webdriver::WebDriverSurface;
