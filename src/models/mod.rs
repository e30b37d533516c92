pub mod catalog;
pub mod download;
pub mod metadata;
pub mod placement;
pub mod service;

pub use catalog::{Catalog, CatalogEntry, LookupError, ModelSource, SourceKind};
pub use download::{
    download, download_with_progress, DownloadError, DownloadPlan, DownloadStatus, Fetcher,
    HttpFetcher, Progress,
};
pub use metadata::{compute_sha256, format_megabytes, verify_artifact, Verification};
pub use placement::{place_assets, scan_directory, DirectoryStatus, PlacementReport};
pub use service::{
    convert_all, convert_model, download_all, download_model, BatchSummary, ItemOutcome,
};
