//! # PullFeed Catalog
//!
//! Pulls weekly releases per publisher from the upstream catalog service and
//! keeps one immutable snapshot per publisher. A refresh builds the new
//! snapshot completely before swapping it in, so readers only ever see a
//! whole week or the previous whole week.

pub mod catalog;
pub mod fetcher;
pub mod refresh;
pub mod source;

pub use catalog::{CatalogSnapshot, RefreshReport, ReleaseCatalog};
pub use fetcher::CatalogFetcher;
pub use refresh::{RefreshSchedule, STATUS_INTERVAL_SECS, run_refresh_loop, run_status_rotation};
pub use source::{CatalogSource, DetailsRequest, HttpCatalogSource, ReleaseSummary, SourceError};
