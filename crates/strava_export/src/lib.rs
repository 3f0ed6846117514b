//! Export a Strava athlete's activity history to a tab-separated file.
//!
//! The run is driven by [`export::Exporter`], which pages through the
//! activity list through any [`strava_client::StravaClient`] and renders each
//! activity with the column table in [`transform`].

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod export;
pub mod gear;
pub mod logging;
pub mod transform;

mod test_utils;

pub use config::ExportConfig;
pub use error::{ExportError, ExportResult};
pub use export::{ExportRequest, ExportSummary, Exporter, StopReason};
