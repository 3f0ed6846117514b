use std::path::PathBuf;

use clap::Parser;

use crate::export::{DEFAULT_START_PAGE, ExportRequest};

/// Download your Strava activities into a TSV file.
///
/// Without MAX_RESULTS the export is incremental: it stops at the newest
/// activity saved by the previous run.
#[derive(Debug, Parser)]
#[command(name = "strava-export", version, about)]
pub struct Cli {
    /// Export at most this many activities, ignoring the saved checkpoint
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub max_results: Option<u32>,

    /// Page of the activity list to start from
    #[arg(short, long, default_value_t = DEFAULT_START_PAGE, value_parser = clap::value_parser!(u32).range(1..))]
    pub page: u32,

    /// Output file (default: <output dir>/strava_YYYYMMDD_HHMM.tsv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Turn the parsed arguments into a request writing to `output`.
    pub fn into_request(self, output: PathBuf) -> ExportRequest {
        ExportRequest::new(output)
            .with_max_results(self.max_results)
            .with_start_page(self.page)
    }
}
