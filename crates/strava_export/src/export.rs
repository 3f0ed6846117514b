//! The export run: page through activities, enrich them, write TSV rows.
//!
//! Pagination walks the newest-first activity list one page at a time.
//! Without a result cap the run is incremental and stops at the activity
//! recorded by the previous run; an explicit cap always wins over the
//! checkpoint. One request is in flight at a time.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_json::Value;
use strava_client::{ActivityRecord, MAX_PAGE_SIZE, StravaClient, StravaError};

use crate::checkpoint::CheckpointStore;
use crate::config::ExportConfig;
use crate::error::{ExportError, ExportResult};
use crate::gear::GearCache;
use crate::transform::{Column, FormatOptions, Source};

pub const DEFAULT_PAGE_SIZE: u32 = MAX_PAGE_SIZE;
pub const DEFAULT_START_PAGE: u32 = 1;

/// What to export and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRequest {
    pub output: PathBuf,
    /// Upper bound on rows; `None` means an incremental, uncapped run.
    pub max_results: Option<u32>,
    pub start_page: u32,
}

impl ExportRequest {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            max_results: None,
            start_page: DEFAULT_START_PAGE,
        }
    }

    pub fn with_max_results(mut self, max_results: Option<u32>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_start_page(mut self, start_page: u32) -> Self {
        self.start_page = start_page;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The list endpoint returned an empty or absent page.
    Done,
    /// Met the activity recorded by the previous run.
    ReachedCheckpoint,
    /// Fetched as many pages as the result cap needs.
    ReachedPageCap,
    /// Wrote as many rows as requested.
    ReachedResultCap,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSummary {
    pub output: PathBuf,
    pub rows_written: usize,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
    /// Id saved as the new checkpoint, if any row was processed.
    pub checkpoint: Option<i64>,
}

/// Page size for a run: the endpoint maximum, or the cap when smaller.
pub fn page_size(max_results: Option<u32>) -> u32 {
    match max_results {
        Some(n) if n < DEFAULT_PAGE_SIZE => n,
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Number of pages a capped run may fetch, counted from its start page.
pub fn max_pages(max_results: Option<u32>) -> Option<u32> {
    max_results.map(|n| n.div_ceil(page_size(Some(n))))
}

/// `<dir>/strava_YYYYMMDD_HHMM.tsv` for the given local time.
pub fn default_output_path(dir: &Path, now: NaiveDateTime) -> PathBuf {
    dir.join(format!("strava_{}.tsv", now.format("%Y%m%d_%H%M")))
}

/// Fails when `path` already exists; nothing is ever overwritten.
pub fn ensure_output_available(path: &Path) -> ExportResult<()> {
    if path.exists() {
        return Err(ExportError::OutputExists(path.to_path_buf()));
    }
    Ok(())
}

/// Tab-separated writer that ends every line with a trailing tab.
struct RowWriter {
    inner: csv::Writer<File>,
}

impl RowWriter {
    fn new(file: File) -> Self {
        let inner = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        Self { inner }
    }

    fn write_row<I, S>(&mut self, cells: I) -> ExportResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        for cell in cells {
            self.inner.write_field(cell)?;
        }
        // empty closing field: every cell is followed by a tab
        self.inner.write_field("")?;
        self.inner.write_record(None::<&[u8]>)?;
        Ok(())
    }

    fn flush(&mut self) -> ExportResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}

pub struct Exporter<'a> {
    client: &'a dyn StravaClient,
    columns: &'a [&'static Column],
    format: FormatOptions,
    checkpoints: CheckpointStore,
}

impl<'a> Exporter<'a> {
    pub fn new(client: &'a dyn StravaClient, config: &'a ExportConfig) -> Self {
        Self {
            client,
            columns: &config.columns,
            format: config.format,
            checkpoints: CheckpointStore::new(&config.checkpoint_file),
        }
    }

    /// Header labels in column order.
    pub fn header(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.label(&self.format))
            .collect()
    }

    fn needs_detail(&self) -> bool {
        self.columns.iter().any(|c| c.source == Source::Detail)
    }

    /// Run the export. When an error escapes before any data row has been
    /// written, the header-only output file is removed again.
    pub async fn run(&self, request: &ExportRequest) -> ExportResult<ExportSummary> {
        if request.max_results == Some(0) {
            return Err(ExportError::Config("max results must be at least 1".into()));
        }
        if request.start_page == 0 {
            return Err(ExportError::Config("pages are numbered from 1".into()));
        }
        ensure_output_available(&request.output)?;
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create_new(&request.output).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => ExportError::OutputExists(request.output.clone()),
            _ => e.into(),
        })?;

        let mut writer = RowWriter::new(file);
        let mut rows_written = 0;
        match self.export_pages(&mut writer, request, &mut rows_written).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                if let Err(flush) = writer.flush() {
                    tracing::warn!(error = %flush, "could not flush partial output");
                }
                drop(writer);
                if rows_written == 0 {
                    tracing::warn!(path = %request.output.display(), "removing output file with no rows");
                    if let Err(rm) = fs::remove_file(&request.output) {
                        tracing::warn!(error = %rm, "could not remove empty output file");
                    }
                }
                Err(e)
            }
        }
    }

    async fn export_pages(
        &self,
        writer: &mut RowWriter,
        request: &ExportRequest,
        rows_written: &mut usize,
    ) -> ExportResult<ExportSummary> {
        let last_saved = self.checkpoints.read()?;
        writer.write_row(self.header())?;

        let per_page = page_size(request.max_results);
        let page_cap = max_pages(request.max_results);
        let needs_detail = self.needs_detail();
        let mut gear = GearCache::new();
        let mut newest: Option<i64> = None;
        let mut page = request.start_page;
        let mut pages_fetched = 0;

        tracing::info!(
            start_page = page,
            per_page,
            max_results = ?request.max_results,
            checkpoint = ?last_saved,
            "starting export"
        );

        let stop_reason = 'pages: loop {
            let activities = match self.client.list_activities(page, per_page).await? {
                Some(activities) if !activities.is_empty() => activities,
                _ => break StopReason::Done,
            };
            pages_fetched += 1;

            for activity in &activities {
                let id = activity_id(activity)?;
                if request.max_results.is_none() && last_saved == Some(id) {
                    tracing::info!(id, "reached previously exported activity");
                    break 'pages StopReason::ReachedCheckpoint;
                }
                newest.get_or_insert(id);

                let detail = if needs_detail {
                    self.client.get_activity(id).await?
                } else {
                    None
                };
                let row = self.render_row(activity, detail.as_ref(), &mut gear).await?;
                writer.write_row(&row)?;
                *rows_written += 1;
                let name = activity
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                tracing::info!(id, name, "exported activity");

                if request
                    .max_results
                    .is_some_and(|cap| *rows_written >= cap as usize)
                {
                    break 'pages StopReason::ReachedResultCap;
                }
            }

            if page_cap.is_some_and(|cap| pages_fetched >= cap) {
                break StopReason::ReachedPageCap;
            }
            page += 1;
        };

        writer.flush()?;
        if let Some(id) = newest {
            self.checkpoints.write(id)?;
        }
        tracing::info!(
            rows = *rows_written,
            pages = pages_fetched,
            ?stop_reason,
            gear_lookups = gear.len(),
            "export finished"
        );

        Ok(ExportSummary {
            output: request.output.clone(),
            rows_written: *rows_written,
            pages_fetched,
            stop_reason,
            checkpoint: newest,
        })
    }

    async fn render_row(
        &self,
        activity: &ActivityRecord,
        detail: Option<&ActivityRecord>,
        gear: &mut GearCache,
    ) -> ExportResult<Vec<String>> {
        let mut cells = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            let cell = match column.source {
                Source::Summary => column.render(activity.get(column.name), &self.format),
                Source::Detail => {
                    column.render(detail.and_then(|d| d.get(column.name)), &self.format)
                }
                Source::Gear => match activity
                    .get(column.name)
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                {
                    Some(gear_id) => gear.resolve(self.client, gear_id).await?,
                    None => column.render(activity.get(column.name), &self.format),
                },
            };
            cells.push(cell);
        }
        Ok(cells)
    }
}

fn activity_id(activity: &ActivityRecord) -> ExportResult<i64> {
    activity
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ExportError::Api(StravaError::Decode("activity without a numeric id".into())))
}
