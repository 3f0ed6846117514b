use std::path::PathBuf;

use crate::checkpoint::DEFAULT_CHECKPOINT_FILE;
use crate::credentials::{DEFAULT_CLIENT_SECRET_FILE, DEFAULT_CREDENTIALS_FILE};
use crate::error::{ExportError, ExportResult};
use crate::transform::{self, Column, FormatOptions, TemperatureScale, UnitSystem};

pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// Everything a run needs that is fixed at start-up.
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub api: strava_client::config::Config,
    pub format: FormatOptions,
    pub columns: Vec<&'static Column>,
    pub credentials_file: PathBuf,
    pub client_secret_file: PathBuf,
    pub checkpoint_file: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            api: strava_client::config::Config::default(),
            format: FormatOptions::default(),
            columns: transform::default_columns(),
            credentials_file: DEFAULT_CREDENTIALS_FILE.into(),
            client_secret_file: DEFAULT_CLIENT_SECRET_FILE.into(),
            checkpoint_file: DEFAULT_CHECKPOINT_FILE.into(),
            output_dir: DEFAULT_OUTPUT_DIR.into(),
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> ExportResult<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function. This avoids mutating global environment in tests.
    pub fn from_env_with<F>(mut get: F) -> ExportResult<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api = strava_client::config::Config::from_env_with(&mut get)
            .map_err(|e| ExportError::Config(e.to_string()))?;
        let units = if flag(&mut get, "STRAVA_METRIC")? {
            UnitSystem::Metric
        } else {
            UnitSystem::Imperial
        };
        let temperature = if flag(&mut get, "STRAVA_CELSIUS")? {
            TemperatureScale::Celsius
        } else {
            TemperatureScale::Fahrenheit
        };
        let columns = match get("STRAVA_COLUMNS") {
            Some(list) => parse_columns(&list)?,
            None => transform::default_columns(),
        };
        let defaults = Self::default();
        let path = |value: Option<String>, default: PathBuf| {
            value.map(PathBuf::from).unwrap_or(default)
        };
        Ok(Self {
            api,
            format: FormatOptions { units, temperature },
            columns,
            credentials_file: path(get("STRAVA_CREDENTIALS_FILE"), defaults.credentials_file),
            client_secret_file: path(
                get("STRAVA_CLIENT_SECRET_FILE"),
                defaults.client_secret_file,
            ),
            checkpoint_file: path(get("STRAVA_CHECKPOINT_FILE"), defaults.checkpoint_file),
            output_dir: path(get("STRAVA_OUTPUT_DIR"), defaults.output_dir),
        })
    }
}

fn flag<F>(get: &mut F, key: &str) -> ExportResult<bool>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ExportError::Config(format!(
            "{key} must be a boolean, got {other:?}"
        ))),
    }
}

/// Comma-separated column names, each of which must be in the column table.
fn parse_columns(list: &str) -> ExportResult<Vec<&'static Column>> {
    let columns = list
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            transform::column(name)
                .ok_or_else(|| ExportError::Config(format!("unknown column {name:?}")))
        })
        .collect::<ExportResult<Vec<_>>>()?;
    if columns.is_empty() {
        return Err(ExportError::Config("STRAVA_COLUMNS names no columns".into()));
    }
    Ok(columns)
}
