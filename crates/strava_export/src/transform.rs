//! Column table and value formatting for the export.
//!
//! Every exported column is declared once in [`COLUMNS`] with its header
//! label, where its value comes from and how a raw API value is rendered.
//! Unit handling depends only on [`FormatOptions`], which the caller builds
//! once at start-up and passes in explicitly.

use serde_json::Value;

/// Prefix of the public page for an activity; the activity id is appended.
pub const ACTIVITY_URL_BASE: &str = "https://www.strava.com/activities/";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnitSystem {
    #[default]
    Imperial,
    Metric,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TemperatureScale {
    #[default]
    Fahrenheit,
    Celsius,
}

/// Process-wide rendering modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormatOptions {
    pub units: UnitSystem,
    pub temperature: TemperatureScale,
}

impl FormatOptions {
    pub fn is_metric(&self) -> bool {
        self.units == UnitSystem::Metric
    }
}

/// Where a column's raw value is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// The activity as returned by the list endpoint.
    Summary,
    /// The per-activity detail lookup.
    Detail,
    /// The gear lookup keyed by the summary value.
    Gear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Label {
    /// Column name with underscores replaced by spaces.
    Name,
    Fixed(&'static str),
    /// Base text followed by the metric or imperial unit.
    Unit {
        base: &'static str,
        metric: &'static str,
        imperial: &'static str,
    },
    /// Base text followed by `C` or `F`.
    Temperature(&'static str),
}

type Transform = fn(&Value, &FormatOptions) -> String;

#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub name: &'static str,
    pub source: Source,
    label: Label,
    transform: Transform,
}

impl Column {
    const fn summary(name: &'static str, label: Label, transform: Transform) -> Self {
        Self {
            name,
            source: Source::Summary,
            label,
            transform,
        }
    }

    const fn plain(name: &'static str) -> Self {
        Self::summary(name, Label::Name, passthrough)
    }

    const fn detail(name: &'static str) -> Self {
        Self {
            name,
            source: Source::Detail,
            label: Label::Name,
            transform: passthrough,
        }
    }

    /// Header text for this column under the given modes.
    pub fn label(&self, options: &FormatOptions) -> String {
        match self.label {
            Label::Name => self.name.replace('_', " "),
            Label::Fixed(text) => text.to_string(),
            Label::Unit {
                base,
                metric,
                imperial,
            } => {
                let unit = if options.is_metric() { metric } else { imperial };
                format!("{base} {unit}")
            }
            Label::Temperature(base) => match options.temperature {
                TemperatureScale::Celsius => format!("{base} C"),
                TemperatureScale::Fahrenheit => format!("{base} F"),
            },
        }
    }

    /// Render a raw value. Falsy values (absent, null, false, zero, empty)
    /// become the empty string, so a genuine zero reading is indistinguishable
    /// from a missing one.
    pub fn render(&self, raw: Option<&Value>, options: &FormatOptions) -> String {
        match raw {
            Some(value) if is_truthy(value) => (self.transform)(value, options),
            _ => String::new(),
        }
    }
}

const fn elevation_label(base: &'static str) -> Label {
    Label::Unit {
        base,
        metric: "m",
        imperial: "ft",
    }
}

const fn speed_label(base: &'static str) -> Label {
    Label::Unit {
        base,
        metric: "km/h",
        imperial: "mi/h",
    }
}

/// Every column the exporter knows about, in default output order.
pub const COLUMNS: &[Column] = &[
    Column::summary("start_date_local", Label::Name, start_timestamp),
    Column::plain("name"),
    Column::detail("description"),
    Column::plain("type"),
    Column::detail("device_name"),
    Column::summary(
        "distance",
        Label::Unit {
            base: "distance",
            metric: "km",
            imperial: "mi",
        },
        distance,
    ),
    Column::summary(
        "total_elevation_gain",
        elevation_label("total elevation gain"),
        elevation,
    ),
    Column::summary("average_watts", Label::Name, whole_number),
    Column::summary("weighted_average_watts", Label::Name, whole_number),
    Column::plain("average_cadence"),
    Column::summary("moving_time", Label::Fixed("moving time min"), minutes),
    Column::summary("average_speed", speed_label("average speed"), speed),
    Column::summary("max_speed", speed_label("max speed"), speed),
    Column {
        name: "gear_id",
        source: Source::Gear,
        label: Label::Fixed("gear"),
        transform: passthrough,
    },
    Column::detail("calories"),
    Column::plain("suffer_score"),
    Column::plain("average_heartrate"),
    Column::plain("max_heartrate"),
    Column::summary(
        "average_temp",
        Label::Temperature("average temp"),
        temperature,
    ),
    Column::plain("trainer"),
    Column::plain("manual"),
    Column::summary("elapsed_time", Label::Fixed("elapsed time min"), minutes),
    Column::summary("elev_high", elevation_label("elev high"), elevation),
    Column::summary("elev_low", elevation_label("elev low"), elevation),
    Column::plain("athlete_count"),
    Column::plain("location_city"),
    Column::plain("location_state"),
    Column::plain("start_latlng"),
    Column::plain("end_latlng"),
    Column::summary("kilojoules", Label::Name, whole_number),
    Column::plain("total_photo_count"),
    Column::summary("id", Label::Fixed("url"), activity_url),
];

/// Look a column up by its API field name.
pub fn column(name: &str) -> Option<&'static Column> {
    COLUMNS.iter().find(|c| c.name == name)
}

/// The default column set, in output order.
pub fn default_columns() -> Vec<&'static Column> {
    COLUMNS.iter().collect()
}

/// Format a raw value for the named column. Unknown columns pass through.
pub fn format(column_name: &str, raw: Option<&Value>, options: &FormatOptions) -> String {
    match column(column_name) {
        Some(col) => col.render(raw, options),
        None => match raw {
            Some(value) if is_truthy(value) => passthrough(value, options),
            _ => String::new(),
        },
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub fn meters_to_feet(meters: f64) -> String {
    format!("{:.0}", meters * 3.28084)
}

pub fn meters_to_miles(meters: f64) -> String {
    format!("{:.2}", meters / 1609.34)
}

pub fn meters_to_kilometers(meters: f64) -> String {
    format!("{:.2}", meters / 1000.0)
}

pub fn mps_to_mph(mps: f64) -> String {
    format!("{:.1}", mps * 2.23694)
}

pub fn mps_to_kph(mps: f64) -> String {
    format!("{:.1}", mps * 3.6)
}

pub fn seconds_to_minutes(seconds: f64) -> String {
    format!("{:.1}", seconds / 60.0)
}

pub fn celsius_to_fahrenheit(celsius: f64) -> String {
    format!("{:.0}", celsius * 9.0 / 5.0 + 32.0)
}

/// Reformat an ISO-8601 timestamp as `YYYY-MM-DD HH:MM:SS`, keeping the
/// wall-clock time as written.
///
/// Accepts:
/// - RFC3339 with `Z` or an offset
/// - Naive datetime `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD HH:MM:SS`
/// - `YYYY-MM-DD` (midnight)
pub fn reformat_timestamp(s: &str) -> Option<String> {
    const OUT: &str = "%Y-%m-%d %H:%M:%S";
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local().format(OUT).to_string());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, pattern) {
            return Some(ndt.format(OUT).to_string());
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(format!("{} 00:00:00", date.format("%Y-%m-%d")));
    }
    None
}

fn passthrough(value: &Value, _: &FormatOptions) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => display(other),
    }
}

/// Spreadsheet-facing text for non-string values: `True`/`False`, and lists
/// written as `[a, b]` with quoted strings inside.
fn display(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{s}'"),
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(display).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("'{k}': {}", display(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// Apply `f` to numeric values; anything else passes through untouched.
fn numeric(value: &Value, options: &FormatOptions, f: impl FnOnce(f64) -> String) -> String {
    value
        .as_f64()
        .map(f)
        .unwrap_or_else(|| passthrough(value, options))
}

fn elevation(value: &Value, options: &FormatOptions) -> String {
    numeric(value, options, |m| {
        if options.is_metric() {
            format!("{m:.0}")
        } else {
            meters_to_feet(m)
        }
    })
}

fn speed(value: &Value, options: &FormatOptions) -> String {
    numeric(value, options, |mps| {
        if options.is_metric() {
            mps_to_kph(mps)
        } else {
            mps_to_mph(mps)
        }
    })
}

fn distance(value: &Value, options: &FormatOptions) -> String {
    numeric(value, options, |m| {
        if options.is_metric() {
            meters_to_kilometers(m)
        } else {
            meters_to_miles(m)
        }
    })
}

fn minutes(value: &Value, options: &FormatOptions) -> String {
    numeric(value, options, seconds_to_minutes)
}

fn temperature(value: &Value, options: &FormatOptions) -> String {
    numeric(value, options, |c| match options.temperature {
        TemperatureScale::Celsius => format!("{c:.1}"),
        TemperatureScale::Fahrenheit => celsius_to_fahrenheit(c),
    })
}

fn whole_number(value: &Value, options: &FormatOptions) -> String {
    numeric(value, options, |n| format!("{n:.0}"))
}

fn activity_url(value: &Value, options: &FormatOptions) -> String {
    format!("{ACTIVITY_URL_BASE}{}", passthrough(value, options))
}

fn start_timestamp(value: &Value, options: &FormatOptions) -> String {
    match value.as_str() {
        Some(s) => reformat_timestamp(s).unwrap_or_else(|| s.to_string()),
        None => passthrough(value, options),
    }
}
