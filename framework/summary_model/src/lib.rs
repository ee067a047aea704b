use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Marker used when a relative standard deviation has no meaningful value.
pub const UNDEFINED_MARKER: &str = "undefined";

/// How a statistic is rounded before it is reported
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Round to the nearest whole number, halves away from zero
    Integer,
    /// Round to the given number of decimal digits
    Decimal(u32),
}

impl Rounding {
    /// Apply this rounding policy to a value
    ///
    /// Rounding is idempotent, applying the same policy to an already rounded value returns it
    /// unchanged.
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Rounding::Integer => value.round(),
            Rounding::Decimal(digits) => round_to(value, *digits),
        }
    }
}

/// Round a value to `digits` decimal places, halves away from zero
pub fn round_to(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// The relative standard deviation of a metric, as a percentage of its mean
///
/// When the mean is zero the ratio cannot be computed and the value is reported as
/// [RelativeStdDev::Undefined] rather than as an infinite or NaN number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RelativeStdDevRepr", into = "RelativeStdDevRepr")]
pub enum RelativeStdDev {
    Value(f64),
    Undefined,
}

impl RelativeStdDev {
    /// The numeric value, if defined
    pub fn value(&self) -> Option<f64> {
        match self {
            RelativeStdDev::Value(v) => Some(*v),
            RelativeStdDev::Undefined => None,
        }
    }
}

impl std::fmt::Display for RelativeStdDev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelativeStdDev::Value(v) => write!(f, "{v}"),
            RelativeStdDev::Undefined => write!(f, "{UNDEFINED_MARKER}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RelativeStdDevRepr {
    Value(f64),
    Marker(String),
}

impl From<RelativeStdDev> for RelativeStdDevRepr {
    fn from(value: RelativeStdDev) -> Self {
        match value {
            RelativeStdDev::Value(v) => RelativeStdDevRepr::Value(v),
            RelativeStdDev::Undefined => RelativeStdDevRepr::Marker(UNDEFINED_MARKER.to_string()),
        }
    }
}

impl TryFrom<RelativeStdDevRepr> for RelativeStdDev {
    type Error = String;

    fn try_from(value: RelativeStdDevRepr) -> Result<Self, Self::Error> {
        match value {
            RelativeStdDevRepr::Value(v) => Ok(RelativeStdDev::Value(v)),
            RelativeStdDevRepr::Marker(m) if m == UNDEFINED_MARKER => Ok(RelativeStdDev::Undefined),
            RelativeStdDevRepr::Marker(m) => Err(format!(
                "Expected a number or \"{UNDEFINED_MARKER}\" for relative_std_dev, got \"{m}\""
            )),
        }
    }
}

/// Rounded descriptive statistics for a single metric
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateRecord {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation, dividing by the number of samples
    pub standard_deviation: f64,
    /// Only present for metrics that are configured to report it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_std_dev: Option<RelativeStdDev>,
}

/// Summary of a CBench results file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsReport {
    /// The number of data rows that contributed to the metrics
    pub sample_size: usize,
    /// The number of data rows that were rejected because a field was missing or not numeric
    ///
    /// A header row is never counted here.
    pub invalid_rows: usize,
    /// Whether the first row of the file was detected as a header and skipped
    pub header: bool,
    /// Statistics keyed by metric name
    pub metrics: BTreeMap<String, AggregateRecord>,
}

impl ResultsReport {
    /// Create an empty report for the given row counts
    pub fn new(sample_size: usize, invalid_rows: usize, header: bool) -> Self {
        Self {
            sample_size,
            invalid_rows,
            header,
            metrics: BTreeMap::new(),
        }
    }

    /// Add the statistics for a metric, replacing any previous entry with the same name
    pub fn insert_metric(&mut self, name: impl Into<String>, record: AggregateRecord) {
        self.metrics.insert(name.into(), record);
    }

    /// The total number of data rows that were read, excluding any header
    pub fn total_rows(&self) -> usize {
        self.sample_size + self.invalid_rows
    }
}

/// Serialize the report to a writer as pretty printed JSON
pub fn store_results_report<W: Write>(report: &ResultsReport, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Load a report from a reader
pub fn load_results_report<R: Read>(reader: R) -> anyhow::Result<ResultsReport> {
    let reader = std::io::BufReader::new(reader);
    let report: ResultsReport = serde_json::from_reader(reader)?;
    Ok(report)
}
