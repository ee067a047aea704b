use cbench_summary_model::Rounding;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the frame column holding the run number, reserved from use as a metric name.
pub const RUN_COLUMN: &str = "run_number";

/// Decimal digits used for mean and standard deviation when a schema does not say otherwise.
pub const DEFAULT_PRECISION: u32 = 3;

/// Beyond this an `f64` no longer carries meaningful decimal digits.
pub const MAX_PRECISION: u32 = 15;

pub const CBENCH_V1: &str = "cbench-v1";
pub const CBENCH_V2: &str = "cbench-v2";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema `{schema}` does not define any metrics")]
    NoMetrics { schema: String },
    #[error("Schema `{schema}` defines metric `{metric}` more than once")]
    DuplicateMetric { schema: String, metric: String },
    #[error("Metric name `{metric}` is reserved")]
    ReservedName { metric: String },
    #[error("Precision of {precision} decimal digits is not supported, the maximum is {MAX_PRECISION}")]
    PrecisionTooLarge { precision: u32 },
    #[error(
        "Column index {index} for `{field}` is out of bounds, the sample row only has {width} fields"
    )]
    IndexOutOfBounds {
        field: String,
        index: usize,
        width: usize,
    },
    #[error("Unknown metric `{name}`, expected one of: {known}")]
    UnknownMetric { name: String, known: String },
    #[error("Failed to read schema file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse schema file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Where the value of a metric comes from in a row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// The raw value of a single column
    Column { index: usize },
    /// The value of the `end` column minus the value of the `start` column
    Delta { start: usize, end: usize },
}

impl MetricSource {
    /// The column indices this source reads.
    pub fn indices(&self) -> Vec<usize> {
        match self {
            MetricSource::Column { index } => vec![*index],
            MetricSource::Delta { start, end } => vec![*start, *end],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSpec {
    pub name: String,
    /// Human readable label, used as the axis label when plotting
    pub label: String,
    pub source: MetricSource,
    /// Rounding for min and max; falls back to the schema precision when not set
    #[serde(default)]
    pub extremes: Option<Rounding>,
    /// Whether the relative standard deviation is reported for this metric
    #[serde(default)]
    pub relative_std_dev: bool,
}

impl MetricSpec {
    fn new(name: &str, label: &str, source: MetricSource) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            source,
            extremes: None,
            relative_std_dev: false,
        }
    }

    fn with_extremes(mut self, rounding: Rounding) -> Self {
        self.extremes = Some(rounding);
        self
    }

    fn with_relative_std_dev(mut self) -> Self {
        self.relative_std_dev = true;
        self
    }
}

/// Describes the layout of a CBench results file and the metrics to compute from it.
///
/// Different versions of the benchmark harness write different columns, so every supported
/// layout is described by its own schema rather than by fixed column positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsSchema {
    pub name: String,
    /// Column holding the run number, used as the x axis when plotting
    #[serde(default)]
    pub run_index: Option<usize>,
    /// Decimal digits for mean, standard deviation and relative standard deviation
    #[serde(default = "default_precision")]
    pub precision: u32,
    pub metrics: Vec<MetricSpec>,
}

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

impl ResultsSchema {
    /// The layout written by the first version of the harness, run number and flows/sec only.
    pub fn cbench_v1() -> Self {
        Self {
            name: CBENCH_V1.to_string(),
            run_index: Some(0),
            precision: 0,
            metrics: vec![
                MetricSpec::new("flows", "Flows per Second", MetricSource::Column { index: 1 })
                    .with_extremes(Rounding::Integer)
                    .with_relative_std_dev(),
            ],
        }
    }

    /// The full layout, including timing, RAM, steal time, IO wait and load averages.
    pub fn cbench_v2() -> Self {
        Self {
            name: CBENCH_V2.to_string(),
            run_index: Some(0),
            precision: DEFAULT_PRECISION,
            metrics: vec![
                MetricSpec::new("flows", "Flows per Second", MetricSource::Column { index: 1 })
                    .with_extremes(Rounding::Integer)
                    .with_relative_std_dev(),
                MetricSpec::new(
                    "runtime",
                    "Runtime",
                    MetricSource::Delta { start: 2, end: 3 },
                ),
                MetricSpec::new(
                    "steal_time",
                    "CPU Steal Time",
                    MetricSource::Delta { start: 10, end: 11 },
                ),
                MetricSpec::new("ram", "Used RAM", MetricSource::Column { index: 13 })
                    .with_extremes(Rounding::Integer),
                MetricSpec::new("one_load", "One Minute Load", MetricSource::Column { index: 16 }),
                MetricSpec::new("five_load", "Five Minute Load", MetricSource::Column { index: 17 }),
                MetricSpec::new(
                    "fifteen_load",
                    "Fifteen Minute Load",
                    MetricSource::Column { index: 18 },
                ),
                MetricSpec::new(
                    "iowait",
                    "IO Wait",
                    MetricSource::Delta { start: 20, end: 21 },
                ),
            ],
        }
    }

    /// Look up one of the built in schemas by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            CBENCH_V1 => Some(Self::cbench_v1()),
            CBENCH_V2 => Some(Self::cbench_v2()),
            _ => None,
        }
    }

    /// Resolve a schema argument, either the name of a built in schema or a path to a TOML file.
    pub fn resolve(name_or_path: &str) -> Result<Self, SchemaError> {
        match Self::builtin(name_or_path) {
            Some(schema) => Ok(schema),
            None => Self::load(name_or_path),
        }
    }

    /// Load and validate a schema from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: ResultsSchema =
            toml::from_str(&content).map_err(|source| SchemaError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        schema.validate()?;

        Ok(schema)
    }

    /// Check the schema for problems that do not depend on the input file.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.metrics.is_empty() {
            return Err(SchemaError::NoMetrics {
                schema: self.name.clone(),
            });
        }

        if self.precision > MAX_PRECISION {
            return Err(SchemaError::PrecisionTooLarge {
                precision: self.precision,
            });
        }

        let mut seen = HashSet::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            if metric.name == RUN_COLUMN {
                return Err(SchemaError::ReservedName {
                    metric: metric.name.clone(),
                });
            }
            if !seen.insert(metric.name.as_str()) {
                return Err(SchemaError::DuplicateMetric {
                    schema: self.name.clone(),
                    metric: metric.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Check that every configured column exists in a sample row with `width` fields.
    pub fn validate_row(&self, width: usize) -> Result<(), SchemaError> {
        if let Some(index) = self.run_index {
            if index >= width {
                return Err(SchemaError::IndexOutOfBounds {
                    field: RUN_COLUMN.to_string(),
                    index,
                    width,
                });
            }
        }

        for metric in &self.metrics {
            if let Some(index) = metric.source.indices().into_iter().find(|i| *i >= width) {
                return Err(SchemaError::IndexOutOfBounds {
                    field: metric.name.clone(),
                    index,
                    width,
                });
            }
        }

        Ok(())
    }

    /// Every column index read by this schema, sorted and without duplicates.
    pub fn column_indices(&self) -> Vec<usize> {
        self.run_index
            .into_iter()
            .chain(self.metrics.iter().flat_map(|m| m.source.indices()))
            .sorted()
            .dedup()
            .collect()
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSpec> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    /// Look up the named metrics, preserving schema order and ignoring repeats.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&MetricSpec>, SchemaError> {
        for name in names {
            if self.metric(name.as_ref()).is_none() {
                return Err(SchemaError::UnknownMetric {
                    name: name.as_ref().to_string(),
                    known: self.metric_names().join(", "),
                });
            }
        }

        Ok(self
            .metrics
            .iter()
            .filter(|m| names.iter().any(|n| n.as_ref() == m.name))
            .collect())
    }

    /// Rounding applied to the min and max of a metric.
    pub fn extremes_rounding(&self, metric: &MetricSpec) -> Rounding {
        metric
            .extremes
            .unwrap_or(Rounding::Decimal(self.precision))
    }
}

impl Default for ResultsSchema {
    fn default() -> Self {
        Self::cbench_v2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUSTOM_SCHEMA: &str = r#"
name = "custom"
run_index = 0

[[metrics]]
name = "flows"
label = "Flows per Second"
source = { column = { index = 1 } }
extremes = "integer"
relative_std_dev = true

[[metrics]]
name = "runtime"
label = "Runtime"
source = { delta = { start = 2, end = 3 } }
extremes = { decimal = 2 }
"#;

    #[test]
    fn builtin_schemas_are_valid() -> anyhow::Result<()> {
        ResultsSchema::cbench_v1().validate()?;
        ResultsSchema::cbench_v2().validate()?;
        assert_eq!(ResultsSchema::default().name, CBENCH_V2);
        assert!(ResultsSchema::builtin("cbench-v3").is_none());
        assert_eq!(ResultsSchema::cbench_v1().precision, 0);
        assert_eq!(ResultsSchema::cbench_v2().precision, DEFAULT_PRECISION);
        Ok(())
    }

    #[test]
    fn v2_reads_expected_columns() {
        let schema = ResultsSchema::cbench_v2();
        assert_eq!(
            schema.column_indices(),
            vec![0, 1, 2, 3, 10, 11, 13, 16, 17, 18, 20, 21]
        );
        assert_eq!(
            schema.metric("iowait").map(|m| m.source),
            Some(MetricSource::Delta { start: 20, end: 21 })
        );
    }

    #[test]
    fn parse_custom_schema() -> anyhow::Result<()> {
        let schema: ResultsSchema = toml::from_str(CUSTOM_SCHEMA)?;
        schema.validate()?;

        assert_eq!(schema.precision, DEFAULT_PRECISION);
        assert_eq!(schema.metrics.len(), 2);
        assert_eq!(schema.metrics[0].extremes, Some(Rounding::Integer));
        assert!(schema.metrics[0].relative_std_dev);
        assert_eq!(
            schema.metrics[1].source,
            MetricSource::Delta { start: 2, end: 3 }
        );
        assert_eq!(
            schema.extremes_rounding(&schema.metrics[1]),
            Rounding::Decimal(2)
        );
        Ok(())
    }

    #[test]
    fn load_schema_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("schema.toml");
        std::fs::write(&path, CUSTOM_SCHEMA)?;

        let schema = ResultsSchema::resolve(path.to_str().expect("utf-8 path"))?;
        assert_eq!(schema.name, "custom");
        Ok(())
    }

    #[test]
    fn missing_schema_file_is_a_read_error() {
        let err = ResultsSchema::resolve("/does/not/exist.toml").unwrap_err();
        assert!(matches!(err, SchemaError::Read { .. }), "{err:?}");
    }

    #[test]
    fn reject_duplicate_metric() {
        let mut schema = ResultsSchema::cbench_v1();
        schema.metrics.push(schema.metrics[0].clone());
        let err = schema.validate().unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateMetric { .. }), "{err:?}");
    }

    #[test]
    fn reject_reserved_name_and_empty_metrics() {
        let mut schema = ResultsSchema::cbench_v1();
        schema.metrics[0].name = RUN_COLUMN.to_string();
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::ReservedName { .. })
        ));

        schema.metrics.clear();
        assert!(matches!(schema.validate(), Err(SchemaError::NoMetrics { .. })));
    }

    #[test]
    fn reject_large_precision() {
        let mut schema = ResultsSchema::cbench_v1();
        schema.precision = 16;
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::PrecisionTooLarge { precision: 16 })
        ));
    }

    #[test]
    fn validate_row_width() {
        let schema = ResultsSchema::cbench_v2();
        assert!(schema.validate_row(22).is_ok());

        match schema.validate_row(14) {
            Err(SchemaError::IndexOutOfBounds {
                field,
                index,
                width,
            }) => {
                assert_eq!(field, "one_load");
                assert_eq!(index, 16);
                assert_eq!(width, 14);
            }
            other => panic!("Expected out of bounds error, got {other:?}"),
        }

        assert!(matches!(
            schema.validate_row(0),
            Err(SchemaError::IndexOutOfBounds { ref field, .. }) if field == RUN_COLUMN
        ));
    }

    #[test]
    fn select_metrics_in_schema_order() -> anyhow::Result<()> {
        let schema = ResultsSchema::cbench_v2();
        let selected = schema.select(&["ram", "flows", "ram"])?;
        let names = selected.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["flows", "ram"]);

        let err = schema.select(&["disk"]).unwrap_err();
        assert!(err.to_string().contains("flows, runtime"), "{err}");
        Ok(())
    }
}
