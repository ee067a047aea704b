use crate::schema::{MetricSource, ResultsSchema, SchemaError, RUN_COLUMN};
use polars::prelude::{col, Column, DataFrame, Expr, IntoLazy, PolarsError, PolarsResult};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to open results file {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read results from {input}")]
    Csv {
        input: String,
        #[source]
        source: csv::Error,
    },
    #[error("Results from {input} do not match schema `{schema}`")]
    Schema {
        input: String,
        schema: String,
        #[source]
        source: SchemaError,
    },
    #[error("Failed to build the metric frame")]
    Frame(#[from] PolarsError),
}

/// The metric series read from a results file.
///
/// The frame has one `f64` column per schema metric, plus a [RUN_COLUMN] when the schema has a run
/// column. Every column has one value per accepted row.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub frame: DataFrame,
    /// The header row, if the first row of the input was detected as one
    pub header: Option<Vec<String>>,
    /// Data rows that were skipped because a field was missing or not numeric
    pub rejected: usize,
}

impl Extraction {
    /// Number of rows that contributed to the metric series.
    pub fn accepted(&self) -> usize {
        self.frame.height()
    }

    /// Total number of data rows read, header excluded.
    pub fn total_rows(&self) -> usize {
        self.accepted() + self.rejected
    }

    /// The values of the named metric, in file order.
    pub fn values(&self, name: &str) -> PolarsResult<Vec<f64>> {
        Ok(self.frame.column(name)?.f64()?.into_iter().flatten().collect())
    }

    /// The run numbers of the accepted rows, if the schema has a run column.
    pub fn run_numbers(&self) -> Option<Vec<f64>> {
        self.values(RUN_COLUMN).ok()
    }
}

/// Read a results file and extract the metric series described by `schema`.
pub fn extract(path: impl AsRef<Path>, schema: &ResultsSchema) -> Result<Extraction, ExtractError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    extract_from_reader(file, schema, &path.display().to_string())
}

/// Extract the metric series from any reader of comma separated values.
///
/// `input` names the source of the data in errors and logs.
pub fn extract_from_reader<R: Read>(
    reader: R,
    schema: &ResultsSchema,
    input: &str,
) -> Result<Extraction, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let schema_error = |source| ExtractError::Schema {
        input: input.to_string(),
        schema: schema.name.clone(),
        source,
    };

    let indices = schema.column_indices();
    let mut raw: BTreeMap<usize, Vec<f64>> = indices.iter().map(|i| (*i, Vec::new())).collect();
    let mut header: Option<Vec<String>> = None;
    let mut validated = false;
    let mut rejected = 0;

    for (position, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|source| ExtractError::Csv {
            input: input.to_string(),
            source,
        })?;

        if position == 0 && is_header(&record) {
            log::debug!("Skipping header row of {input}: {record:?}");
            header = Some(
                record
                    .iter()
                    .map(|field| String::from_utf8_lossy(field).into_owned())
                    .collect(),
            );
            continue;
        }

        if !validated {
            schema.validate_row(record.len()).map_err(schema_error)?;
            validated = true;
        }

        match parse_row(&record, &indices, schema) {
            Some(values) => {
                for (index, value) in indices.iter().zip(values) {
                    if let Some(column) = raw.get_mut(index) {
                        column.push(value);
                    }
                }
            }
            None => {
                log::trace!("Rejecting row {} of {input}: {record:?}", position + 1);
                rejected += 1;
            }
        }
    }

    // A file with only a header still has to match the schema.
    if !validated {
        if let Some(header) = &header {
            schema
                .validate_row(header.len())
                .map_err(schema_error)?;
        }
    }

    let frame = build_frame(raw, schema)?;
    log::debug!(
        "Extracted {} rows from {input}, rejected {rejected}",
        frame.height()
    );
    if rejected > 0 {
        log::warn!("Skipped {rejected} rows of {input} with missing or non-numeric fields");
    }

    Ok(Extraction {
        frame,
        header,
        rejected,
    })
}

/// The first row is a header when its first field is not a number.
fn is_header(record: &csv::ByteRecord) -> bool {
    record
        .get(0)
        .map(|field| parse_number(field).is_none())
        .unwrap_or(true)
}

fn parse_number(field: &[u8]) -> Option<f64> {
    std::str::from_utf8(field).ok()?.parse::<f64>().ok()
}

/// Parse all the given fields of a row, or nothing if any of them is missing or not a finite number.
///
/// `indices` must be sorted. Rows whose derived deltas overflow are rejected as well.
fn parse_row(
    record: &csv::ByteRecord,
    indices: &[usize],
    schema: &ResultsSchema,
) -> Option<Vec<f64>> {
    let values = indices
        .iter()
        .map(|index| {
            record
                .get(*index)
                .and_then(parse_number)
                .filter(|value| value.is_finite())
        })
        .collect::<Option<Vec<f64>>>()?;

    let value_at = |index: usize| {
        indices
            .binary_search(&index)
            .ok()
            .map(|position| values[position])
    };
    let deltas_finite = schema.metrics.iter().all(|metric| match metric.source {
        MetricSource::Column { .. } => true,
        MetricSource::Delta { start, end } => match (value_at(start), value_at(end)) {
            (Some(start), Some(end)) => (end - start).is_finite(),
            _ => false,
        },
    });

    deltas_finite.then_some(values)
}

fn raw_column_name(index: usize) -> String {
    format!("column_{index}")
}

fn metric_expr(source: &MetricSource) -> Expr {
    match source {
        MetricSource::Column { index } => col(raw_column_name(*index)),
        MetricSource::Delta { start, end } => {
            col(raw_column_name(*end)) - col(raw_column_name(*start))
        }
    }
}

fn build_frame(
    raw: BTreeMap<usize, Vec<f64>>,
    schema: &ResultsSchema,
) -> Result<DataFrame, ExtractError> {
    let columns = raw
        .into_iter()
        .map(|(index, values)| Column::new(raw_column_name(index).into(), values))
        .collect::<Vec<_>>();
    let raw_frame = DataFrame::new(columns)?;

    let mut exprs = Vec::with_capacity(schema.metrics.len() + 1);
    if let Some(index) = schema.run_index {
        exprs.push(col(raw_column_name(index)).alias(RUN_COLUMN));
    }
    for metric in &schema.metrics {
        exprs.push(metric_expr(&metric.source).alias(metric.name.as_str()));
    }

    Ok(raw_frame.lazy().select(exprs).collect()?)
}
