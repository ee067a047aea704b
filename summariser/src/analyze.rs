use crate::extract::Extraction;
use crate::schema::{MetricSpec, ResultsSchema};
use cbench_summary_model::{round_to, AggregateRecord, RelativeStdDev, ResultsReport};
use polars::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Insufficient data for metric `{metric}`, no rows were accepted")]
    InsufficientData { metric: String },
    #[error("Could not compute the {statistic} of metric `{metric}`")]
    Statistic {
        metric: String,
        statistic: &'static str,
    },
    #[error(transparent)]
    Frame(#[from] PolarsError),
}

/// Unrounded descriptive statistics of a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

pub(crate) fn series_stats(frame: &DataFrame, column: &str) -> Result<SeriesStats, AnalyzeError> {
    let value_series = frame.column(column)?.as_materialized_series();
    if value_series.len() == 0 {
        return Err(AnalyzeError::InsufficientData {
            metric: column.to_string(),
        });
    }

    let missing = |statistic| AnalyzeError::Statistic {
        metric: column.to_string(),
        statistic,
    };

    let min = value_series.min::<f64>()?.ok_or_else(|| missing("min"))?;
    let max = value_series.max::<f64>()?.ok_or_else(|| missing("max"))?;
    // Summation error can put the mean of a near constant series just outside its range.
    let mean = value_series
        .mean()
        .ok_or_else(|| missing("mean"))?
        .clamp(min, max);
    let std = value_series.std(0).ok_or_else(|| missing("standard deviation"))?;

    Ok(SeriesStats {
        count: value_series.len(),
        min,
        max,
        mean,
        std,
    })
}

/// `stddev / mean * 100`, or [RelativeStdDev::Undefined] when the mean is zero.
pub fn relative_std_dev(std: f64, mean: f64, precision: u32) -> RelativeStdDev {
    if mean == 0.0 {
        return RelativeStdDev::Undefined;
    }

    let ratio = std / mean * 100.0;
    if ratio.is_finite() {
        RelativeStdDev::Value(round_to(ratio, precision))
    } else {
        RelativeStdDev::Undefined
    }
}

/// Compute the rounded [AggregateRecord] of one metric.
pub fn aggregate_metric(
    frame: &DataFrame,
    metric: &MetricSpec,
    schema: &ResultsSchema,
) -> Result<AggregateRecord, AnalyzeError> {
    let stats = series_stats(frame, &metric.name)?;
    log::trace!("Raw stats for {}: {stats:?}", metric.name);

    let extremes = schema.extremes_rounding(metric);

    Ok(AggregateRecord {
        min: extremes.apply(stats.min),
        max: extremes.apply(stats.max),
        mean: round_to(stats.mean, schema.precision),
        standard_deviation: round_to(stats.std, schema.precision),
        relative_std_dev: metric
            .relative_std_dev
            .then(|| relative_std_dev(stats.std, stats.mean, schema.precision)),
    })
}

/// Summarise the selected metrics of an extraction into a [ResultsReport].
pub fn summarize(
    extraction: &Extraction,
    schema: &ResultsSchema,
    selection: &[&MetricSpec],
) -> Result<ResultsReport, AnalyzeError> {
    let mut report = ResultsReport::new(
        extraction.accepted(),
        extraction.rejected,
        extraction.header.is_some(),
    );

    for metric in selection {
        log::debug!("Aggregating {}", metric.name);
        report.insert_metric(
            metric.name.clone(),
            aggregate_metric(&extraction.frame, metric, schema)?,
        );
    }

    Ok(report)
}
