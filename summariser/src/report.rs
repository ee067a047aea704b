use cbench_summary_model::{store_results_report, ResultsReport};
use std::io::Write;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// How a [ResultsReport] is written to the output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty printed JSON
    #[default]
    Json,
    /// One table row per metric
    Table,
}

#[derive(Tabled)]
pub struct MetricTableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Min")]
    pub min: f64,
    #[tabled(rename = "Max")]
    pub max: f64,
    #[tabled(rename = "Mean")]
    pub mean: f64,
    #[tabled(rename = "Std Dev")]
    pub standard_deviation: f64,
    #[tabled(rename = "Rel Std Dev (%)")]
    pub relative_std_dev: String,
}

pub fn table_rows(report: &ResultsReport) -> Vec<MetricTableRow> {
    report
        .metrics
        .iter()
        .map(|(name, record)| MetricTableRow {
            metric: name.clone(),
            min: record.min,
            max: record.max,
            mean: record.mean,
            standard_deviation: record.standard_deviation,
            relative_std_dev: record
                .relative_std_dev
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

/// Write the report in the requested format.
pub fn write_report<W: Write>(
    report: &ResultsReport,
    format: OutputFormat,
    writer: &mut W,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => store_results_report(report, writer)?,
        OutputFormat::Table => {
            let mut table = Table::new(table_rows(report));
            table.with(Style::modern());
            writeln!(writer, "{table}")?;
            writeln!(
                writer,
                "Sample size: {}, invalid rows: {}",
                report.sample_size, report.invalid_rows
            )?;
        }
    }

    Ok(())
}
