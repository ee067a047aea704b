use crate::cli::SummariserCli;
use crate::plot::RenderSeries;
use crate::schema::ResultsSchema;
use anyhow::Context;
use cbench_summary_model::ResultsReport;
use std::io::Write;

pub mod analyze;
pub mod cli;
pub mod extract;
pub mod plot;
pub mod report;
pub mod schema;

/// Run a full summary as requested on the command line.
///
/// Stats for the selected metrics are written to `writer` and the selected graphs are passed to
/// `renderer`. Returns the report if any stats were requested.
pub fn execute_summary<W, R>(
    cli: &SummariserCli,
    writer: &mut W,
    renderer: &mut R,
) -> anyhow::Result<Option<ResultsReport>>
where
    W: Write,
    R: RenderSeries + ?Sized,
{
    let schema = ResultsSchema::resolve(&cli.schema).context("Load results schema")?;
    schema.validate()?;
    log::debug!("Using schema {}", schema.name);

    let stat_names = cli.stat_names(&schema);
    let graph_names = cli.graph_names(&schema);
    let stats = schema.select(&stat_names)?;
    let graphs = schema.select(&graph_names)?;

    if stats.is_empty() && graphs.is_empty() {
        log::warn!("No stats or graphs selected, nothing to do");
        return Ok(None);
    }

    let extraction = extract::extract(&cli.results, &schema).context("Extract metric series")?;

    let report = if stats.is_empty() {
        None
    } else {
        let report =
            analyze::summarize(&extraction, &schema, &stats).context("Summarise results")?;
        report::write_report(&report, cli.format, writer).context("Write report")?;
        Some(report)
    };

    if !graphs.is_empty() {
        let plots = plot::plot_series(&extraction, &graphs).context("Collect graph series")?;
        renderer.render(&plots).context("Render graphs")?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::AnalyzeError;
    use crate::plot::{PlotError, PlotSeries};
    use clap::Parser;

    #[derive(Debug, Default)]
    struct RecordingRenderer {
        rendered: Vec<Vec<PlotSeries>>,
    }

    impl RenderSeries for RecordingRenderer {
        fn render(&mut self, plots: &[PlotSeries]) -> Result<(), PlotError> {
            self.rendered.push(plots.to_vec());
            Ok(())
        }
    }

    fn results_file(content: &str) -> anyhow::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(content.as_bytes())?;
        Ok(file)
    }

    fn parse_cli(args: &[&str]) -> anyhow::Result<SummariserCli> {
        Ok(SummariserCli::try_parse_from(
            std::iter::once("cbench-stats").chain(args.iter().copied()),
        )?)
    }

    #[test]
    fn stats_and_graphs() -> anyhow::Result<()> {
        let file = results_file("run,flow\n1,100\n2,abc\n3,200\n4,300\n")?;
        let path = file.path().to_str().expect("utf-8 path");
        let cli = parse_cli(&["-f", "-g", "flows", "-i", path, "--schema", "cbench-v1"])?;

        let mut out = Vec::new();
        let mut renderer = RecordingRenderer::default();
        let report = execute_summary(&cli, &mut out, &mut renderer)?.expect("report");

        assert_eq!(report.sample_size, 3);
        assert_eq!(report.invalid_rows, 1);
        assert_eq!(report.metrics["flows"].mean, 200.0);

        let printed = String::from_utf8(out)?;
        assert!(printed.contains("\"invalid_rows\": 1"), "{printed}");

        assert_eq!(renderer.rendered.len(), 1);
        assert_eq!(renderer.rendered[0][0].x, vec![1.0, 3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn graphs_only_prints_nothing() -> anyhow::Result<()> {
        let file = results_file("1,100\n2,200\n")?;
        let path = file.path().to_str().expect("utf-8 path");
        let cli = parse_cli(&["-A", "-i", path, "--schema", "cbench-v1"])?;

        let mut out = Vec::new();
        let mut renderer = RecordingRenderer::default();
        let report = execute_summary(&cli, &mut out, &mut renderer)?;

        assert!(report.is_none());
        assert!(out.is_empty());
        assert_eq!(renderer.rendered[0].len(), 1);
        Ok(())
    }

    #[test]
    fn nothing_selected_does_not_read_input() -> anyhow::Result<()> {
        let cli = parse_cli(&["-i", "/no/such/file.csv"])?;

        let mut renderer = RecordingRenderer::default();
        assert!(execute_summary(&cli, &mut Vec::new(), &mut renderer)?.is_none());
        assert!(renderer.rendered.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_metric_is_rejected() -> anyhow::Result<()> {
        let cli = parse_cli(&["--stats", "disk", "-i", "/no/such/file.csv"])?;

        let err = execute_summary(&cli, &mut Vec::new(), &mut RecordingRenderer::default())
            .unwrap_err();
        assert!(err.to_string().contains("Unknown metric `disk`"), "{err}");
        Ok(())
    }

    #[test]
    fn header_only_input_is_insufficient_data() -> anyhow::Result<()> {
        let file = results_file("run,flow\n")?;
        let path = file.path().to_str().expect("utf-8 path");
        let cli = parse_cli(&["-f", "-i", path, "--schema", "cbench-v1"])?;

        let err = execute_summary(&cli, &mut Vec::new(), &mut RecordingRenderer::default())
            .unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<AnalyzeError>(),
                Some(AnalyzeError::InsufficientData { .. })
            ),
            "{err:?}"
        );
        Ok(())
    }

    #[test]
    fn missing_results_file_names_the_path() -> anyhow::Result<()> {
        let cli = parse_cli(&["-f", "-i", "/no/such/results.csv"])?;

        let err = execute_summary(&cli, &mut Vec::new(), &mut RecordingRenderer::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("/no/such/results.csv"), "{err:#}");
        Ok(())
    }
}
