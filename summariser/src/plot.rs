use crate::extract::Extraction;
use crate::schema::MetricSpec;
use plotters::prelude::*;
use polars::prelude::PolarsResult;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Above this many stacked graphs the plots become hard to read.
const CROWDED_PLOT_COUNT: usize = 9;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("No series to plot")]
    Empty,
    #[error("Series `{name}` has {x_len} x values but {y_len} y values")]
    LengthMismatch {
        name: String,
        x_len: usize,
        y_len: usize,
    },
    #[error("Failed to draw plot to {}", .path.display())]
    Draw {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A single scatter series, one point per accepted row
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub name: String,
    pub x_label: String,
    pub y_label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Something that can present metric series, for example by drawing them to a file.
pub trait RenderSeries {
    fn render(&mut self, plots: &[PlotSeries]) -> Result<(), PlotError>;
}

/// Build one [PlotSeries] per metric.
///
/// The x axis is the run number when the schema has a run column, otherwise the 1-based position
/// of the accepted row.
pub fn plot_series(extraction: &Extraction, metrics: &[&MetricSpec]) -> PolarsResult<Vec<PlotSeries>> {
    let (x_label, x) = match extraction.run_numbers() {
        Some(runs) => ("Run Number", runs),
        None => (
            "Row",
            (1..=extraction.accepted()).map(|i| i as f64).collect(),
        ),
    };

    metrics
        .iter()
        .map(|metric| {
            Ok(PlotSeries {
                name: metric.name.clone(),
                x_label: x_label.to_string(),
                y_label: metric.label.clone(),
                x: x.clone(),
                y: extraction.values(&metric.name)?,
            })
        })
        .collect()
}

/// Vertical space between stacked plots, as a fraction of a single plot's height.
pub fn subplot_spacing(count: usize) -> f64 {
    match count {
        0..=3 => 0.2,
        4..=6 => 0.4,
        _ => 0.7,
    }
}

/// Draws all series as a vertical stack of scatter plots into an SVG file.
pub struct SvgRenderer {
    path: PathBuf,
    width: u32,
    plot_height: u32,
}

impl SvgRenderer {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            width: 800,
            plot_height: 300,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn draw(&self, plots: &[PlotSeries]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let height = self.plot_height * plots.len() as u32;
        let root = SVGBackend::new(&self.path, (self.width, height)).into_drawing_area();
        root.fill(&WHITE)?;

        let gap = (subplot_spacing(plots.len()) * self.plot_height as f64 / 2.0).round() as i32;
        for (area, plot) in root.split_evenly((plots.len(), 1)).iter().zip(plots) {
            let area = area.margin(gap, gap, 0, 0);
            let mut chart = ChartBuilder::on(&area)
                .caption(&plot.y_label, ("sans-serif", 18))
                .margin(10)
                .x_label_area_size(35)
                .y_label_area_size(70)
                .build_cartesian_2d(axis_range(&plot.x), axis_range(&plot.y))?;

            chart
                .configure_mesh()
                .x_desc(plot.x_label.as_str())
                .y_desc(plot.y_label.as_str())
                .draw()?;

            // Green circles, one per run
            chart.draw_series(
                plot.x
                    .iter()
                    .zip(plot.y.iter())
                    .map(|(x, y)| Circle::new((*x, *y), 3, GREEN.filled())),
            )?;
        }

        root.present()?;
        Ok(())
    }
}

impl RenderSeries for SvgRenderer {
    fn render(&mut self, plots: &[PlotSeries]) -> Result<(), PlotError> {
        if plots.is_empty() {
            return Err(PlotError::Empty);
        }
        if let Some(plot) = plots.iter().find(|p| p.x.len() != p.y.len()) {
            return Err(PlotError::LengthMismatch {
                name: plot.name.clone(),
                x_len: plot.x.len(),
                y_len: plot.y.len(),
            });
        }
        if plots.len() > CROWDED_PLOT_COUNT {
            log::warn!(
                "Drawing {} graphs in a single column, consider plotting fewer at a time",
                plots.len()
            );
        }

        self.draw(plots).map_err(|source| PlotError::Draw {
            path: self.path.clone(),
            source,
        })?;
        log::info!("Wrote {} graphs to {}", plots.len(), self.path.display());

        Ok(())
    }
}

/// Axis range covering all values with a little padding, never empty.
fn axis_range(values: &[f64]) -> Range<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });

    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    if min == max {
        return (min - 1.0)..(max + 1.0);
    }

    let pad = (max - min) * 0.05;
    (min - pad)..(max + pad)
}
