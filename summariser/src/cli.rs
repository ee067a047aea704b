use crate::report::OutputFormat;
use crate::schema::{ResultsSchema, CBENCH_V2};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Compute stats about CBench data", long_about = None)]
pub struct SummariserCli {
    /// Compute flows/sec stats
    #[clap(short, long)]
    pub flows: bool,

    /// Compute used RAM stats
    #[clap(short, long)]
    pub ram: bool,

    /// Compute runtime stats
    #[clap(long)]
    pub runtime: bool,

    /// Compute stats for the given metrics of the schema, for example `--stats steal_time iowait`
    #[clap(short, long, num_args = 1..)]
    pub stats: Vec<String>,

    /// Compute all stats
    #[clap(short, long, visible_alias = "all-stats")]
    pub all: bool,

    /// Graph the given metrics
    #[clap(short, long, num_args = 1..)]
    pub graphs: Vec<String>,

    /// Graph all metrics
    #[clap(short = 'A', long)]
    pub all_graphs: bool,

    /// Path to the CBench results file
    #[clap(short = 'i', long, default_value = "results.csv")]
    pub results: PathBuf,

    /// Layout of the results file, either a built in schema (`cbench-v1`, `cbench-v2`) or the path
    /// to a TOML schema file
    #[clap(long, default_value = CBENCH_V2)]
    pub schema: String,

    /// How to print the computed stats
    #[clap(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// File to draw graphs to
    #[clap(short = 'o', long, default_value = "cbench-graphs.svg")]
    pub plot_output: PathBuf,
}

impl SummariserCli {
    /// Names of the metrics to compute stats for.
    pub fn stat_names(&self, schema: &ResultsSchema) -> Vec<String> {
        if self.all {
            return all_names(schema);
        }

        let mut names = self.stats.clone();
        for (selected, name) in [
            (self.flows, "flows"),
            (self.ram, "ram"),
            (self.runtime, "runtime"),
        ] {
            if selected {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Names of the metrics to graph.
    pub fn graph_names(&self, schema: &ResultsSchema) -> Vec<String> {
        if self.all_graphs {
            all_names(schema)
        } else {
            self.graphs.clone()
        }
    }
}

fn all_names(schema: &ResultsSchema) -> Vec<String> {
    schema.metric_names().into_iter().map(str::to_string).collect()
}
