use cbench_summariser::cli::SummariserCli;
use cbench_summariser::plot::SvgRenderer;
use clap::{CommandFactory, Parser};
use log::debug;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Print help if no arguments are given
    if std::env::args_os().len() <= 1 {
        SummariserCli::command().print_help()?;
        std::process::exit(1);
    }

    let cli = SummariserCli::parse();
    debug!(
        "Summarising {} with schema {}",
        cli.results.display(),
        cli.schema
    );

    let mut renderer = SvgRenderer::new(&cli.plot_output);
    let mut stdout = std::io::stdout().lock();
    cbench_summariser::execute_summary(&cli, &mut stdout, &mut renderer)?;

    Ok(())
}
