use clap::Parser;
use log::{error, info, warn};

mod cli;

use cli::Cli;
use neuroconnectivity::{BatchSummary, Pipeline, PipelineConfig, Result};

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.into_config().and_then(run) {
        Ok(summary) => {
            for skipped in summary.skipped.iter() {
                info!("Skipped subject {}, session {}: {}", skipped.subject, skipped.session, skipped.reason);
            }
            if summary.written.is_empty() {
                warn!("No correlation matrix was written");
            }
            println!("{}", summary);
            0
        },
        Err(e) => {
            error!("Cannot run the batch: {}", e);
            1
        },
    };

    std::process::exit(exit_code);
}

fn run(config: PipelineConfig) -> Result<BatchSummary> {
    info!("Writing correlation matrices to {}", config.output_dir.display());
    let pipeline = Pipeline::new(config)?;
    pipeline.run()
}
