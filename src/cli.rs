//! CLI argument parsing for linkrtt

use crate::run::RunOptions;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "linkrtt")]
#[command(version)]
#[command(
    about = "Measure round-trip times between data centers and report deviations from a baseline",
    long_about = None
)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short = 'f', long = "file", value_name = "CONFIG")]
    pub config: PathBuf,

    /// Probe all pairs and write the result as the new baseline, without reporting
    #[arg(short = 'g', long = "gen-reference")]
    pub gen_reference: bool,

    /// Print every probed pair and log progress
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable trace-level logging to stderr
    #[arg(long)]
    pub debug: bool,

    /// Also write the HTML report to this file
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Never send the report by mail
    #[arg(long = "no-mail")]
    pub no_mail: bool,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            gen_reference: self.gen_reference,
            verbose: self.verbose,
        }
    }

    /// Default log level when `RUST_LOG` is not set
    pub fn log_level(&self) -> tracing::Level {
        if self.debug {
            tracing::Level::TRACE
        } else if self.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}
