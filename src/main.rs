//! Command line batch solver.
//!
//! ```text
//! u-darpt <start> <end> <iterations>
//! ```
//!
//! Instances are read from the file named by `DARPT_INSTANCES`
//! (default `instances.csv`). Every instance with index in `start..end` is
//! solved; one JSON report per line goes to stdout, logs go to stderr.
//! Each instance's random stream depends only on its index, so repeating a
//! command repeats its results.

use std::io::{stdout, BufWriter, Write};
use std::process;

use clap::{value_parser, Arg, Command};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use u_darpt::alns::AlnsConfig;
use u_darpt::batch::run_batch;
use u_darpt::io::read_instances;

const INSTANCES_VAR: &str = "DARPT_INSTANCES";
const DEFAULT_INSTANCES: &str = "instances.csv";

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn cli() -> Command {
    Command::new("u-darpt")
        .about("Dial-a-ride with transfers: batch ALNS solver")
        .arg(
            Arg::new("start")
                .help("First instance index (inclusive)")
                .required(true)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("end")
                .help("Last instance index (exclusive)")
                .required(true)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("iterations")
                .help("ALNS iterations per instance")
                .required(true)
                .value_parser(value_parser!(usize)),
        )
}

fn main() {
    enable_tracing();
    let matches = cli().get_matches();
    let start = matches.get_one::<usize>("start").copied().unwrap_or_default();
    let end = matches.get_one::<usize>("end").copied().unwrap_or_default();
    let iterations = matches.get_one::<usize>("iterations").copied().unwrap_or_default();

    let config = AlnsConfig::default().with_max_iterations(iterations);

    let path = std::env::var(INSTANCES_VAR).unwrap_or_else(|_| DEFAULT_INSTANCES.to_string());
    let instances = read_instances(&path).unwrap_or_else(|e| {
        error!(path = %path, error = %e, "cannot read instances");
        process::exit(1);
    });
    info!(path = %path, count = instances.len(), "loaded instances");

    let reports = run_batch(&instances, start, end, &config).unwrap_or_else(|e| {
        error!(error = %e, "batch aborted");
        process::exit(1);
    });

    let mut out = BufWriter::new(stdout().lock());
    for report in &reports {
        let written = serde_json::to_writer(&mut out, report)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out));
        if let Err(e) = written {
            error!(error = %e, "cannot write report");
            process::exit(1);
        }
    }
    if let Err(e) = out.flush() {
        error!(error = %e, "cannot write report");
        process::exit(1);
    }
}
