use std::process::ExitCode;

use clap::Parser;

use batchpix::cli;
use batchpix::logger;

fn main() -> ExitCode {
    logger::init();
    let args = cli::CliArgs::parse();
    cli::run(args)
}
