use std::process::ExitCode;

use canvas_lens::{cli, logger};
use clap::Parser;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::init(args.verbose);

    cli::run(args)
}
