mod cli;
mod commands;

use clap::Parser;

fn main() {
    env_logger::init();

    let args = cli::CliArgs::parse();
    if let Err(e) = cli::run(args) {
        log::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
