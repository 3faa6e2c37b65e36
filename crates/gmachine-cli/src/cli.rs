use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a network over a file of samples and print the requested fields as JSON.
    Infer(commands::infer::InferArgs),
    /// Print the layers of a network with their inferred shapes.
    Describe(commands::describe::DescribeArgs),
}

pub fn run(args: CliArgs) -> anyhow::Result<()> {
    match args.command {
        Commands::Infer(infer_args) => commands::infer::handle_command(infer_args),
        Commands::Describe(describe_args) => commands::describe::handle_command(describe_args),
    }
}
