use crate::commands;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the input and output tensors of a model as JSON.
    Describe(commands::describe::DescribeArgs),
    /// Run one inference pass on float32 values.
    Invoke(commands::invoke::InvokeArgs),
    /// Run many sequential inference passes and report the latency.
    Bench(commands::bench::BenchArgs),
}

pub fn cli_main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    match args.command {
        Commands::Describe(args) => commands::describe::handle_command(args),
        Commands::Invoke(args) => commands::invoke::handle_command(args),
        Commands::Bench(args) => commands::bench::handle_command(args),
    }
}
