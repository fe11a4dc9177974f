use clap::{Parser, Subcommand};
use color_eyre::Result;

mod commands;
mod output;

#[derive(Parser, Debug)]
#[command(name = "gantry", version, about = "Run declarative release workflows locally")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a workflow against a release event
    Run(commands::run::RunArgs),
    /// Parse a workflow and check its job graph without executing
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
