use anyhow::Result;
use clap::Parser;
use radnet::{CLIArguments, alter_main, inspect_main};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = CLIArguments::parse();

    match args {
        CLIArguments::Inspect(args) => inspect_main(args),
        CLIArguments::Alter(args) => alter_main(args),
    }
}
