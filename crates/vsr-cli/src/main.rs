mod cli;
mod cmd;
mod signal;

use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // Launcher output defaults to info
    let filter = match cli.verbose {
        0 if matches!(cli.command, Commands::Run) => "info",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Split { input, output } => cmd::split::run_split(input, output),
        Commands::Combine { input, output } => cmd::combine::run_combine(input, output),
        Commands::Run => cmd::run::run_launcher(cli.config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
