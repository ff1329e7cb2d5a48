use clap::{Parser, Subcommand};

mod commands;

use commands::{CheckConfigArgs, LadderArgs, RunArgs};

#[derive(Parser)]
#[command(name = "ratio-spread")]
#[command(about = "Weekly NIFTY 1:3:2 ratio call spread", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the strategy against the paper broker
    Run(RunArgs),
    /// Load and validate a config file, then print it
    CheckConfig(CheckConfigArgs),
    /// Print the strike ladder for a given spot and date
    Ladder(LadderArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    match &cli.command {
        Commands::Run(RunArgs {
            log_file: Some(path),
            ..
        }) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
        }
    }

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::CheckConfig(args) => commands::check_config::run(&args)?,
        Commands::Ladder(args) => commands::ladder::run(&args)?,
    }

    Ok(())
}
