mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use settings::{Globals, Overrides};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "copylink",
    about = "Provision trading accounts and link them to copy-trading strategies",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file
    #[arg(long, global = true, env = "COPYLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Port to listen on (0 = OS-assigned; default from config)
        #[arg(long, env = "COPYLINK_PORT")]
        port: Option<u16>,
    },

    /// Poll an account until it is deployed and connected
    Wait {
        account_id: String,

        /// Give up after this many seconds (default from config)
        #[arg(long)]
        max_wait: Option<u64>,

        /// Milliseconds between polls (default from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show an account's current state
    Status { account_id: String },

    /// Inspect and validate the resolved configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let globals = Globals {
        config_path: cli.config,
        overrides: cli.overrides,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&globals, port),
        Commands::Wait {
            account_id,
            max_wait,
            interval,
        } => cmd::wait::run(&globals, &account_id, max_wait, interval),
        Commands::Status { account_id } => cmd::status::run(&globals, &account_id),
        Commands::Config { subcommand } => cmd::config::run(&globals, subcommand),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
