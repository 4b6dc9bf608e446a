mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pubdrive")]
#[command(about = "Drive a local browser through its debugging protocol", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run environment diagnostics
    Doctor,

    /// Launch the browser on a URL, attach, and optionally wait for login
    Open {
        /// URL to open
        url: String,

        /// Profile name (one persistent profile per platform)
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Wait until this script predicate evaluates truthy (login check)
        #[arg(long)]
        wait_for: Option<String>,

        /// Keep the browser open after a successful run
        #[arg(long)]
        keep_open: bool,
    },

    /// Navigate to a URL and capture a screenshot
    Shot {
        /// URL to capture
        url: String,

        /// Profile name
        #[arg(short, long, default_value = "default")]
        profile: String,
    },

    /// List open page targets of a running browser
    Targets {
        /// Debugging port of the running browser
        #[arg(short, long)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Doctor => {
            commands::doctor::run().await?;
        }
        Commands::Open {
            url,
            profile,
            wait_for,
            keep_open,
        } => {
            commands::open::run(&url, &profile, wait_for.as_deref(), keep_open).await?;
        }
        Commands::Shot { url, profile } => {
            commands::shot::run(&url, &profile).await?;
        }
        Commands::Targets { port } => {
            commands::targets::run(port).await?;
        }
    }

    Ok(())
}
