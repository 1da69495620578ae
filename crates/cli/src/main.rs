//! The tenax binary entry point.
//!
//! Commands:
//! - `serve`: start the HTTP invocation endpoint
//! - `invoke`: run a single prompt and print the result

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tenax",
    about = "Resilient web-search agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP invocation endpoint
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a single prompt and print the result
    Invoke {
        /// The prompt to send to the agent
        prompt: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Invoke { prompt } => commands::invoke::run(prompt).await?,
    }

    Ok(())
}
