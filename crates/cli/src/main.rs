//! Railchat CLI, the main entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP gateway (SSE chat endpoint)
//! - `chat`: Interactive or single-message chat in the terminal
//! - `tools`: List the tools the railway server exposes
//! - `init`: Write a default `railchat.toml`

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "railchat",
    about = "Railchat: Indian Railways assistant over MCP tools",
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
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the railway assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List available railway tools
    Tools,

    /// Write a default configuration file
    Init {
        /// Where to write the file
        #[arg(short, long, default_value = "railchat.toml")]
        path: std::path::PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Init { path, force } => commands::init::run(&path, force)?,
    }

    Ok(())
}
