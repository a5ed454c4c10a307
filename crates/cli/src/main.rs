//! codeloop CLI: the main entry point.
//!
//! Commands:
//! - `ask`: Run one prompt and stream the answer
//! - `chat`: Read prompts from stdin, continuing one conversation
//! - `tools`: Print the built-in tool catalogue
//! - `init`: Write the default config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "codeloop",
    about = "codeloop — a tool-using coding agent for the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project directory the agent works in (default: current directory)
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The prompt; multiple words are joined with spaces
        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// Interactive conversation on stdin
    Chat,

    /// List the registered tools
    Tools {
        /// Print the full definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so answers on stdout stay clean.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Ask { prompt } => commands::ask::run(prompt.join(" "), dir).await?,
        Commands::Chat => commands::chat::run(dir).await?,
        Commands::Tools { json } => commands::tools::run(dir, json)?,
        Commands::Init { force } => commands::init::run(force)?,
    }

    Ok(())
}
