//! Aviary Command-Line Interface
//!
//! A terminal client for the log-signaled calling core: send and read
//! chat messages backed by the local message log, and run complete call
//! flows (both ends in-process) to exercise the signaling path.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

/// Aviary - peer-to-peer calls signaled through the chat log
#[derive(Parser)]
#[command(name = "aviary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Data directory path
    #[arg(short, long, default_value = "~/.aviary")]
    data_dir: String,

    /// Local identity (an email-style handle)
    #[arg(short, long, default_value = "me@localhost")]
    identity: String,

    #[command(subcommand)]
    command: Commands,
}

/// Requested call media mode.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Voice only
    Audio,
    /// Camera plus voice
    Video,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a chat message
    Send {
        /// Recipient's handle
        peer: String,

        /// Message text
        message: String,
    },

    /// Show chat history with a peer
    History {
        /// Peer's handle
        peer: String,

        /// Number of messages to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Run a full call flow against a simulated far side
    Call {
        /// Peer's handle
        peer: String,

        /// Media mode to request
        #[arg(short, long, value_enum, default_value = "audio")]
        mode: Mode,

        /// Have the far side decline instead of answering
        #[arg(long)]
        decline: bool,
    },

    /// Ring yourself through the log echo and connect locally
    SelfCall,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Expand data directory
    let data_dir = shellexpand::tilde(&cli.data_dir).to_string();

    match cli.command {
        Commands::Send { peer, message } => {
            commands::send(&data_dir, &cli.identity, &peer, &message)?;
        }
        Commands::History { peer, limit } => {
            commands::history(&data_dir, &cli.identity, &peer, limit)?;
        }
        Commands::Call {
            peer,
            mode,
            decline,
        } => {
            let mode = match mode {
                Mode::Audio => aviary_core::call::MediaMode::Audio,
                Mode::Video => aviary_core::call::MediaMode::Video,
            };
            commands::call(&cli.identity, &peer, mode, decline).await?;
        }
        Commands::SelfCall => {
            commands::self_call(&cli.identity).await?;
        }
    }

    Ok(())
}
