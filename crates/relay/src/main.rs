//! Relay - message replication service
//!
//! Observes designated source conversations through one privileged listener
//! identity and re-publishes their messages into destination conversations
//! through a pool of sending identities, preserving formatting, media and
//! reply threads, and keeping edits and deletes in sync.

mod adapters;
mod cmd;
mod http;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Message replication service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the replication engine
    Serve(cmd::serve::ServeArgs),

    /// Write a commented default configuration file
    Init(cmd::init::InitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => cmd::serve::run(args).await,
        Commands::Init(args) => cmd::init::run(args),
    }
}
