use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Scores queued moderation events and records them for audit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept queue deliveries over HTTP (`POST /invoke`)
    Serve {
        /// Overrides SERVER_API_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Process a single delivery envelope and print the invocation result
    Process {
        /// Path to the delivery JSON; reads stdin when omitted
        input: Option<PathBuf>,
    },
}
