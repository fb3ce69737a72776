use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Track board-game tournaments and sessions from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the app data directory
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Optional path to the shared remote store file
    #[arg(long, global = true, value_name = "PATH")]
    pub remote_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and run a full sync
    Login {
        /// Account id to sign in as
        #[arg(long, value_name = "ID")]
        user_id: String,
        /// Display name shown to other members
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },
    /// Sign out and clear local data
    Logout,
    /// Show the signed-in account
    Whoami,
    /// List tournaments
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one tournament with its sessions and standings
    Show {
        /// Tournament id (or unique prefix)
        id: String,
    },
    /// Create a tournament
    Create {
        /// Tournament name
        name: String,
    },
    /// Record a completed game session
    Record {
        /// Game name
        #[arg(long, value_name = "NAME")]
        game: String,
        /// Parent tournament id (or unique prefix)
        #[arg(long, value_name = "ID")]
        tournament: Option<String>,
        /// Participant names, in finishing order (winner first)
        #[arg(long = "player", value_name = "NAME", required = true)]
        players: Vec<String>,
        /// Scoring preset used to award points per finishing position
        #[arg(long, value_enum, default_value = "standard")]
        preset: ScoringPreset,
    },
    /// Run a full sync for the signed-in account
    Sync,
    /// Show sync status and local data counts
    Status,
}

/// Scoring preset selectable when recording a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScoringPreset {
    /// 4/3/2/1 points down the finishing order
    Standard,
    /// A single point for first place, nothing below
    WinnerTakesAll,
}
