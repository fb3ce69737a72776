use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Not signed in. Run `tally login --user-id <ID>` first.")]
    NotSignedIn,
    #[error("Tournament not found for id/prefix: {0}")]
    TournamentNotFound(String),
    #[error("{0}")]
    AmbiguousTournamentId(String),
    #[error("Tournament name cannot be empty")]
    EmptyTournamentName,
}
