//! Shared domain models

mod profile;
mod session;
mod shelf;
mod snapshot;
mod tournament;

pub use profile::{AccountTier, UserProfile};
pub use session::{
    GameSession, Participant, Placement, ResultsMode, ScoringRules, SessionResults, SessionStatus,
};
pub use shelf::{GameShelf, ShelfLayout, ShelfSlot};
pub use snapshot::Snapshot;
pub use tournament::{
    BracketConfig, MemberRole, Player, Tournament, TournamentFormat, TournamentState,
};
