//! tally-core - Core library for Tally
//!
//! This crate contains the shared models, local store, and sync engine used
//! by all Tally interfaces. The engine is offline-first: every mutation lands
//! in the local store immediately and replicates to the remote document store
//! when a user is signed in, with last-writer-wins conflict resolution at
//! entity granularity.

pub mod auth;
pub mod clock;
pub mod error;
pub mod models;
pub mod remote;
pub mod status;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{GameSession, Snapshot, Tournament};
pub use status::{SyncStatus, SyncStatusTracker};
pub use store::LocalStore;
pub use sync::SyncOrchestrator;
