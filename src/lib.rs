//! Local-first synchronisation core for a quadrant-based productivity planner.
//!
//! Views talk to [`SyncedCollection`] (or the [`RitualTracker`] and
//! [`WeeklyPlanner`] compositions); the collections apply changes locally,
//! snapshot them into a [`LocalCache`] and persist them through a
//! [`RemoteStore`].

pub mod cache;
pub mod config;
pub mod db;
mod error;
pub mod id;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod planner;
pub mod rituals;
pub mod store;
pub mod streaks;
pub mod sync;
pub mod sync_errors;
pub mod time;
pub mod util;

pub use cache::{CacheScope, LocalCache};
pub use config::SyncConfig;
pub use error::{AppError, AppResult};
pub use logging::init_logging;
pub use planner::WeeklyPlanner;
pub use rituals::RitualTracker;
pub use store::{MemoryStore, RemoteStore, SqliteStore};
pub use streaks::StreakStats;
pub use sync::{LoadOutcome, LoadSource, MutationOutcome, MutationStatus, SyncStatus, SyncedCollection};
pub use sync_errors::{SyncErrorCode, SyncWarning};
