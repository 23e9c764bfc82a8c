//! Local-first synchronisation of entity collections.

mod collection;
mod outcome;
mod remote;

pub use collection::SyncedCollection;
pub use outcome::{LoadOutcome, LoadSource, MutationOutcome, MutationStatus, SyncStatus};
