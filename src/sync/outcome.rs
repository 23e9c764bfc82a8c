use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::sync_errors::SyncWarning;

/// Where the collection contents came from after a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LoadSource {
    Remote,
    Cache,
    /// Remote failed and nothing was cached; the collection is empty.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LoadOutcome {
    pub source: LoadSource,
    pub count: usize,
    /// Rows dropped at the schema boundary or for belonging to another owner.
    pub rejected: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub warning: Option<SyncWarning>,
}

impl LoadOutcome {
    pub fn from_cache(&self) -> bool {
        self.source != LoadSource::Remote
    }
}

/// Per-entity remote state of the latest mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SyncStatus {
    AppliedLocally,
    Persisting,
    Persisted,
    /// Terminal for the mutation; only an explicit resync or reload changes it.
    PersistFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MutationStatus {
    Persisted,
    PersistFailed,
    /// Nothing to do: the id was not in the collection.
    NoOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome<T> {
    /// The entity as applied locally (or as removed, for deletes); `None` for no-ops.
    pub entity: Option<T>,
    pub status: MutationStatus,
    pub warnings: Vec<SyncWarning>,
}

impl<T> MutationOutcome<T> {
    pub(crate) fn no_op(warning: SyncWarning) -> Self {
        Self {
            entity: None,
            status: MutationStatus::NoOp,
            warnings: vec![warning],
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.status == MutationStatus::Persisted
    }

    pub fn is_no_op(&self) -> bool {
        self.status == MutationStatus::NoOp
    }

    pub fn has_warning(&self, code: crate::sync_errors::SyncErrorCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MutationOutcome<U> {
        MutationOutcome {
            entity: self.entity.map(f),
            status: self.status,
            warnings: self.warnings,
        }
    }
}
