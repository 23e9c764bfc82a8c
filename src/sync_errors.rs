use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::AppError;

/// Stable taxonomy of sync error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum SyncErrorCode {
    /// Remote fetch failed during load; the collection fell back to the local cache.
    FetchFailed,
    /// A mutation was applied locally but the remote call failed.
    PersistFailed,
    /// The referenced entity id is not present in the in-memory collection.
    NotFound,
    /// Caller-supplied data failed validation before any state change.
    ValidationFailed,
    /// A best-effort delete of a linked entity failed.
    CascadeFailed,
}

impl SyncErrorCode {
    /// Returns the stable machine-readable code string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncErrorCode::FetchFailed => "SYNC/FETCH_FAILED",
            SyncErrorCode::PersistFailed => "SYNC/PERSIST_FAILED",
            SyncErrorCode::NotFound => "SYNC/NOT_FOUND",
            SyncErrorCode::ValidationFailed => "SYNC/VALIDATION_FAILED",
            SyncErrorCode::CascadeFailed => "SYNC/CASCADE_FAILED",
        }
    }

    /// Returns the canonical developer-facing message associated with the code.
    #[must_use]
    pub fn developer_message(self) -> &'static str {
        match self {
            SyncErrorCode::FetchFailed => "Remote store unreachable during load.",
            SyncErrorCode::PersistFailed => "Remote persist failed after local apply.",
            SyncErrorCode::NotFound => "Entity id not present in the collection.",
            SyncErrorCode::ValidationFailed => "Entity failed validation.",
            SyncErrorCode::CascadeFailed => "Linked entity could not be deleted remotely.",
        }
    }

    /// Short toast text shown to the user.
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            SyncErrorCode::FetchFailed => "Offline: using cached data.",
            SyncErrorCode::PersistFailed => "Not synced: this change may be lost on refresh.",
            SyncErrorCode::NotFound => "That item no longer exists.",
            SyncErrorCode::ValidationFailed => "Please check the highlighted fields.",
            SyncErrorCode::CascadeFailed => "A linked item could not be removed.",
        }
    }

    /// Parses a stable code string back into the taxonomy.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        [
            SyncErrorCode::FetchFailed,
            SyncErrorCode::PersistFailed,
            SyncErrorCode::NotFound,
            SyncErrorCode::ValidationFailed,
            SyncErrorCode::CascadeFailed,
        ]
        .into_iter()
        .find(|candidate| candidate.as_str() == code)
    }

    /// Convenience helper to create an [`AppError`] with this taxonomy entry.
    #[must_use]
    pub fn into_error(self) -> AppError {
        AppError::new(self.as_str(), self.developer_message())
    }
}

/// Non-blocking notice produced by a sync operation.
///
/// Warnings never interrupt the caller; views render them as transient toasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncWarning {
    pub code: SyncErrorCode,
    pub message: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub detail: Option<String>,
}

impl SyncWarning {
    pub fn new(code: SyncErrorCode, table: impl Into<String>) -> Self {
        Self {
            code,
            message: code.user_message().to_string(),
            table: table.into(),
            entity_id: None,
            detail: None,
        }
    }

    pub fn for_entity(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Attach the underlying failure for diagnostics.
    pub fn caused_by(mut self, err: &AppError) -> Self {
        self.detail = Some(err.to_string());
        self
    }
}

/// Build a validation error for a single field.
pub fn validation_error(field: &str, message: impl Into<String>) -> AppError {
    AppError::new(SyncErrorCode::ValidationFailed.as_str(), message).with_context("field", field)
}

/// Returns true when the error belongs to the validation taxonomy entry.
pub fn is_validation_error(err: &AppError) -> bool {
    err.code() == SyncErrorCode::ValidationFailed.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_strings() {
        for code in [
            SyncErrorCode::FetchFailed,
            SyncErrorCode::PersistFailed,
            SyncErrorCode::NotFound,
            SyncErrorCode::ValidationFailed,
            SyncErrorCode::CascadeFailed,
        ] {
            assert_eq!(SyncErrorCode::from_code(code.as_str()), Some(code));
        }
        assert_eq!(SyncErrorCode::from_code("SYNC/OTHER"), None);
    }

    #[test]
    fn warning_carries_user_message_and_detail() {
        let err = AppError::new("STORE/OFFLINE", "remote store offline");
        let warning = SyncWarning::new(SyncErrorCode::PersistFailed, "tasks")
            .for_entity("t1")
            .caused_by(&err);
        assert_eq!(warning.message, SyncErrorCode::PersistFailed.user_message());
        assert_eq!(warning.entity_id.as_deref(), Some("t1"));
        assert!(warning.detail.unwrap().contains("STORE/OFFLINE"));
    }

    #[test]
    fn validation_error_is_tagged() {
        let err = validation_error("title", "Title is required");
        assert!(is_validation_error(&err));
        assert_eq!(err.context().get("field").map(String::as_str), Some("title"));
    }

    #[test]
    fn code_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&SyncErrorCode::FetchFailed).unwrap();
        assert_eq!(json, "\"FETCH_FAILED\"");
    }
}
