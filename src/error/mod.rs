use std::any::Any;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Error surfaced by stores, collections and the cache boundary.
///
/// `code` is a stable `AREA/REASON` string (`STORE/TIMEOUT`,
/// `SYNC/VALIDATION_FAILED`, `SQLX/DATABASE`, ...) views can match on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AppError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[ts(type = "Record<string, string>")]
    pub context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";
    /// Raised when a store implementation panics mid-call.
    pub const PANIC_CODE: &'static str = "RUNTIME/PANIC";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            cause: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    /// Attach a key/value pair; later values for the same key win.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.context.is_empty() {
            let pairs: Vec<String> = self
                .context
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, " ({})", pairs.join(", "))?;
        }
        Ok(())
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        fn walk(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }
            let mut node = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            node.cause = err.source().map(|source| Box::new(walk(source)));
            node
        }
        walk(error.as_ref())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        let app = AppError::new(format!("IO/{:?}", error.kind()), error.to_string());
        match error.raw_os_error() {
            Some(os_code) => app.with_context("os_code", os_code.to_string()),
            None => app,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        use serde_json::error::Category;
        let code = match error.classify() {
            Category::Data => "JSON/DATA",
            Category::Syntax => "JSON/SYNTAX",
            Category::Eof => "JSON/EOF",
            Category::Io => "JSON/IO",
        };
        let mut app = AppError::new(code, error.to_string());
        if error.line() > 0 {
            app = app
                .with_context("line", error.line().to_string())
                .with_context("column", error.column().to_string());
        }
        app
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        use sqlx::Error as E;
        match error {
            E::PoolTimedOut => AppError::new("SQLX/POOL_TIMEOUT", "timed out acquiring a connection"),
            E::PoolClosed => AppError::new("SQLX/POOL_CLOSED", "store is closed"),
            E::Io(err) => AppError::from(err).with_context("source", "sqlx"),
            E::Database(db) => {
                let code = db
                    .code()
                    .map(|code| format!("SQLX/DATABASE/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let app = AppError::new(code, db.message().to_string());
                match db.constraint() {
                    Some(constraint) => app.with_context("constraint", constraint.to_string()),
                    None => app,
                }
            }
            E::ColumnDecode { index, source } => AppError::new("SQLX/COLUMN_DECODE", source.to_string())
                .with_context("column", index),
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}

/// Printable message for a caught panic.
pub fn panic_payload(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
