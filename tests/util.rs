#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::NaiveDate;
use quadrant_lib::config::RetryPolicy;
use quadrant_lib::store::Row;
use quadrant_lib::{LocalCache, MemoryStore, SyncConfig};
use serde_json::Value;

/// Config with a short timeout and no retries so failure paths stay fast.
pub fn fast_config() -> Arc<SyncConfig> {
    Arc::new(SyncConfig {
        remote_timeout_ms: 500,
        retry: RetryPolicy::none(),
        timezone: Some("UTC".into()),
        ..SyncConfig::default()
    })
}

pub fn memory_fixture() -> (Arc<MemoryStore>, LocalCache, Arc<SyncConfig>) {
    (
        Arc::new(MemoryStore::new()),
        LocalCache::in_memory(),
        fast_config(),
    )
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row literal must be an object")
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}
