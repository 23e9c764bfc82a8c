use std::sync::Once;

use time::format_description::well_known::Rfc3339;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "QUADRANT_LOG";
pub const DEFAULT_FILTER: &str = "quadrant=info,sqlx=warn";

static INIT: Once = Once::new();

/// Install the JSON tracing subscriber and bridge `log` records into it.
///
/// Safe to call more than once; only the first call installs anything, and a
/// subscriber installed by the host application is left in place.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.into());
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .json()
            .with_target(true)
            .with_timer(UtcTime::new(Rfc3339))
            .with_writer(std::io::stderr)
            .finish();
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            let _ = tracing_log::LogTracer::init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging();
        init_logging();
        tracing::info!(target: "quadrant", event = "logging_test");
        log::info!(target: "quadrant", "bridged log record");
    }
}
