use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::prewarm::METRIC_CACHE_PREWARM_MS;
use crate::cache::{
    METRIC_CACHE_BACKEND_ERROR_TOTAL, METRIC_CACHE_ENTRIES, METRIC_CACHE_EVICT_TOTAL,
    METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};
use crate::sql::METRIC_SQL_REWRITE_TOTAL;

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of entity cache hits, by region."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of entity cache misses, by region."
        );
        describe_counter!(
            METRIC_CACHE_EVICT_TOTAL,
            Unit::Count,
            "Total number of entries removed by expiry, capacity or invalidation."
        );
        describe_counter!(
            METRIC_CACHE_BACKEND_ERROR_TOTAL,
            Unit::Count,
            "Total number of failed cache backend calls."
        );
        describe_gauge!(
            METRIC_CACHE_ENTRIES,
            Unit::Count,
            "Current number of indexed cache entries."
        );
        describe_histogram!(
            METRIC_CACHE_PREWARM_MS,
            Unit::Milliseconds,
            "Metadata prewarm latency in milliseconds."
        );
        describe_counter!(
            METRIC_SQL_REWRITE_TOTAL,
            Unit::Count,
            "Outbound statements inspected by the relaxed-isolation rewriter, by outcome."
        );
    });
}
