use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_FETCH_CANCELLED, METRIC_MUTATION_COMMITTED,
    METRIC_MUTATION_MS, METRIC_MUTATION_ROLLED_BACK,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
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
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of feed reads served from the query cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of feed reads that went to the feed source."
        );
        describe_counter!(
            METRIC_FETCH_CANCELLED,
            Unit::Count,
            "Total number of in-flight reads cancelled ahead of an optimistic write."
        );
        describe_counter!(
            METRIC_MUTATION_COMMITTED,
            Unit::Count,
            "Total number of optimistic mutations confirmed by the remote side."
        );
        describe_counter!(
            METRIC_MUTATION_ROLLED_BACK,
            Unit::Count,
            "Total number of optimistic mutations reverted after a remote failure."
        );
        describe_histogram!(
            METRIC_MUTATION_MS,
            Unit::Milliseconds,
            "Time from optimistic patch to remote settlement in milliseconds."
        );
    });
}
