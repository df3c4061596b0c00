use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "stampa_conversion_success_total",
            Unit::Count,
            "Total number of successful PDF conversions."
        );
        describe_counter!(
            "stampa_conversion_converter_error_total",
            Unit::Count,
            "Total number of conversions where the converter exited non-zero."
        );
        describe_counter!(
            "stampa_conversion_timeout_total",
            Unit::Count,
            "Total number of conversions killed after exceeding the ceiling."
        );
        describe_counter!(
            "stampa_conversion_io_error_total",
            Unit::Count,
            "Total number of conversions that failed on spawn or file I/O."
        );
        describe_histogram!(
            "stampa_conversion_ms",
            Unit::Milliseconds,
            "End-to-end conversion latency in milliseconds, recorded for every outcome."
        );
    });
}
