use anyhow::Result;
use opentelemetry::{
    KeyValue,
    metrics::{Histogram, Meter},
};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};
use std::{
    future::Future,
    time::{Duration, Instant},
};

pub fn low_latency_boundaries() -> Vec<f64> {
    vec![
        0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 25.0, 50.0,
    ]
}

/// Install an OTLP metrics pipeline when `endpoint` is set.
///
/// Without an endpoint nothing is installed and every instrument records
/// into the global no-op meter.
pub fn init_provider(endpoint: Option<&str>, interval: Duration) -> Result<Option<SdkMeterProvider>> {
    let Some(endpoint) = endpoint else {
        return Ok(None);
    };

    let resource = Resource::builder()
        .with_attribute(KeyValue::new("service.name", "file-service"))
        .with_attribute(KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        ))
        .build();

    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.to_owned())
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();

    opentelemetry::global::set_meter_provider(provider.clone());
    Ok(Some(provider))
}

/// Backend call latencies, labelled by operation and outcome.
#[derive(Debug, Clone)]
pub struct ApiMetrics {
    pub operations: Histogram<f64>,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiMetrics {
    pub fn new() -> ApiMetrics {
        Self::from_meter(&opentelemetry::global::meter("file-service"))
    }

    pub fn from_meter(meter: &Meter) -> ApiMetrics {
        let operations = meter
            .f64_histogram("file_service.operation_duration")
            .with_unit("s")
            .with_boundaries(low_latency_boundaries())
            .with_description("metadata and blob store latencies in seconds")
            .build();

        ApiMetrics { operations }
    }

    /// Await `fut` and record how long it took under `operation`.
    ///
    /// The outcome label is `ok` or `error` depending on the result.
    pub async fn time<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        self.record(operation, outcome, start.elapsed());
        result
    }

    /// Record one sample for work that was not wrapped in [`Self::time`].
    pub fn record(&self, operation: &'static str, outcome: &'static str, elapsed: Duration) {
        self.operations.record(
            elapsed.as_secs_f64(),
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("outcome", outcome),
            ],
        );
    }
}
