use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;

/// Endpoint instruments on a provider owned by this value. The process-global
/// provider is only replaced through [`Metrics::install_global`].
pub struct Metrics {
    request_counter: Counter<u64>,
    inference_duration: Histogram<u64>,
    provider: SdkMeterProvider,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let meter = provider.meter("prediction_endpoint");

        let request_counter = meter
            .u64_counter("predict_requests_total")
            .with_description("Prediction requests by outcome")
            .build();

        let boundaries = bucket_boundaries(
            50,
            &[(250, 50), (1000, 250), (5000, 1000), (30000, 5000)],
        );

        let inference_duration = meter
            .u64_histogram("inference_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of inference collaborator calls in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            inference_duration,
            provider,
            registry,
        })
    }

    /// Routes global meters, including the HTTP metrics layer, into this registry.
    pub fn install_global(&self) {
        global::set_meter_provider(self.provider.clone());
    }

    pub fn record_request(&self, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_inference_duration(&self, duration_ms: u64, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.inference_duration.record(duration_ms, &attributes);
    }
}

/// Histogram edges from `start`, each segment stepping up to its `(end, step)`.
fn bucket_boundaries(start: u64, segments: &[(u64, u64)]) -> Vec<f64> {
    let mut edges = vec![start];
    let mut lower = start;
    for &(end, step) in segments {
        let mut edge = lower;
        while edge + step <= end {
            edge += step;
            edges.push(edge);
        }
        lower = end;
    }
    edges.into_iter().map(|edge| edge as f64).collect()
}
