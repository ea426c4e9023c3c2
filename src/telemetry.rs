use crate::classification::Label;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Failed to build metrics exporter: {0}")]
pub struct TelemetryError(String);

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| TelemetryError(e.to_string()))?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("deepfake_api");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let prediction_counter = meter
            .u64_counter("predictions_total")
            .with_description("Total number of predictions by label")
            .build();

        let boundaries = generate_boundaries((10, 100, 250, 1000, 5000));

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of prediction operations in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_counter,
            prediction_duration,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction(&self, label: Label, duration_ms: u64) {
        let attributes = vec![KeyValue::new("label", label.as_str())];
        self.prediction_counter.add(1, &attributes);
        self.prediction_duration.record(duration_ms, &[]);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 250;
    let tail_step: usize = 1000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let parts = (10, 30, 80, 580, 2580);
        let get = generate_boundaries(parts);
        let expected = vec![
            10.0, 20.0, 30.0, 55.0, 80.0, 330.0, 580.0, 1580.0, 2580.0,
        ];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_boundaries_are_sorted() {
        let get = generate_boundaries((10, 100, 250, 1000, 5000));
        assert!(get.windows(2).all(|w| w[0] < w[1]));
    }
}
