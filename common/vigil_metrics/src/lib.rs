//! A wrapper around the `prometheus` crate that provides a global metrics
//! registry and a set of infallible helpers.
//!
//! Metric creation returns a `Result`; the `inc`/`set`/`observe` helpers take
//! that `Result` and silently no-op on metrics that failed to register, so
//! call sites never branch on metrics plumbing.

use prometheus::{HistogramOpts, Opts};
use std::time::Duration;

pub use prometheus::{
    gather, Encoder, Histogram, HistogramTimer, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, TextEncoder,
};

pub type Result<T> = std::result::Result<T, prometheus::Error>;

pub fn try_create_int_counter(name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    prometheus::register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub fn try_create_int_gauge(name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))?;
    prometheus::register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

pub fn try_create_histogram(name: &str, help: &str) -> Result<Histogram> {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help))?;
    prometheus::register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

pub fn try_create_int_counter_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<IntCounterVec> {
    let counter_vec = IntCounterVec::new(Opts::new(name, help), label_names)?;
    prometheus::register(Box::new(counter_vec.clone()))?;
    Ok(counter_vec)
}

pub fn try_create_int_gauge_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<IntGaugeVec> {
    let gauge_vec = IntGaugeVec::new(Opts::new(name, help), label_names)?;
    prometheus::register(Box::new(gauge_vec.clone()))?;
    Ok(gauge_vec)
}

pub fn try_create_histogram_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<HistogramVec> {
    let histogram_vec = HistogramVec::new(HistogramOpts::new(name, help), label_names)?;
    prometheus::register(Box::new(histogram_vec.clone()))?;
    Ok(histogram_vec)
}

pub fn inc_counter(counter: &Result<IntCounter>) {
    if let Ok(counter) = counter {
        counter.inc();
    }
}

pub fn inc_counter_vec(counter_vec: &Result<IntCounterVec>, labels: &[&str]) {
    if let Ok(counter_vec) = counter_vec {
        if let Ok(counter) = counter_vec.get_metric_with_label_values(labels) {
            counter.inc();
        }
    }
}

pub fn set_gauge(gauge: &Result<IntGauge>, value: i64) {
    if let Ok(gauge) = gauge {
        gauge.set(value);
    }
}

pub fn set_gauge_vec(gauge_vec: &Result<IntGaugeVec>, labels: &[&str], value: i64) {
    if let Ok(gauge_vec) = gauge_vec {
        if let Ok(gauge) = gauge_vec.get_metric_with_label_values(labels) {
            gauge.set(value);
        }
    }
}

/// Starts a timer observed into the histogram on drop.
pub fn start_timer(histogram: &Result<Histogram>) -> Option<HistogramTimer> {
    histogram.as_ref().ok().map(|histogram| histogram.start_timer())
}

pub fn start_timer_vec(
    histogram_vec: &Result<HistogramVec>,
    labels: &[&str],
) -> Option<HistogramTimer> {
    histogram_vec
        .as_ref()
        .ok()
        .and_then(|histogram_vec| histogram_vec.get_metric_with_label_values(labels).ok())
        .map(|histogram| histogram.start_timer())
}

pub fn observe(histogram: &Result<Histogram>, value: f64) {
    if let Ok(histogram) = histogram {
        histogram.observe(value);
    }
}

pub fn observe_duration(histogram: &Result<Histogram>, duration: Duration) {
    if let Ok(histogram) = histogram {
        histogram.observe(duration.as_secs_f64());
    }
}

pub fn observe_duration_vec(
    histogram_vec: &Result<HistogramVec>,
    labels: &[&str],
    duration: Duration,
) {
    if let Ok(histogram_vec) = histogram_vec {
        if let Ok(histogram) = histogram_vec.get_metric_with_label_values(labels) {
            histogram.observe(duration.as_secs_f64());
        }
    }
}

/// Render the global registry in the Prometheus text exposition format.
pub fn render() -> std::result::Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder
        .encode(&gather(), &mut buffer)
        .map_err(|e| format!("failed to encode metrics: {e:?}"))?;
    String::from_utf8(buffer).map_err(|e| format!("metrics are not valid UTF-8: {e:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_tolerate_duplicate_registration() {
        let first = try_create_int_counter("vigil_metrics_test_counter", "test");
        assert!(first.is_ok());
        let second = try_create_int_counter("vigil_metrics_test_counter", "test");
        assert!(second.is_err());

        inc_counter(&first);
        inc_counter(&second);
        assert_eq!(first.unwrap().get(), 1);
    }
}
