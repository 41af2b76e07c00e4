//! Prometheus metrics for the worker engine
//!
//! Every metric is labelled by `task_type`. The registry is owned by the
//! engine instance; the host exposes it however it serves `/metrics`.
//!
//! ## Metrics
//! - `courier_task_poll_total{task_type}` - Counter
//! - `courier_task_poll_error_total{task_type, error}` - Counter
//! - `courier_task_poll_seconds{task_type}` - Histogram
//! - `courier_task_paused_total{task_type}` - Counter
//! - `courier_task_execute_seconds{task_type}` - Histogram
//! - `courier_task_execute_error_total{task_type}` - Counter
//! - `courier_task_update_seconds{task_type}` - Histogram
//! - `courier_task_update_error_total{task_type}` - Counter

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

/// Metric handles for one engine instance
#[derive(Clone)]
pub struct WorkerMetrics {
    registry: Registry,
    poll_total: IntCounterVec,
    poll_errors: IntCounterVec,
    poll_seconds: HistogramVec,
    paused_total: IntCounterVec,
    execute_seconds: HistogramVec,
    execute_errors: IntCounterVec,
    update_seconds: HistogramVec,
    update_errors: IntCounterVec,
}

impl WorkerMetrics {
    /// Creates the metrics and registers them in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let poll_total = counter(&registry, "courier_task_poll_total", "Batch polls issued", &["task_type"])?;
        let poll_errors = counter(
            &registry,
            "courier_task_poll_error_total",
            "Batch polls that failed",
            &["task_type", "error"],
        )?;
        let poll_seconds = histogram(&registry, "courier_task_poll_seconds", "Batch poll latency")?;
        let paused_total = counter(
            &registry,
            "courier_task_paused_total",
            "Poll iterations skipped while paused",
            &["task_type"],
        )?;
        let execute_seconds = histogram(
            &registry,
            "courier_task_execute_seconds",
            "Handler execution time",
        )?;
        let execute_errors = counter(
            &registry,
            "courier_task_execute_error_total",
            "Executions that produced a failed result",
            &["task_type"],
        )?;
        let update_seconds = histogram(
            &registry,
            "courier_task_update_seconds",
            "Result delivery latency",
        )?;
        let update_errors = counter(
            &registry,
            "courier_task_update_error_total",
            "Result delivery attempts that failed",
            &["task_type"],
        )?;

        Ok(Self {
            registry,
            poll_total,
            poll_errors,
            poll_seconds,
            paused_total,
            execute_seconds,
            execute_errors,
            update_seconds,
            update_errors,
        })
    }

    pub fn record_poll(&self, task_type: &str, elapsed: Duration) {
        self.poll_total.with_label_values(&[task_type]).inc();
        self.poll_seconds
            .with_label_values(&[task_type])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_poll_error(&self, task_type: &str, error: &str) {
        self.poll_errors.with_label_values(&[task_type, error]).inc();
    }

    pub fn record_paused(&self, task_type: &str) {
        self.paused_total.with_label_values(&[task_type]).inc();
    }

    pub fn record_execution(&self, task_type: &str, elapsed: Duration, failed: bool) {
        self.execute_seconds
            .with_label_values(&[task_type])
            .observe(elapsed.as_secs_f64());
        if failed {
            self.execute_errors.with_label_values(&[task_type]).inc();
        }
    }

    pub fn record_update(&self, task_type: &str, elapsed: Duration, failed: bool) {
        self.update_seconds
            .with_label_values(&[task_type])
            .observe(elapsed.as_secs_f64());
        if failed {
            self.update_errors.with_label_values(&[task_type]).inc();
        }
    }

    /// Number of executions observed for `task_type`
    pub fn execution_count(&self, task_type: &str) -> u64 {
        self.execute_seconds
            .with_label_values(&[task_type])
            .get_sample_count()
    }

    /// Number of failed deliveries observed for `task_type`
    pub fn update_error_count(&self, task_type: &str) -> u64 {
        self.update_errors.with_label_values(&[task_type]).get()
    }

    /// Registry holding every metric of this engine
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Snapshot of all metric families
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn histogram(registry: &Registry, name: &str, help: &str) -> Result<HistogramVec, prometheus::Error> {
    let histogram = HistogramVec::new(HistogramOpts::new(name, help), &["task_type"])?;
    registry.register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_metrics_keyed_by_task_type() {
        let metrics = WorkerMetrics::new().unwrap();

        metrics.record_execution("echo", Duration::from_millis(5), false);
        metrics.record_execution("echo", Duration::from_millis(7), true);
        metrics.record_execution("other", Duration::from_millis(1), false);

        assert_eq!(metrics.execution_count("echo"), 2);
        assert_eq!(metrics.execution_count("other"), 1);
    }

    #[test]
    fn test_encode_text_contains_metric_names() {
        let metrics = WorkerMetrics::new().unwrap();
        metrics.record_poll("echo", Duration::from_millis(3));
        metrics.record_update("echo", Duration::from_millis(3), true);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("courier_task_poll_total"));
        assert!(text.contains("courier_task_update_error_total"));
        assert!(text.contains("task_type=\"echo\""));
        assert_eq!(metrics.update_error_count("echo"), 1);
    }
}
