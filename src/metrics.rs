/// Prometheus metrics for the canonicalization and grouping endpoints.
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

pub const OUTCOME_OK: &str = "ok";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    /// `ok`, a validator failure reason, or a request error code
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    /// `options` or an edit action (`move`, `merge`, ...)
    pub operation: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabels {
    pub route: String,
}

pub struct MetricsCollector {
    registry: RwLock<Registry>,

    pub canonicalize_requests_total: Family<OutcomeLabels, Counter>,
    pub grouping_requests_total: Family<OperationLabels, Counter>,
    pub classifier_duration_seconds: Histogram,
    pub http_active_requests: Family<RouteLabels, Gauge>,
    pub http_request_duration_seconds: Family<RouteLabels, Histogram>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let canonicalize_requests_total = Family::<OutcomeLabels, Counter>::default();
        // the text encoder appends `_total` to counter names
        registry.register(
            "canonicalize_requests",
            "Canonicalization requests by outcome",
            canonicalize_requests_total.clone(),
        );

        let grouping_requests_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "grouping_requests",
            "Grouping option and edit requests by operation",
            grouping_requests_total.clone(),
        );

        // 50ms .. ~50s, covering the classifier timeout
        let classifier_duration_seconds = Histogram::new(exponential_buckets(0.05, 2.0, 11));
        registry.register(
            "classifier_duration_seconds",
            "Time spent waiting for the classifier",
            classifier_duration_seconds.clone(),
        );

        let http_active_requests = Family::<RouteLabels, Gauge>::default();
        registry.register(
            "http_active_requests",
            "Requests currently being processed",
            http_active_requests.clone(),
        );

        let http_request_duration_seconds =
            Family::<RouteLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.5, 12))
            });
        registry.register(
            "http_request_duration_seconds",
            "Request latency histogram in seconds",
            http_request_duration_seconds.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            canonicalize_requests_total,
            grouping_requests_total,
            classifier_duration_seconds,
            http_active_requests,
            http_request_duration_seconds,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(err) = encode(&mut buffer, &registry) {
            tracing::warn!(error = %err, "failed to encode metrics");
        }
        buffer
    }

    pub fn record_canonicalize(&self, outcome: &str) {
        self.canonicalize_requests_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_grouping(&self, operation: &str) {
        self.grouping_requests_total
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
            })
            .inc();
    }

    pub fn observe_classifier(&self, elapsed: Duration) {
        self.classifier_duration_seconds
            .observe(elapsed.as_secs_f64());
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that tracks one in-flight request on `route` and records its
/// latency when dropped.
pub struct RequestTimer {
    route: RouteLabels,
    start: Instant,
}

impl RequestTimer {
    pub fn start(route: &str) -> Self {
        let route = RouteLabels {
            route: route.to_string(),
        };
        METRICS.http_active_requests.get_or_create(&route).inc();
        Self {
            route,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        METRICS.http_active_requests.get_or_create(&self.route).dec();
        METRICS
            .http_request_duration_seconds
            .get_or_create(&self.route)
            .observe(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_outcomes_are_labelled() {
        let collector = MetricsCollector::new();
        collector.record_canonicalize(OUTCOME_OK);
        collector.record_canonicalize(OUTCOME_OK);
        collector.record_canonicalize("missing-coverage");

        let output = collector.encode();
        assert!(output.contains(r#"canonicalize_requests_total{outcome="ok"} 2"#));
        assert!(output.contains(r#"canonicalize_requests_total{outcome="missing-coverage"} 1"#));
    }

    #[test]
    fn grouping_operations_are_labelled() {
        let collector = MetricsCollector::new();
        collector.record_grouping("options");
        collector.record_grouping("merge");

        let output = collector.encode();
        assert!(output.contains(r#"grouping_requests_total{operation="options"} 1"#));
        assert!(output.contains(r#"grouping_requests_total{operation="merge"} 1"#));
    }

    #[test]
    fn classifier_histogram_counts_observations() {
        let collector = MetricsCollector::new();
        collector.observe_classifier(Duration::from_millis(120));

        let output = collector.encode();
        assert!(output.contains("classifier_duration_seconds_count 1"));
    }

    #[test]
    fn request_timer_releases_gauge() {
        {
            let _timer = RequestTimer::start("timer_test");
        }
        let output = METRICS.encode();
        assert!(output.contains(r#"http_active_requests{route="timer_test"} 0"#));
        assert!(output.contains("http_request_duration_seconds"));
    }
}
