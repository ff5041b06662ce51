use once_cell::sync::Lazy;
use prometheus::{Counter, Histogram, HistogramOpts, Registry, TextEncoder};

pub struct GateMetrics {
    pub gate_loads: Counter,
    pub gate_load_failures: Counter,
    pub capability_denied: Counter,
    pub usage_applied: Counter,
    pub usage_rejected: Counter,
    pub usage_write_failures: Counter,
    pub gate_load_duration: Histogram,
    registry: Registry,
}

impl GateMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let gate_loads = Counter::new("featuregate_loads_total", "Feature gates loaded")
            .expect("valid metric");
        let gate_load_failures = Counter::new(
            "featuregate_load_failures_total",
            "Feature gate loads that failed on a collaborator read",
        )
        .expect("valid metric");
        let capability_denied = Counter::new(
            "featuregate_capability_denied_total",
            "Capability checks answered with no entitlement",
        )
        .expect("valid metric");
        let usage_applied = Counter::new(
            "featuregate_usage_applied_total",
            "Usage increments written to the ledger",
        )
        .expect("valid metric");
        let usage_rejected = Counter::new(
            "featuregate_usage_rejected_total",
            "Usage increments refused by quota",
        )
        .expect("valid metric");
        let usage_write_failures = Counter::new(
            "featuregate_usage_write_failures_total",
            "Usage increments that failed on the ledger",
        )
        .expect("valid metric");
        let gate_load_duration = Histogram::with_opts(
            HistogramOpts::new(
                "featuregate_load_duration_seconds",
                "Time to load a feature gate",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )
        .expect("valid metric");

        for collector in [
            &gate_loads,
            &gate_load_failures,
            &capability_denied,
            &usage_applied,
            &usage_rejected,
            &usage_write_failures,
        ] {
            registry
                .register(Box::new(collector.clone()))
                .expect("metric registered once");
        }
        registry
            .register(Box::new(gate_load_duration.clone()))
            .expect("metric registered once");

        Self {
            gate_loads,
            gate_load_failures,
            capability_denied,
            usage_applied,
            usage_rejected,
            usage_write_failures,
            gate_load_duration,
            registry,
        }
    }

    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).unwrap_or_default()
    }
}

pub static METRICS: Lazy<GateMetrics> = Lazy::new(GateMetrics::new);

pub async fn metrics_handler() -> String {
    METRICS.encode()
}
