use shared::metrics_defs::{MetricDef, MetricType};

pub const TENANT_RESOLUTION: MetricDef = MetricDef {
    name: "tenant.resolution",
    metric_type: MetricType::Counter,
    description: "Tenant resolutions, tagged with outcome (bound, no_identifier, not_found, failed)",
};

pub const TENANT_RESOLUTION_DURATION: MetricDef = MetricDef {
    name: "tenant.resolution.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent identifying and looking up the tenant, in seconds.",
};

pub const TENANT_SETUP_FAILED: MetricDef = MetricDef {
    name: "tenant.setup.failed",
    metric_type: MetricType::Counter,
    description: "Requests whose tenant was bound but whose environment could not be set up.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    TENANT_RESOLUTION,
    TENANT_RESOLUTION_DURATION,
    TENANT_SETUP_FAILED,
];

/// Describes every metric the gateway and its registry emit.
pub fn describe_all() {
    shared::metrics_defs::describe(registry::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe(ALL_METRICS);
}
