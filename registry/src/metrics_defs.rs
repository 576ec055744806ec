use shared::metrics_defs::{MetricDef, MetricType};

pub const REGISTRY_RELOAD: MetricDef = MetricDef {
    name: "registry.reload",
    metric_type: MetricType::Counter,
    description: "Number of tenant registry reload attempts. Tagged with result.",
};

pub const REGISTRY_TENANTS: MetricDef = MetricDef {
    name: "registry.tenants",
    metric_type: MetricType::Gauge,
    description: "Number of tenants in the current registry snapshot",
};

pub const ALL_METRICS: &[MetricDef] = &[REGISTRY_RELOAD, REGISTRY_TENANTS];
