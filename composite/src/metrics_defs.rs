use shared::metrics_defs::{MetricDef, MetricType};

pub const AGGREGATE_REQUEST_DURATION: MetricDef = MetricDef {
    name: "aggregate.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to assemble an aggregate in seconds. Tagged with outcome.",
};

pub const CRITICAL_ATTEMPTS: MetricDef = MetricDef {
    name: "critical.attempts",
    metric_type: MetricType::Counter,
    description: "Calls made to the critical dependency, including retries",
};

pub const BREAKER_TRANSITIONS: MetricDef = MetricDef {
    name: "breaker.transitions",
    metric_type: MetricType::Counter,
    description: "Circuit breaker state changes. Tagged with the new state.",
};

pub const OPTIONAL_FETCH_FAILED: MetricDef = MetricDef {
    name: "optional.fetch.failed",
    metric_type: MetricType::Counter,
    description: "Optional reads that failed and were replaced by an empty list. Tagged with resource.",
};

pub const INTENTS_PUBLISHED: MetricDef = MetricDef {
    name: "intents.published",
    metric_type: MetricType::Counter,
    description: "Write intents handed to an outbound channel. Tagged with channel.",
};

pub const INTENT_DELIVERY_FAILED: MetricDef = MetricDef {
    name: "intents.delivery.failed",
    metric_type: MetricType::Counter,
    description: "Write intents dropped after exhausting delivery retries. Tagged with channel.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    AGGREGATE_REQUEST_DURATION,
    CRITICAL_ATTEMPTS,
    BREAKER_TRANSITIONS,
    OPTIONAL_FETCH_FAILED,
    INTENTS_PUBLISHED,
    INTENT_DELIVERY_FAILED,
];
