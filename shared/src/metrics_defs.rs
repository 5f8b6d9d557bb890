//! Common types for metrics definitions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Gauge => "Gauge",
            MetricType::Histogram => "Histogram",
        }
    }
}

/// A metric emitted by one of the services, declared up front so that the
/// full list can be documented and checked for duplicates.
#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

/// Returns the name of the first metric declared more than once, if any.
pub fn find_duplicate(defs: &[MetricDef]) -> Option<&'static str> {
    defs.iter().enumerate().find_map(|(i, def)| {
        defs[..i]
            .iter()
            .any(|earlier| earlier.name == def.name)
            .then_some(def.name)
    })
}

// The expansions name `metrics` directly, so calling crates depend on it.
#[macro_export]
macro_rules! counter {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::counter!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! gauge {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::gauge!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::histogram!($def.name $(, $key => $value)*)
    };
}
