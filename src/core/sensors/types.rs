//! Shared value and metric types for the sensor layer.

use rand::Rng;

use super::error::SensorError;

/// A single measured value. Sensors produce floats for physical quantities,
/// integers for counts and indices, and short text for qualitative levels.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Int(i64),
    Text(String),
}

impl Value {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Float(v) => serde_json::json!(v),
            Value::Int(v) => serde_json::json!(v),
            Value::Text(v) => serde_json::json!(v),
        }
    }
}

/// One raw field straight out of a sensor read, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub field: &'static str,
    pub value: Value,
}

impl Sample {
    pub fn new(field: &'static str, value: Value) -> Self {
        Sample { field, value }
    }
}

/// A full sensor read: every field the device produced in one pass.
pub type Reading = Vec<Sample>;

/// A normalized metric ready for publication: namespaced name, value, unit
/// and the shared cycle timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// `{sensor}/{field}`, e.g. `bme680/temperature`.
    pub name: String,
    pub value: Value,
    pub unit: &'static str,
    /// Milliseconds since the Unix epoch, identical for every metric of one
    /// poll cycle.
    pub timestamp: u64,
}

pub type SensorResult<T> = Result<T, SensorError>;

/// Uniform sample in `base ± spread`, the shape every simulated read uses.
pub(crate) fn jitter(base: f64, spread: f64) -> f64 {
    rand::thread_rng().gen_range(base - spread..=base + spread)
}

/// Rounds to two decimal places, the precision published for float metrics.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
