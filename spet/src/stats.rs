// Copyright (c) Facebook, Inc. and its affiliates.
//
// Summary statistics attached to every repeated measurement.
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub average: f64,
    pub median: f64,
    pub variance: f64,
    pub range: f64,
}

impl Summary {
    pub fn new(vals: &[f64]) -> Option<Self> {
        if vals.is_empty() {
            return None;
        }
        let min = vals.iter().cloned().fold(f64::MAX, f64::min);
        let max = vals.iter().cloned().fold(f64::MIN, f64::max);
        Some(Self {
            average: statistical::mean(vals),
            median: statistical::median(vals),
            // Sample variance is undefined for a single value.
            variance: match vals.len() {
                1 => 0.0,
                _ => statistical::variance(vals, None),
            },
            range: max - min,
        })
    }
}

/// Add `average`, `median`, `variance` and `range` for `vals` to `result`.
pub fn insert_summary(result: &mut Map<String, Value>, vals: &[f64]) {
    if let Some(sum) = Summary::new(vals) {
        result.insert("average".into(), json!(sum.average));
        result.insert("median".into(), json!(sum.median));
        result.insert("variance".into(), json!(sum.variance));
        result.insert("range".into(), json!(sum.range));
    }
}

/// Same as `insert_summary()` for multi-field measurements. Each statistic
/// becomes an object keyed by field name, e.g. `median.compress`.
pub fn insert_field_summaries(result: &mut Map<String, Value>, fields: &[(&str, Vec<f64>)]) {
    let mut average = Map::new();
    let mut median = Map::new();
    let mut variance = Map::new();
    let mut range = Map::new();
    for (name, vals) in fields.iter() {
        if let Some(sum) = Summary::new(vals) {
            average.insert(name.to_string(), json!(sum.average));
            median.insert(name.to_string(), json!(sum.median));
            variance.insert(name.to_string(), json!(sum.variance));
            range.insert(name.to_string(), json!(sum.range));
        }
    }
    if !median.is_empty() {
        result.insert("average".into(), Value::Object(average));
        result.insert("median".into(), Value::Object(median));
        result.insert("variance".into(), Value::Object(variance));
        result.insert("range".into(), Value::Object(range));
    }
}
