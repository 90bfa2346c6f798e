// src/util.rs - Number coercion and duration formatting shared by the estimators
use serde_json::Value;

/// Placeholder shown for any value the overlay cannot compute.
pub const PLACEHOLDER: &str = "--";

/// Coerce a JSON value into a finite `f64`.
///
/// Numbers and numeric strings are accepted; `null`, booleans, NaN and
/// infinities are not.
pub fn to_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Like [`to_number`] but only accepts values strictly greater than zero.
pub fn to_positive(value: &Value) -> Option<f64> {
    to_number(value).filter(|n| *n > 0.0)
}

/// Look up the first key in `keys` that yields a finite number.
pub fn first_number(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| object.get(*key).and_then(to_number))
}

/// Look up the first key in `keys` that yields a number above zero.
pub fn first_positive(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| object.get(*key).and_then(to_positive))
}

/// Clamp a progress ratio into `[0, 1]`. NaN maps to 0.
pub fn clamp01(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Remaining seconds extrapolated from the elapsed print time and the
/// progress ratio. Undefined at 0% (no data yet) and at 100% (done).
pub fn remaining_from_progress(progress: f64, print_duration: f64) -> Option<f64> {
    if !(progress > 0.0 && progress < 1.0) || !print_duration.is_finite() || print_duration < 0.0 {
        return None;
    }
    Some(print_duration / progress - print_duration)
}

/// Format a duration in seconds using its two most significant units,
/// e.g. `"2h 30m"` or `"45s"`. Missing, negative and non-finite inputs
/// render as the placeholder.
pub fn format_time(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds.filter(|s| s.is_finite() && *s >= 0.0) else {
        return PLACEHOLDER.to_string();
    };
    let total = seconds.floor() as u64;
    let units = [
        (total / 86_400, "d"),
        (total % 86_400 / 3_600, "h"),
        (total % 3_600 / 60, "m"),
        (total % 60, "s"),
    ];
    let Some(lead) = units.iter().position(|(n, _)| *n > 0) else {
        return "0s".to_string();
    };
    let (n, unit) = units[lead];
    match units.get(lead + 1) {
        Some((next, next_unit)) if *next > 0 => format!("{n}{unit} {next}{next_unit}"),
        _ => format!("{n}{unit}"),
    }
}

/// Layer count implied by an object height, a first-layer height and a
/// regular layer step: `round((height - first) / step) + 1`, never below 1.
///
/// Ties round to even, so 50.0 mm at 0.2 mm with a 0.3 mm first layer is
/// 249 layers.
pub fn layer_count_from_geometry(object_height: f64, first_layer_height: f64, layer_height: f64) -> Option<u32> {
    if !(layer_height > 0.0) || !(object_height > 0.0) || !first_layer_height.is_finite() {
        return None;
    }
    let steps = ((object_height - first_layer_height) / layer_height).round_ties_even();
    Some((steps + 1.0).max(1.0) as u32)
}
