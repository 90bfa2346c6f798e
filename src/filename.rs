// src/filename.rs - Canonical file paths and filename-convention inference
use regex::Regex;
use std::sync::LazyLock;

/// Accepted range for a layer height read out of a filename (mm).
pub const MIN_LAYER_HEIGHT: f64 = 0.05;
pub const MAX_LAYER_HEIGHT: f64 = 0.5;

static LAYER_HEIGHT_MM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+\.\d+)\s*mm").expect("valid regex"));
static LAYER_HEIGHT_BOUNDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[_\-\s/])(\d+\.\d+)(?:[_\-\s.]|$)").expect("valid regex"));
static HOURS_MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)h(\d+)m").expect("valid regex"));
static HOURS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)h").expect("valid regex"));
// A trailing second `m` means a millimetre value, not minutes.
static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)m(?:[^m]|$)").expect("valid regex"));

/// Turn a reported file path into the form the file API expects: forward
/// slashes, relative to the `gcodes` root, no leading slash.
pub fn normalize(raw: &str) -> Option<String> {
    let mut path = raw.trim().replace('\\', "/");
    if let Some(idx) = path.rfind("/gcodes/") {
        path = path[idx + "/gcodes/".len()..].to_string();
    }
    let path = path.trim_start_matches('/');
    let path = path.strip_prefix("gcodes/").unwrap_or(path);
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// Last path component, used for display.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Layer height encoded in a filename such as `benchy_0.2mm_PLA.gcode` or
/// `part_0.15_ABS.gcode`. Values outside 0.05-0.5 mm are ignored.
pub fn infer_layer_height(name: &str) -> Option<f64> {
    let in_range = |v: &f64| (MIN_LAYER_HEIGHT..=MAX_LAYER_HEIGHT).contains(v);
    [&*LAYER_HEIGHT_MM, &*LAYER_HEIGHT_BOUNDED].iter().find_map(|re| {
        re.captures_iter(name)
            .filter_map(|caps| caps[1].parse::<f64>().ok())
            .find(in_range)
    })
}

/// Print duration encoded in a filename as `1h46m`, `2h` or `45m`, in seconds.
pub fn infer_duration(name: &str) -> Option<f64> {
    if let Some(caps) = HOURS_MINUTES.captures(name) {
        let h: f64 = caps[1].parse().ok()?;
        let m: f64 = caps[2].parse().ok()?;
        return Some(h * 3600.0 + m * 60.0);
    }
    if let Some(caps) = HOURS.captures(name) {
        let h: f64 = caps[1].parse().ok()?;
        return Some(h * 3600.0);
    }
    if let Some(caps) = MINUTES.captures(name) {
        let m: f64 = caps[1].parse().ok()?;
        return Some(m * 60.0);
    }
    None
}
