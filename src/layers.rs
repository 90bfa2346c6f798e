// src/layers.rs - Current/total layer reconciliation
use crate::metadata::SlicerMetadata;
use crate::util::{PLACEHOLDER, first_number};
use serde::Serialize;
use serde_json::{Map, Value};

/// Layer height assumed when nothing better is known.
pub const FALLBACK_LAYER_HEIGHT: f64 = 0.2;

const CURRENT_LAYER_KEYS: &[&str] = &["current_layer", "layer", "layer_current"];
const TOTAL_LAYER_KEYS: &[&str] = &["total_layer", "total_layers", "layer_count"];

// Absorbs float noise in Z positions such as 0.6 - 0.2 = 0.39999...
const Z_EPSILON: f64 = 1e-6;

/// Reconciled layer position. Zero is a valid estimator output; the
/// display only treats values above zero as known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    pub current: Option<u32>,
    pub total: Option<u32>,
}

impl LayerInfo {
    pub fn display(&self) -> String {
        let known = |v: Option<u32>| v.filter(|n| *n > 0);
        match (known(self.current), known(self.total)) {
            (Some(current), Some(total)) => format!("{current} / {total}"),
            (Some(current), None) => format!("{current} / {PLACEHOLDER}"),
            (None, Some(total)) => format!("{PLACEHOLDER} / {total}"),
            (None, None) => PLACEHOLDER.to_string(),
        }
    }
}

fn info_layer(info: Option<&Map<String, Value>>, keys: &[&str]) -> Option<u32> {
    first_number(info?, keys)
        .filter(|n| *n >= 0.0)
        .map(|n| n.floor() as u32)
}

/// Estimate the layer position from, in order of trust: slicer-reported
/// layer info, metadata geometry with the toolhead Z, the progress ratio,
/// and finally Z over a nominal layer height.
pub fn estimate(
    info: Option<&Map<String, Value>>,
    progress: f64,
    toolhead_z: Option<f64>,
    metadata: Option<&SlicerMetadata>,
) -> LayerInfo {
    let mut current = info_layer(info, CURRENT_LAYER_KEYS);
    let mut total = info_layer(info, TOTAL_LAYER_KEYS);

    let meta_total = metadata.and_then(SlicerMetadata::total_layers);
    if total.is_none() {
        total = meta_total;
    }

    if current.is_none() {
        current = metadata.and_then(|meta| geometry_layer(meta, toolhead_z?, meta_total));
    }

    if current.is_none() {
        if let Some(t) = meta_total.filter(|t| *t > 0) {
            if progress > 0.0 {
                let layer = (progress * f64::from(t)).round() as u32;
                current = Some(layer.clamp(1, t));
            }
        }
    }

    if current.is_none() {
        if let Some(z) = toolhead_z.filter(|z| *z > 0.0) {
            current = Some(((z / FALLBACK_LAYER_HEIGHT + Z_EPSILON).floor() as u32).max(1));
        }
    }

    LayerInfo { current, total }
}

fn geometry_layer(meta: &SlicerMetadata, z: f64, total: Option<u32>) -> Option<u32> {
    let lh = meta.layer_height.filter(|lh| *lh > 0.0)?;
    let first = meta.effective_first_layer()?;
    let layer = ((z - first) / lh + Z_EPSILON).floor() + 1.0;
    let layer = layer.max(1.0) as u32;
    Some(match total {
        Some(t) if t > 0 => layer.min(t),
        _ => layer,
    })
}
