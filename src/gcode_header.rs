// src/gcode_header.rs - Slicer metadata and thumbnails from the head of a G-code file
//
// Slicers write their settings as comments near the start (or end) of the
// file. We only ever see the first byte window of the file, so every field
// here is optional and the parser is deliberately forgiving.

use crate::filename::{MAX_LAYER_HEIGHT, MIN_LAYER_HEIGHT};
use crate::metadata::SlicerMetadata;
use crate::util::layer_count_from_geometry;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Only this many lines of the header are inspected.
pub const MAX_HEADER_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    LayerHeight,
    FirstLayerHeight,
    LayerCount,
    EstimatedTime,
    ObjectHeight,
}

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    /// Plain decimal number.
    Number,
    /// Human-readable duration such as `1d 2h 3m 4s`.
    Duration,
}

struct HeaderPattern {
    field: Field,
    kind: ValueKind,
    regex: Regex,
}

impl HeaderPattern {
    fn new(field: Field, kind: ValueKind, pattern: &str) -> Self {
        Self {
            field,
            kind,
            regex: Regex::new(&format!("(?i){pattern}")).expect("valid header regex"),
        }
    }
}

// Evaluated in order; the first match for a field wins.
static HEADER_PATTERNS: LazyLock<Vec<HeaderPattern>> = LazyLock::new(|| {
    use Field::*;
    use ValueKind::*;
    vec![
        HeaderPattern::new(LayerHeight, Number, r"^layer[_ ]height\s*[=:]\s*(\d*\.?\d+)"),
        HeaderPattern::new(
            FirstLayerHeight,
            Number,
            r"^(?:first_layer_height|initial_layer_print_height|initial layer height)\s*[=:]\s*(\d*\.?\d+)(?:\s*mm)?\s*$",
        ),
        HeaderPattern::new(LayerCount, Number, r"^layer_count\s*[=:]\s*(\d+)"),
        HeaderPattern::new(LayerCount, Number, r"^total[_ ]layers?(?:[_ ]number|[_ ]count)?\s*[=:]\s*(\d+)"),
        HeaderPattern::new(EstimatedTime, Number, r"^time\s*:\s*(\d+(?:\.\d+)?)\s*$"),
        HeaderPattern::new(EstimatedTime, Number, r"^estimated_time\s*[=:]\s*(\d+(?:\.\d+)?)\s*$"),
        HeaderPattern::new(
            EstimatedTime,
            Duration,
            r"^estimated printing time(?: \(normal mode\))?\s*[=:]\s*([\ddhms ]+)",
        ),
        HeaderPattern::new(EstimatedTime, Duration, r"total estimated time\s*[=:]\s*([\ddhms ]+)"),
        HeaderPattern::new(ObjectHeight, Number, r"^max_z_height\s*[=:]\s*(\d*\.?\d+)"),
        HeaderPattern::new(ObjectHeight, Number, r"^maxz\s*:\s*(\d*\.?\d+)"),
        HeaderPattern::new(ObjectHeight, Number, r"^(?:object_height|max_layer_z)\s*[=:]\s*(\d*\.?\d+)"),
    ]
});

static DURATION_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*([dhms])").expect("valid regex"));
static FREE_TEXT_HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d.])(0\.\d{1,3})(?:[^\d]|$)").expect("valid regex"));
static THUMBNAIL_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^;\s*thumbnail(_JPG|_QOI)? begin (\d+)x(\d+) (\d+)[^\n]*\n(.*?)^;\s*thumbnail(?:_JPG|_QOI)? end")
        .expect("valid regex")
});

/// Parse `1d 2h 3m 4s`-style durations into seconds.
fn parse_duration(text: &str) -> Option<f64> {
    let mut seconds = 0.0;
    let mut matched = false;
    for caps in DURATION_PART.captures_iter(text) {
        let n: f64 = caps[1].parse().ok()?;
        seconds += n * match caps[2].to_ascii_lowercase().as_str() {
            "d" => 86_400.0,
            "h" => 3_600.0,
            "m" => 60.0,
            _ => 1.0,
        };
        matched = true;
    }
    matched.then_some(seconds)
}

fn slot(meta: &mut SlicerMetadata, field: Field) -> &mut Option<f64> {
    match field {
        Field::LayerHeight => &mut meta.layer_height,
        Field::FirstLayerHeight => &mut meta.first_layer_height,
        Field::LayerCount => &mut meta.layer_count,
        Field::EstimatedTime => &mut meta.estimated_time,
        Field::ObjectHeight => &mut meta.object_height,
    }
}

/// Extract slicer metadata from raw G-code text.
///
/// Returns `None` when no field could be read at all.
pub fn parse(raw: &str) -> Option<SlicerMetadata> {
    let mut meta = SlicerMetadata::default();
    let lines: Vec<&str> = raw.lines().take(MAX_HEADER_LINES).collect();

    for line in &lines {
        let Some(comment) = line.trim_start().strip_prefix(';') else {
            continue;
        };
        let comment = comment.trim();
        for pattern in HEADER_PATTERNS.iter() {
            let target = slot(&mut meta, pattern.field);
            if target.is_some() {
                continue;
            }
            let Some(caps) = pattern.regex.captures(comment) else {
                continue;
            };
            let value = match pattern.kind {
                ValueKind::Number => caps[1].parse::<f64>().ok(),
                ValueKind::Duration => parse_duration(&caps[1]),
            };
            if let Some(value) = value.filter(|v| v.is_finite()) {
                *target = Some(value);
            }
        }
    }

    if meta.object_height.is_none() {
        if let (Some(lh), Some(count)) = (meta.layer_height, meta.layer_count) {
            meta.object_height = Some(lh * count);
        }
    }

    if meta.object_height.is_some() && meta.layer_height.is_none() && meta.layer_count.is_none() {
        meta.layer_height = free_text_layer_height(&lines);
    }

    if meta.layer_count.is_none() {
        if let (Some(height), Some(lh)) = (meta.object_height, meta.layer_height) {
            let first = meta.first_layer_height.unwrap_or(lh);
            meta.layer_count = layer_count_from_geometry(height, first, lh).map(f64::from);
        }
    }

    (!meta.is_empty()).then_some(meta)
}

// Some slicers only mention the layer height in prose, or in a profile name.
fn free_text_layer_height(lines: &[&str]) -> Option<f64> {
    lines
        .iter()
        .flat_map(|line| FREE_TEXT_HEIGHT.captures_iter(line))
        .filter_map(|caps| caps[1].parse::<f64>().ok())
        .find(|v| (MIN_LAYER_HEIGHT..=MAX_LAYER_HEIGHT).contains(v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    Png,
    Jpeg,
    Qoi,
}

impl ThumbnailFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ThumbnailFormat::Png => "image/png",
            ThumbnailFormat::Jpeg => "image/jpeg",
            ThumbnailFormat::Qoi => "image/qoi",
        }
    }
}

/// Base64 image embedded between `; thumbnail begin` / `; thumbnail end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub format: ThumbnailFormat,
    pub base64: String,
}

impl Thumbnail {
    /// `data:` URL an `<img>` element can display directly.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime(), self.base64)
    }
}

/// Extract the last complete embedded thumbnail. Slicers emit the larger
/// sizes last.
pub fn extract_thumbnail(raw: &str) -> Option<Thumbnail> {
    let caps = THUMBNAIL_BLOCK.captures_iter(raw).last()?;
    let format = match caps.get(1).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(tag) if tag == "_JPG" => ThumbnailFormat::Jpeg,
        Some(tag) if tag == "_QOI" => ThumbnailFormat::Qoi,
        _ => ThumbnailFormat::Png,
    };
    let base64: String = caps[5]
        .lines()
        .map(|line| line.trim().trim_start_matches(';').trim())
        .collect();
    if base64.is_empty() {
        return None;
    }
    Some(Thumbnail {
        width: caps[2].parse().ok()?,
        height: caps[3].parse().ok()?,
        format,
        base64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRUSA_HEAD: &str = "\
; generated by PrusaSlicer 2.7.1
;
; thumbnail begin 16x16 12
; iVBORw0KGgoA
; thumbnail end
;
; thumbnail begin 32x32 20
; AAAABBBBCCCC
; DDDDEEEE
; thumbnail end
; external perimeters extrusion width = 0.45mm
; layer_height = 0.2
; first_layer_height = 0.3
; estimated printing time (normal mode) = 1h 46m 3s
; max_z_height: 50.00
G28
G1 Z0.3 F3000
";

    #[test]
    fn test_parse_prusa_head() {
        let meta = parse(PRUSA_HEAD).unwrap();
        assert_eq!(meta.layer_height, Some(0.2));
        assert_eq!(meta.first_layer_height, Some(0.3));
        assert_eq!(meta.estimated_time, Some(6363.0));
        assert_eq!(meta.object_height, Some(50.0));
        assert_eq!(meta.layer_count, Some(249.0));
    }

    #[test]
    fn test_parse_cura_head() {
        let head = ";FLAVOR:Marlin\n;TIME:6360\n;Layer height: 0.15\n;LAYER_COUNT:120\n;MAXZ:18.15\nG28\n";
        let meta = parse(head).unwrap();
        assert_eq!(meta.estimated_time, Some(6360.0));
        assert_eq!(meta.layer_height, Some(0.15));
        assert_eq!(meta.layer_count, Some(120.0));
        assert_eq!(meta.object_height, Some(18.15));
    }

    #[test]
    fn test_first_match_is_never_overwritten() {
        let head = "; layer_height = 0.2\n; layer_height = 0.3\n";
        assert_eq!(parse(head).unwrap().layer_height, Some(0.2));
    }

    #[test]
    fn test_percentage_first_layer_is_ignored() {
        let head = "; first_layer_height = 75%\n; layer_height = 0.2\n";
        let meta = parse(head).unwrap();
        assert_eq!(meta.first_layer_height, None);
    }

    #[test]
    fn test_object_height_derived_from_count() {
        let head = "; layer_height = 0.25\n; total layer number: 40\n";
        let meta = parse(head).unwrap();
        assert_eq!(meta.layer_count, Some(40.0));
        assert_eq!(meta.object_height, Some(10.0));
    }

    #[test]
    fn test_free_text_layer_height_fallback() {
        let head = "; max_z_height: 10.0\nM117 layer 0.25mm profile\n";
        let meta = parse(head).unwrap();
        assert_eq!(meta.layer_height, Some(0.25));
        assert_eq!(meta.layer_count, Some(40.0));
    }

    #[test]
    fn test_free_text_height_on_any_line() {
        let head = "; max_z_height: 10\n; 0.25 mm profile\n";
        let meta = parse(head).unwrap();
        assert_eq!(meta.layer_height, Some(0.25));
        assert_eq!(meta.layer_count, Some(40.0));

        // Out-of-range tokens are skipped.
        let head = "; max_z_height: 10\n; nozzle 0.6\n";
        assert_eq!(parse(head).unwrap().layer_height, None);
    }

    #[test]
    fn test_non_comment_lines_are_ignored() {
        assert!(parse("layer_height = 0.2\nG28\n").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_only_first_lines_are_scanned() {
        let mut head = "G1 X1\n".repeat(MAX_HEADER_LINES);
        head.push_str("; layer_height = 0.2\n");
        assert!(parse(&head).is_none());
    }

    #[test]
    fn test_settings_ahead_of_large_thumbnail() {
        let mut head = String::from("; layer_height = 0.2\n; max_z_height: 50.00\n; thumbnail begin 300x300 40000\n");
        head.push_str(&"; iVBORw0KGgoAAAANSUhEUgAAASwAAAEs\n".repeat(MAX_HEADER_LINES));
        head.push_str("; thumbnail end\n");
        let meta = parse(&head).unwrap();
        assert_eq!(meta.layer_height, Some(0.2));
        assert_eq!(meta.object_height, Some(50.0));
        assert_eq!(extract_thumbnail(&head).map(|t| t.width), Some(300));
    }

    #[test]
    fn test_extract_last_thumbnail() {
        let thumb = extract_thumbnail(PRUSA_HEAD).unwrap();
        assert_eq!(thumb.width, 32);
        assert_eq!(thumb.height, 32);
        assert_eq!(thumb.format, ThumbnailFormat::Png);
        assert_eq!(thumb.base64, "AAAABBBBCCCCDDDDEEEE");
    }

    #[test]
    fn test_truncated_thumbnail_is_rejected() {
        let head = "; thumbnail begin 32x32 20\n; AAAABBBB\n";
        assert!(extract_thumbnail(head).is_none());
        assert!(extract_thumbnail("G28\n").is_none());
    }

    #[test]
    fn test_jpeg_thumbnail() {
        let head = "; thumbnail_JPG begin 48x48 8\n; /9j/4AAQ\n; thumbnail_JPG end\n";
        let thumb = extract_thumbnail(head).unwrap();
        assert_eq!(thumb.format, ThumbnailFormat::Jpeg);
        assert_eq!(thumb.format.mime(), "image/jpeg");
        assert_eq!(thumb.base64, "/9j/4AAQ");
        assert_eq!(thumb.data_url(), "data:image/jpeg;base64,/9j/4AAQ");
    }
}
