// src/time_estimate.rs - Remaining and elapsed time figures
use crate::metadata::SlicerMetadata;
use crate::telemetry::PrintStats;
use crate::util::{first_positive, remaining_from_progress};
use serde::Serialize;

// Slicer total-time names seen in `print_stats.info` across firmware forks.
const INFO_TOTAL_TIME_KEYS: &[&str] = &["estimated_time", "slicer_estimated_time", "print_time", "total_time"];

/// The three independent time values shown on the overlay, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeEstimates {
    /// Extrapolated from progress and print duration.
    pub remaining_estimate: Option<f64>,
    /// Slicer total minus print duration.
    pub remaining_slicer: Option<f64>,
    /// Wall-clock time since start, pauses included.
    pub elapsed: Option<f64>,
}

/// Total print time declared by the slicer: metadata first, then the
/// firmware's slicer info.
pub fn slicer_total(stats: &PrintStats, metadata: Option<&SlicerMetadata>) -> Option<f64> {
    metadata
        .and_then(|m| m.estimated_time)
        .filter(|t| *t > 0.0)
        .or_else(|| {
            stats
                .info_map()
                .and_then(|info| first_positive(info, INFO_TOTAL_TIME_KEYS))
        })
}

pub fn elapsed(stats: &PrintStats) -> Option<f64> {
    stats.total_duration.or(stats.print_duration)
}

pub fn slicer_remaining(stats: &PrintStats, metadata: Option<&SlicerMetadata>) -> Option<f64> {
    let total = slicer_total(stats, metadata)?;
    Some((total - stats.print_duration.unwrap_or(0.0)).max(0.0))
}

pub fn estimate(stats: &PrintStats, progress: f64, metadata: Option<&SlicerMetadata>) -> TimeEstimates {
    TimeEstimates {
        remaining_estimate: stats
            .print_duration
            .and_then(|duration| remaining_from_progress(progress, duration)),
        remaining_slicer: slicer_remaining(stats, metadata),
        elapsed: elapsed(stats),
    }
}
