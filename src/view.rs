// src/view.rs - Display strings for the overlay and the sinks that receive them
use crate::filename;
use crate::poll::PollOutcome;
use crate::telemetry::{PrintState, TemperatureReading};
use crate::util::{PLACEHOLDER, format_time};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// What the overlay page shows. Every field is already formatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayView {
    pub printer_name: String,
    pub status: String,
    pub error: bool,
    pub progress: String,
    pub progress_ratio: f64,
    pub layers: String,
    pub time_estimate: String,
    pub time_slicer: String,
    pub time_elapsed: String,
    pub hotend: String,
    pub bed: String,
    pub chamber: String,
    pub filename: String,
    /// `data:` URL of the embedded slicer thumbnail.
    pub thumbnail: Option<String>,
    pub thumbnail_visible: bool,
    pub camera_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OverlayView {
    pub fn new(printer_name: impl Into<String>) -> Self {
        Self {
            printer_name: printer_name.into(),
            status: "Connecting".to_string(),
            error: false,
            progress: "0%".to_string(),
            progress_ratio: 0.0,
            layers: PLACEHOLDER.to_string(),
            time_estimate: PLACEHOLDER.to_string(),
            time_slicer: PLACEHOLDER.to_string(),
            time_elapsed: PLACEHOLDER.to_string(),
            hotend: PLACEHOLDER.to_string(),
            bed: PLACEHOLDER.to_string(),
            chamber: PLACEHOLDER.to_string(),
            filename: PLACEHOLDER.to_string(),
            thumbnail: None,
            thumbnail_visible: false,
            camera_url: None,
            updated_at: None,
        }
    }

    fn reset_progress(&mut self) {
        self.progress = "0%".to_string();
        self.progress_ratio = 0.0;
        self.layers = PLACEHOLDER.to_string();
        self.time_estimate = PLACEHOLDER.to_string();
        self.time_slicer = PLACEHOLDER.to_string();
        self.time_elapsed = PLACEHOLDER.to_string();
        self.hide_thumbnail();
    }

    fn hide_thumbnail(&mut self) {
        self.thumbnail = None;
        self.thumbnail_visible = false;
    }

    /// Fold one poll outcome into the view. Errors clear progress fields
    /// but leave temperatures and the camera as they were.
    pub fn apply(&mut self, outcome: &PollOutcome) {
        self.updated_at = Some(Utc::now());
        let status = match outcome {
            PollOutcome::Error(err) => {
                self.status = err.message.clone();
                self.error = true;
                self.reset_progress();
                return;
            }
            PollOutcome::Status(status) => status,
        };

        self.error = false;
        self.status = status.state.label();
        self.hotend = format_temperature(&status.hotend);
        self.bed = format_temperature(&status.bed);
        self.chamber = status
            .chamber
            .as_ref()
            .map(format_temperature)
            .unwrap_or_else(|| PLACEHOLDER.to_string());

        match status.state {
            PrintState::Printing => {
                self.progress = format_percentage(status.percentage);
                self.progress_ratio = status.progress_ratio;
                self.layers = status.layers.display();
                self.time_estimate = format_time(status.times.remaining_estimate);
                self.time_slicer = format_time(status.times.remaining_slicer);
                self.time_elapsed = format_time(status.times.elapsed);
                self.filename = display_filename(status.filename.as_deref());
                self.thumbnail = status.thumbnail.as_ref().map(|t| t.data_url());
                self.thumbnail_visible = self.thumbnail.is_some();
            }
            PrintState::Paused => {
                self.progress = format_percentage(status.percentage);
                self.progress_ratio = status.progress_ratio;
                self.layers = PLACEHOLDER.to_string();
                self.time_estimate = PLACEHOLDER.to_string();
                self.time_slicer = format_time(status.times.remaining_slicer);
                self.time_elapsed = format_time(status.times.elapsed);
                self.filename = display_filename(status.filename.as_deref());
                self.hide_thumbnail();
            }
            PrintState::Other(_) => {
                self.reset_progress();
                self.filename = PLACEHOLDER.to_string();
            }
        }
    }
}

pub fn format_percentage(percentage: f64) -> String {
    let pct = if percentage.is_finite() { percentage.clamp(0.0, 100.0) } else { 0.0 };
    format!("{}%", pct.round() as u32)
}

/// `215°C / 220°C`, or just the current value when no target is set.
pub fn format_temperature(reading: &TemperatureReading) -> String {
    if reading.target > 0.0 {
        format!("{:.0}°C / {:.0}°C", reading.current, reading.target)
    } else {
        format!("{:.0}°C", reading.current)
    }
}

fn display_filename(file: Option<&str>) -> String {
    file.map(filename::basename)
        .map(str::to_string)
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Receives every updated view.
pub trait StatusSink: Send + Sync {
    fn publish(&self, view: &OverlayView);
}

/// Writes a one-line summary of each view to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, view: &OverlayView) {
        if view.error {
            tracing::warn!("[{}] {}", view.printer_name, view.status);
        } else {
            tracing::info!(
                "[{}] {} {} | layer {} | left {} (slicer {}) | elapsed {} | hotend {} | bed {} | chamber {}",
                view.printer_name,
                view.status,
                view.progress,
                view.layers,
                view.time_estimate,
                view.time_slicer,
                view.time_elapsed,
                view.hotend,
                view.bed,
                view.chamber
            );
        }
    }
}

/// Publishes into a `watch` channel, read by the web surface.
#[derive(Debug)]
pub struct WatchSink {
    tx: watch::Sender<OverlayView>,
}

impl WatchSink {
    pub fn new(initial: OverlayView) -> (Self, watch::Receiver<OverlayView>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }
}

impl StatusSink for WatchSink {
    fn publish(&self, view: &OverlayView) {
        self.tx.send_replace(view.clone());
    }
}

/// Fans a view out to several sinks.
pub struct MultiSink(pub Vec<Box<dyn StatusSink>>);

impl StatusSink for MultiSink {
    fn publish(&self, view: &OverlayView) {
        for sink in &self.0 {
            sink.publish(view);
        }
    }
}
