// src/poll.rs - One status poll cycle: telemetry in, resolved status out
use crate::chamber::ChamberDiscoverer;
use crate::client::{MoonrakerApi, Transport, TransportError};
use crate::filename;
use crate::gcode_header::{self, Thumbnail};
use crate::layers::{self, LayerInfo};
use crate::metadata::{MetadataResolver, SlicerMetadata};
use crate::telemetry::{PrintState, PrinterTelemetry, TemperatureReading};
use crate::time_estimate::{self, TimeEstimates};
use serde::Serialize;
use tokio::sync::Mutex;

/// Everything derived from one telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStatus {
    pub state: PrintState,
    pub progress_ratio: f64,
    pub percentage: f64,
    pub layers: LayerInfo,
    pub times: TimeEstimates,
    pub hotend: TemperatureReading,
    pub bed: TemperatureReading,
    pub chamber: Option<TemperatureReading>,
    /// Normalized path of the file being printed.
    pub filename: Option<String>,
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unreachable,
    Authentication,
    NotFound,
    Connection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorStatus {
    pub kind: ErrorKind,
    pub message: String,
    /// Whether polling again unchanged may recover.
    pub retryable: bool,
}

impl ErrorStatus {
    pub fn from_transport(error: &TransportError, address: &str) -> Self {
        let (kind, message) = match error {
            TransportError::Timeout | TransportError::Connect(_) => {
                (ErrorKind::Unreachable, format!("Unreachable: {address}"))
            }
            TransportError::Status { code: 401 | 403, .. } => (
                ErrorKind::Authentication,
                format!("Authentication failed ({error})"),
            ),
            TransportError::Status { code: 404, .. } => {
                (ErrorKind::NotFound, format!("API not found at {address}"))
            }
            other => (ErrorKind::Connection, format!("Connection error: {other}")),
        };
        Self {
            kind,
            message,
            retryable: error.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Status(ResolvedStatus),
    Error(ErrorStatus),
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub chamber: bool,
    pub thumbnail: bool,
    pub thumbnail_bytes: usize,
    pub header_bytes: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            chamber: true,
            thumbnail: true,
            thumbnail_bytes: 512 * 1024,
            header_bytes: 100 * 1024,
        }
    }
}

/// Thumbnail currently on display and the file it belongs to.
#[derive(Debug, Clone, Default)]
struct ThumbnailSlot {
    filename: Option<String>,
    thumbnail: Option<Thumbnail>,
}

/// Per-printer poll engine. Owns every cache the cycle needs, so separate
/// printers never share state.
pub struct StatusPoller<T> {
    api: MoonrakerApi<T>,
    address: String,
    options: PollOptions,
    metadata: MetadataResolver,
    chamber: ChamberDiscoverer,
    thumbnail: Mutex<ThumbnailSlot>,
}

impl<T: Transport> StatusPoller<T> {
    pub fn new(api: MoonrakerApi<T>, address: impl Into<String>, options: PollOptions) -> Self {
        Self {
            metadata: MetadataResolver::new(options.header_bytes),
            chamber: ChamberDiscoverer::default(),
            thumbnail: Mutex::new(ThumbnailSlot::default()),
            api,
            address: address.into(),
            options,
        }
    }

    pub fn api(&self) -> &MoonrakerApi<T> {
        &self.api
    }

    pub fn metadata(&self) -> &MetadataResolver {
        &self.metadata
    }

    pub fn chamber(&self) -> &ChamberDiscoverer {
        &self.chamber
    }

    /// Run one cycle. Only a failed telemetry fetch yields an error; every
    /// enrichment lookup degrades to a missing field instead.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.api.query_status().await {
            Ok(telemetry) => PollOutcome::Status(self.resolve(&telemetry).await),
            Err(e) => {
                let status = ErrorStatus::from_transport(&e, &self.address);
                tracing::warn!("Status poll failed: {} ({})", status.message, e);
                self.hide_thumbnail().await;
                PollOutcome::Error(status)
            }
        }
    }

    /// Derive a status from one snapshot.
    pub async fn resolve(&self, telemetry: &PrinterTelemetry) -> ResolvedStatus {
        let stats = telemetry.print_stats();
        let state = telemetry.state();
        let file = stats.filename.as_deref().and_then(filename::normalize);

        let chamber = if self.options.chamber {
            self.chamber.temperature(&self.api).await
        } else {
            None
        };

        let mut status = ResolvedStatus {
            state: state.clone(),
            progress_ratio: 0.0,
            percentage: 0.0,
            layers: LayerInfo::default(),
            times: TimeEstimates::default(),
            hotend: telemetry.hotend(),
            bed: telemetry.bed(),
            chamber,
            filename: None,
            thumbnail: None,
        };

        match state {
            PrintState::Printing => {
                let metadata = self.metadata.resolve(&self.api, stats.filename.as_deref(), &state).await;
                let progress = telemetry.progress_ratio();
                status.progress_ratio = progress;
                status.percentage = progress * 100.0;
                status.layers = layers::estimate(stats.info_map(), progress, telemetry.toolhead_z(), metadata.as_ref());
                status.times = time_estimate::estimate(&stats, progress, metadata.as_ref());
                if let Some(file) = &file {
                    status.thumbnail = self.thumbnail_for(file).await;
                }
                status.filename = file;
            }
            PrintState::Paused => {
                let metadata: Option<SlicerMetadata> = self.metadata.cached(stats.filename.as_deref()).await;
                let progress = telemetry.progress_ratio();
                status.progress_ratio = progress;
                status.percentage = progress * 100.0;
                status.times = TimeEstimates {
                    remaining_estimate: None,
                    remaining_slicer: time_estimate::slicer_remaining(&stats, metadata.as_ref()),
                    elapsed: time_estimate::elapsed(&stats),
                };
                status.filename = file;
                self.hide_thumbnail().await;
            }
            PrintState::Other(_) => {
                self.hide_thumbnail().await;
            }
        }

        tracing::debug!(
            "Cycle: state={} progress={:.1}% layers={} file={:?}",
            status.state.as_str(),
            status.percentage,
            status.layers.display(),
            status.filename
        );
        status
    }

    /// Thumbnail for `file`, fetched only when the file differs from the one
    /// already on display.
    async fn thumbnail_for(&self, file: &str) -> Option<Thumbnail> {
        if !self.options.thumbnail {
            return None;
        }
        {
            let slot = self.thumbnail.lock().await;
            if slot.filename.as_deref() == Some(file) {
                return slot.thumbnail.clone();
            }
        }
        let thumbnail = self.load_thumbnail(file).await;
        *self.thumbnail.lock().await = ThumbnailSlot {
            filename: Some(file.to_string()),
            thumbnail: thumbnail.clone(),
        };
        thumbnail
    }

    async fn load_thumbnail(&self, file: &str) -> Option<Thumbnail> {
        for candidate in crate::metadata::header_candidates(file) {
            match self.api.fetch_file_head(&candidate, self.options.thumbnail_bytes).await {
                Ok(text) => {
                    if let Some(thumb) = gcode_header::extract_thumbnail(&text) {
                        tracing::info!("Loaded {}x{} thumbnail for {}", thumb.width, thumb.height, file);
                        return Some(thumb);
                    }
                }
                Err(e) => tracing::debug!("Thumbnail fetch for {} failed: {}", candidate, e),
            }
        }
        None
    }

    async fn hide_thumbnail(&self) {
        *self.thumbnail.lock().await = ThumbnailSlot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let addr = "192.168.1.50";
        let e = ErrorStatus::from_transport(&TransportError::Connect("refused".into()), addr);
        assert_eq!(e.kind, ErrorKind::Unreachable);
        assert_eq!(e.message, "Unreachable: 192.168.1.50");
        assert!(e.retryable);

        let e = ErrorStatus::from_transport(&TransportError::Status { code: 403, url: "u".into() }, addr);
        assert_eq!(e.kind, ErrorKind::Authentication);
        assert!(!e.retryable);

        let e = ErrorStatus::from_transport(&TransportError::Status { code: 404, url: "u".into() }, addr);
        assert_eq!(e.kind, ErrorKind::NotFound);

        let e = ErrorStatus::from_transport(&TransportError::Decode("garbage".into()), addr);
        assert_eq!(e.kind, ErrorKind::Connection);
        assert!(e.message.contains("garbage"));
    }
}
