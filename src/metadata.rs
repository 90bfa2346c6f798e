// src/metadata.rs - Slicer metadata resolution with a single-file cache
use crate::client::{MoonrakerApi, Transport};
use crate::filename;
use crate::gcode_header;
use crate::telemetry::PrintState;
use crate::util::{first_positive, layer_count_from_geometry};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

/// Slicer-derived facts about the file being printed. Any subset of the
/// fields may be known.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SlicerMetadata {
    pub layer_height: Option<f64>,
    pub first_layer_height: Option<f64>,
    pub layer_count: Option<f64>,
    pub object_height: Option<f64>,
    /// Total print time estimated by the slicer, in seconds.
    pub estimated_time: Option<f64>,
}

impl SlicerMetadata {
    pub fn is_empty(&self) -> bool {
        self.layer_height.is_none()
            && self.first_layer_height.is_none()
            && self.layer_count.is_none()
            && self.object_height.is_none()
            && self.estimated_time.is_none()
    }

    /// Read the metadata object returned by the file manager. Different
    /// slicers and API versions use different names for the same field.
    pub fn from_api(result: &Value) -> Option<Self> {
        let object = result.as_object()?;
        let positive = |keys: &[&str]| first_positive(object, keys);
        let meta = Self {
            layer_height: positive(&["layer_height"]),
            first_layer_height: positive(&["first_layer_height"]),
            layer_count: positive(&["layer_count", "total_layers", "layers"]),
            object_height: positive(&["object_height", "max_z", "height"]),
            estimated_time: positive(&["estimated_time", "slicer_estimated_time", "print_time", "total_time"]),
        };
        (!meta.is_empty()).then_some(meta)
    }

    /// First-layer height used for geometry, falling back to the regular
    /// layer height.
    pub fn effective_first_layer(&self) -> Option<f64> {
        self.first_layer_height.or(self.layer_height)
    }

    /// Total layer count, either declared or implied by the geometry.
    pub fn total_layers(&self) -> Option<u32> {
        if let Some(count) = self.layer_count.filter(|c| *c >= 0.0) {
            return Some(count.round() as u32);
        }
        let lh = self.layer_height?;
        layer_count_from_geometry(self.object_height?, self.effective_first_layer()?, lh)
    }

    /// Fill in what the filename conventions and the other fields imply.
    /// Explicit values are never overwritten.
    pub fn backfill(&mut self, file: &str) {
        if self.layer_height.is_none() {
            self.layer_height = filename::infer_layer_height(file);
        }
        if self.layer_height.is_none() {
            if let (Some(height), Some(count)) = (self.object_height, self.layer_count.filter(|c| *c > 0.0)) {
                self.layer_height = Some(height / count);
            }
        }
        if self.layer_count.is_none() {
            if let (Some(height), Some(lh)) = (self.object_height, self.layer_height) {
                let first = self.first_layer_height.unwrap_or(lh);
                self.layer_count = layer_count_from_geometry(height, first, lh).map(f64::from);
            }
        }
        if self.object_height.is_none() {
            if let (Some(lh), Some(count)) = (self.layer_height, self.layer_count) {
                self.object_height = Some(lh * count);
            }
        }
        if self.estimated_time.is_none() {
            self.estimated_time = filename::infer_duration(file);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataSource {
    Api,
    GcodeHeader,
}

/// Single cache slot, valid only for the file named in `filename`.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    pub filename: Option<String>,
    pub data: Option<SlicerMetadata>,
    pub source: Option<MetadataSource>,
}

impl MetadataCache {
    /// Cached data, if it belongs to `file`.
    pub fn data_for(&self, file: &str) -> Option<&SlicerMetadata> {
        match &self.filename {
            Some(cached) if cached == file => self.data.as_ref(),
            _ => None,
        }
    }
}

/// Resolves metadata for the printing file from the file API, then the
/// G-code header, then filename conventions.
///
/// The cache is only ever replaced, never merged across files. A fetch that
/// finishes after the printer moved on to another file still writes its slot,
/// but readers always check the filename before trusting the data.
#[derive(Debug)]
pub struct MetadataResolver {
    cache: Mutex<MetadataCache>,
    header_bytes: usize,
}

impl MetadataResolver {
    pub fn new(header_bytes: usize) -> Self {
        Self {
            cache: Mutex::new(MetadataCache::default()),
            header_bytes,
        }
    }

    /// Cached metadata for `raw_file`, without any network access.
    pub async fn cached(&self, raw_file: Option<&str>) -> Option<SlicerMetadata> {
        let file = filename::normalize(raw_file?)?;
        self.cache.lock().await.data_for(&file).cloned()
    }

    pub async fn source(&self) -> Option<MetadataSource> {
        self.cache.lock().await.source
    }

    pub async fn snapshot(&self) -> MetadataCache {
        self.cache.lock().await.clone()
    }

    /// Resolve metadata for the file being printed. Reuses the cache when it
    /// already holds data for this file, and does nothing unless printing.
    pub async fn resolve<T: Transport>(
        &self,
        api: &MoonrakerApi<T>,
        raw_file: Option<&str>,
        state: &PrintState,
    ) -> Option<SlicerMetadata> {
        if !state.is_printing() {
            return self.cached(raw_file).await;
        }
        let file = filename::normalize(raw_file?)?;
        if let Some(hit) = self.cache.lock().await.data_for(&file) {
            return Some(hit.clone());
        }

        tracing::debug!("Metadata cache miss for {}", file);
        let (data, source) = match self.lookup_api(api, &file).await {
            Some(meta) => (Some(meta), Some(MetadataSource::Api)),
            None => match self.lookup_header(api, &file).await {
                Some(meta) => (Some(meta), Some(MetadataSource::GcodeHeader)),
                None => (None, None),
            },
        };
        // With no other source the filename conventions still apply.
        let mut meta = data.unwrap_or_default();
        meta.backfill(filename::basename(&file));
        let data = (!meta.is_empty()).then_some(meta);
        match (&data, source) {
            (Some(_), Some(source)) => tracing::info!("Loaded metadata for {} from {:?}", file, source),
            (Some(_), None) => tracing::info!("Inferred metadata for {} from its filename", file),
            (None, _) => tracing::debug!("No metadata available for {}", file),
        }

        *self.cache.lock().await = MetadataCache {
            filename: Some(file),
            data: data.clone(),
            source,
        };
        data
    }

    async fn lookup_api<T: Transport>(&self, api: &MoonrakerApi<T>, file: &str) -> Option<SlicerMetadata> {
        match api.file_metadata(file).await {
            Ok(Some(result)) => SlicerMetadata::from_api(&result),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("Metadata API lookup for {} failed: {}", file, e);
                None
            }
        }
    }

    async fn lookup_header<T: Transport>(&self, api: &MoonrakerApi<T>, file: &str) -> Option<SlicerMetadata> {
        for candidate in header_candidates(file) {
            match api.fetch_file_head(&candidate, self.header_bytes).await {
                Ok(text) => {
                    if let Some(meta) = gcode_header::parse(&text) {
                        return Some(meta);
                    }
                }
                Err(e) => tracing::debug!("Header fetch for {} failed: {}", candidate, e),
            }
        }
        None
    }
}

/// Root-relative locations to try when downloading the raw file.
pub fn header_candidates(file: &str) -> Vec<String> {
    let mut candidates = vec![format!("gcodes/{file}"), file.to_string()];
    let base = filename::basename(file);
    if base != file {
        candidates.push(format!("gcodes/{base}"));
    }
    candidates
}
