// src/chamber.rs - Temperature object probing and chamber sensor discovery
//
// Klipper has no standard name for a chamber sensor, so we look for one
// among the usual naming conventions and remember the first that works.

use crate::client::{MoonrakerApi, Transport};
use crate::telemetry::TemperatureReading;
use crate::util::to_number;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// How long a fetched object catalog is reused.
pub const CATALOG_TTL: Duration = Duration::from_secs(30);

/// Chamber sensor names tried in order.
pub const CHAMBER_SENSOR_CANDIDATES: &[&str] = &[
    "temperature_sensor chamber",
    "temperature_sensor chamber_temp",
    "temperature_sensor chamber_temperature",
    "heater_generic chamber",
    "heater_generic chamber_heater",
    "temperature_fan chamber",
    "temperature_fan chamber_fan",
    "temperature_sensor enclosure",
    "temperature_sensor enclosure_temp",
];

const CURRENT_KEYS: &[&str] = &["temperature", "temp", "current", "temper"];
const TARGET_KEYS: &[&str] = &["target", "target_temp", "target_temperature"];

/// Parse a sensor object's fields into a reading. The target falls back
/// to the current temperature for sensors without one.
pub fn parse_reading(fields: &Value) -> Option<TemperatureReading> {
    let object = fields.as_object()?;
    let current = CURRENT_KEYS.iter().find_map(|k| object.get(*k).and_then(to_number))?;
    let target = TARGET_KEYS
        .iter()
        .find_map(|k| object.get(*k).and_then(to_number))
        .unwrap_or(current);
    Some(TemperatureReading { current, target })
}

/// Query one object and parse its temperature. Failures read as `None`.
pub async fn probe_temperature<T: Transport>(api: &MoonrakerApi<T>, name: &str) -> Option<TemperatureReading> {
    match api.query_object(name).await {
        Ok(Some(fields)) => parse_reading(&fields),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("Temperature query for '{}' failed: {}", name, e);
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChamberCache {
    /// First sensor that produced a reading. Never expires.
    pub object_name: Option<String>,
    /// Object catalog and when it was fetched.
    pub catalog: Option<(Vec<String>, Instant)>,
}

#[derive(Debug)]
pub struct ChamberDiscoverer {
    cache: Mutex<ChamberCache>,
    catalog_ttl: Duration,
}

impl Default for ChamberDiscoverer {
    fn default() -> Self {
        Self::new(CATALOG_TTL)
    }
}

impl ChamberDiscoverer {
    pub fn new(catalog_ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(ChamberCache::default()),
            catalog_ttl,
        }
    }

    pub async fn sensor_name(&self) -> Option<String> {
        self.cache.lock().await.object_name.clone()
    }

    /// Current chamber reading, discovering the sensor on first use.
    pub async fn temperature<T: Transport>(&self, api: &MoonrakerApi<T>) -> Option<TemperatureReading> {
        if let Some(name) = self.sensor_name().await {
            return probe_temperature(api, &name).await;
        }

        if let Some(catalog) = self.catalog(api).await {
            if let Some(name) = match_catalog(&catalog) {
                tracing::info!("Chamber sensor found in object list: {}", name);
                self.remember(&name).await;
                return probe_temperature(api, &name).await;
            }
        }

        for candidate in CHAMBER_SENSOR_CANDIDATES {
            if let Some(reading) = probe_temperature(api, candidate).await {
                tracing::info!("Chamber sensor found by probing: {}", candidate);
                self.remember(candidate).await;
                return Some(reading);
            }
        }
        None
    }

    async fn remember(&self, name: &str) {
        self.cache.lock().await.object_name = Some(name.to_string());
    }

    async fn catalog<T: Transport>(&self, api: &MoonrakerApi<T>) -> Option<Vec<String>> {
        {
            let cache = self.cache.lock().await;
            if let Some((objects, fetched_at)) = &cache.catalog {
                if fetched_at.elapsed() < self.catalog_ttl {
                    return Some(objects.clone());
                }
            }
        }
        match api.list_objects().await {
            Ok(objects) => {
                tracing::debug!("Fetched object list ({} objects)", objects.len());
                self.cache.lock().await.catalog = Some((objects.clone(), Instant::now()));
                Some(objects)
            }
            Err(e) => {
                tracing::debug!("Object list unavailable: {}", e);
                None
            }
        }
    }
}

/// First known chamber name present in the catalog, compared without case.
/// Returns the catalog's spelling.
pub fn match_catalog(catalog: &[String]) -> Option<String> {
    CHAMBER_SENSOR_CANDIDATES.iter().find_map(|candidate| {
        catalog
            .iter()
            .find(|object| object.eq_ignore_ascii_case(candidate))
            .cloned()
    })
}
