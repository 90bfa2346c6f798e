// src/telemetry.rs - Printer object snapshot returned by the consolidated status query
use crate::client::TransportError;
use crate::util::{clamp01, to_number};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Objects requested from the printer on every poll.
pub const STATUS_OBJECTS: &[&str] = &[
    "print_stats",
    "display_status",
    "virtual_sdcard",
    "extruder",
    "heater_bed",
    "toolhead",
];

// Firmware occasionally reports numbers as strings, or null while idle.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(to_number(&value))
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PrintStats {
    pub state: Option<String>,
    pub filename: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub print_duration: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub total_duration: Option<f64>,
    /// Slicer-provided layer info (`current_layer`, `total_layer`, ...).
    pub info: Value,
}

impl PrintStats {
    pub fn info_map(&self) -> Option<&Map<String, Value>> {
        self.info.as_object()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProgressObject {
    #[serde(deserialize_with = "lenient_number")]
    pub progress: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaterObject {
    #[serde(deserialize_with = "lenient_number")]
    pub temperature: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Toolhead {
    pub position: Option<Vec<Value>>,
}

/// One consolidated telemetry snapshot. Produced fresh on every poll.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PrinterTelemetry {
    pub print_stats: Option<PrintStats>,
    pub display_status: Option<ProgressObject>,
    pub virtual_sdcard: Option<ProgressObject>,
    pub extruder: Option<HeaterObject>,
    pub heater_bed: Option<HeaterObject>,
    pub toolhead: Option<Toolhead>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintState {
    Printing,
    Paused,
    /// Anything else the firmware reports (`standby`, `complete`, `error`, ...).
    Other(String),
}

impl Serialize for PrintState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl PrintState {
    pub fn as_str(&self) -> &str {
        match self {
            PrintState::Printing => "printing",
            PrintState::Paused => "paused",
            PrintState::Other(raw) => raw,
        }
    }

    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "printing" => PrintState::Printing,
            Some(s) if s == "paused" => PrintState::Paused,
            Some(s) if !s.is_empty() => PrintState::Other(s),
            _ => PrintState::Other("unknown".to_string()),
        }
    }

    pub fn is_printing(&self) -> bool {
        matches!(self, PrintState::Printing)
    }

    pub fn label(&self) -> String {
        match self {
            PrintState::Printing => "Printing".to_string(),
            PrintState::Paused => "Paused".to_string(),
            PrintState::Other(raw) => {
                let mut chars = raw.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => "Idle".to_string(),
                }
            }
        }
    }
}

/// Current/target pair for a heater or sensor, in °C.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub current: f64,
    pub target: f64,
}

impl PrinterTelemetry {
    /// Decode the `{result: {status: {...}}}` envelope of an objects query.
    pub fn from_response(response: Value) -> Result<Self, TransportError> {
        let status = response
            .get("result")
            .and_then(|r| r.get("status"))
            .cloned()
            .ok_or_else(|| TransportError::Decode("response has no result.status".to_string()))?;
        serde_json::from_value(status).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub fn print_stats(&self) -> PrintStats {
        self.print_stats.clone().unwrap_or_default()
    }

    pub fn state(&self) -> PrintState {
        PrintState::from_raw(self.print_stats.as_ref().and_then(|p| p.state.as_deref()))
    }

    /// Progress ratio preferring the byte-position based SD card value.
    pub fn progress_ratio(&self) -> f64 {
        let sdcard = self.virtual_sdcard.as_ref().and_then(|p| p.progress);
        let display = self.display_status.as_ref().and_then(|p| p.progress);
        clamp01(sdcard.or(display).unwrap_or(0.0))
    }

    pub fn toolhead_z(&self) -> Option<f64> {
        self.toolhead
            .as_ref()
            .and_then(|t| t.position.as_ref())
            .and_then(|p| p.get(2))
            .and_then(to_number)
    }

    pub fn hotend(&self) -> TemperatureReading {
        heater_reading(self.extruder.as_ref())
    }

    pub fn bed(&self) -> TemperatureReading {
        heater_reading(self.heater_bed.as_ref())
    }
}

fn heater_reading(heater: Option<&HeaterObject>) -> TemperatureReading {
    let heater = heater.cloned().unwrap_or_default();
    TemperatureReading {
        current: heater.temperature.unwrap_or(0.0),
        target: heater.target.unwrap_or(0.0),
    }
}
