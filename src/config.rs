//! # Overlay Configuration
//!
//! Printer identity, polling cadence and display flags for one overlay
//! instance. Values are layered: built-in defaults, then the TOML file, then
//! `OVERLAY_*` environment variables, then command-line flags.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [printer]
//! ip = "192.168.1.50"
//! name = "Voron 2.4"
//!
//! [poll]
//! interval_ms = 2000
//!
//! [display]
//! show_chamber = false
//!
//! [camera]
//! url = "http://192.168.1.50/webcam/?action=snapshot"
//! ```

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub web: WebConfig,
}

/// Which printer to watch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: default_port(),
            name: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_catalog_timeout_ms")]
    pub catalog_timeout_ms: u64,
    #[serde(default = "default_header_bytes")]
    pub header_bytes: usize,
    #[serde(default = "default_thumbnail_bytes")]
    pub thumbnail_bytes: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            catalog_timeout_ms: default_catalog_timeout_ms(),
            header_bytes: default_header_bytes(),
            thumbnail_bytes: default_thumbnail_bytes(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub show_chamber: bool,
    #[serde(default = "default_true")]
    pub show_thumbnail: bool,
    #[serde(default = "default_true")]
    pub show_camera: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_chamber: true,
            show_thumbnail: true,
            show_camera: true,
        }
    }
}

/// Camera snapshot feed and its retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_camera_retries")]
    pub max_retries: u32,
    #[serde(default = "default_camera_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_camera_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_retries: default_camera_retries(),
            base_delay_ms: default_camera_base_delay_ms(),
            max_delay_ms: default_camera_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub ip: Option<String>,
    pub name: Option<String>,
    pub interval_ms: Option<u64>,
    pub bind: Option<String>,
    pub no_web: bool,
}

impl Config {
    /// Overlay `OVERLAY_PRINTER_IP`, `OVERLAY_PRINTER_NAME` and `OVERLAY_POLL_MS`.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ip) = lookup("OVERLAY_PRINTER_IP").filter(|v| !v.trim().is_empty()) {
            self.printer.ip = ip.trim().to_string();
        }
        if let Some(name) = lookup("OVERLAY_PRINTER_NAME").filter(|v| !v.trim().is_empty()) {
            self.printer.name = Some(name.trim().to_string());
        }
        if let Some(ms) = lookup("OVERLAY_POLL_MS") {
            match ms.trim().parse() {
                Ok(ms) => self.poll.interval_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid OVERLAY_POLL_MS value '{}'", ms),
            }
        }
    }

    pub fn apply_overrides(&mut self, cli: &CliOverrides) {
        if let Some(ip) = &cli.ip {
            self.printer.ip = ip.clone();
        }
        if let Some(name) = &cli.name {
            self.printer.name = Some(name.clone());
        }
        if let Some(ms) = cli.interval_ms {
            self.poll.interval_ms = ms;
        }
        if let Some(bind) = &cli.bind {
            self.web.bind = bind.clone();
        }
        if cli.no_web {
            self.web.enabled = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.printer.ip.trim().is_empty() {
            return Err(ConfigError::Invalid("printer.ip is not set".to_string()));
        }
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Invalid("poll.interval_ms must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Printer API base URL. An address that already carries a scheme or a
    /// port is used as given.
    pub fn base_url(&self) -> String {
        let ip = self.printer.ip.trim().trim_end_matches('/');
        if ip.contains("://") {
            return ip.to_string();
        }
        // Bracketed IPv6 literals contain colons of their own.
        let has_port = match ip.rfind(']') {
            Some(end) => ip[end..].contains(':'),
            None => ip.contains(':'),
        };
        if has_port {
            format!("http://{ip}")
        } else {
            format!("http://{}:{}", ip, self.printer.port)
        }
    }

    pub fn display_name(&self) -> String {
        self.printer.name.clone().unwrap_or_else(|| self.printer.ip.clone())
    }
}

fn default_port() -> u16 { 7125 }
fn default_interval_ms() -> u64 { 2000 }
fn default_request_timeout_ms() -> u64 { 5000 }
fn default_catalog_timeout_ms() -> u64 { 2000 }
fn default_header_bytes() -> usize { 100 * 1024 }
fn default_thumbnail_bytes() -> usize { 512 * 1024 }
fn default_true() -> bool { true }
fn default_camera_retries() -> u32 { 5 }
fn default_camera_base_delay_ms() -> u64 { 1000 }
fn default_camera_max_delay_ms() -> u64 { 30_000 }
fn default_bind() -> String { "127.0.0.1:7130".to_string() }

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

/// Load the file if it exists, falling back to defaults when it does not,
/// then apply environment and CLI layers and validate the result.
pub fn resolve_config<P: AsRef<Path>>(path: P, cli: &CliOverrides) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        tracing::info!("Loading configuration from: {}", path.display());
        load_config(path)?
    } else {
        tracing::info!("No config file at {}, using defaults", path.display());
        Config::default()
    };
    config.apply_env();
    config.apply_overrides(cli);
    config.validate()?;
    Ok(config)
}
