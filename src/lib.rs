// krusty_overlay: Moonraker status normalization and metadata inference for a print overlay

pub mod util;
pub mod filename;
pub mod gcode_header;
pub mod telemetry;
pub mod client;
pub mod metadata;
pub mod layers;
pub mod time_estimate;
pub mod chamber;
pub mod poll;
pub mod view;
pub mod camera;
pub mod config;
pub mod web;
pub mod runner;

pub use client::{HttpTransport, MoonrakerApi, Transport, TransportError};
pub use config::{Config, ConfigError};
pub use poll::{PollOptions, PollOutcome, ResolvedStatus, StatusPoller};
pub use view::{OverlayView, StatusSink};
