// Shared scripted transport for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use krusty_overlay::client::{MoonrakerApi, Transport, TransportError};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Script {
    json: HashMap<String, Result<Value, TransportError>>,
    bytes: HashMap<String, Vec<u8>>,
    calls: Vec<String>,
}

/// Answers GETs from a path table and records every request. Unknown paths
/// get a 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_json(&self, path: impl Into<String>, value: Value) {
        self.script.lock().unwrap().json.insert(path.into(), Ok(value));
    }

    pub fn on_error(&self, path: impl Into<String>, error: TransportError) {
        self.script.lock().unwrap().json.insert(path.into(), Err(error));
    }

    pub fn on_bytes(&self, path: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.script.lock().unwrap().bytes.insert(path.into(), body.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.script.lock().unwrap().calls.iter().filter(|c| *c == path).count()
    }

    pub fn clear_calls(&self) {
        self.script.lock().unwrap().calls.clear();
    }
}

fn not_found(path: &str) -> TransportError {
    TransportError::Status {
        code: 404,
        url: path.to_string(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(path.to_string());
        script.json.get(path).cloned().unwrap_or_else(|| Err(not_found(path)))
    }

    async fn get_bytes(&self, path: &str, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(path.to_string());
        let mut body = script.bytes.get(path).cloned().ok_or_else(|| not_found(path))?;
        body.truncate(max_bytes);
        Ok(body)
    }
}

pub type Api = MoonrakerApi<MockTransport>;

pub fn api(transport: &MockTransport) -> Api {
    MoonrakerApi::new(transport.clone(), Duration::from_secs(2))
}

pub fn status_path() -> String {
    Api::status_query_path()
}

/// A consolidated status response for a job in `state`.
pub fn status_response(state: &str, file: &str, progress: f64, print_duration: f64) -> Value {
    json!({"result": {"eventtime": 100.0, "status": {
        "print_stats": {
            "state": state,
            "filename": file,
            "print_duration": print_duration,
            "total_duration": print_duration,
            "info": {}
        },
        "display_status": {"progress": progress},
        "virtual_sdcard": {"progress": progress},
        "extruder": {"temperature": 214.6, "target": 215.0},
        "heater_bed": {"temperature": 59.8, "target": 60.0},
        "toolhead": {"position": [10.0, 20.0, 0.0, 100.0]}
    }}})
}

pub fn object_response(name: &str, fields: Value) -> Value {
    json!({"result": {"eventtime": 100.0, "status": {name: fields}}})
}
