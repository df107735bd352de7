//! Builders for test inputs.

#![allow(dead_code)]

use certflow::lifecycle::GpsCoordinates;
use serde_json::{json, Map, Value};

/// Builds checklist answer documents.
pub struct ChecklistBuilder {
    answers: Map<String, Value>,
}

impl ChecklistBuilder {
    pub fn new() -> Self {
        Self { answers: Map::new() }
    }

    pub fn item(mut self, key: &str, answer: &str) -> Self {
        self.answers.insert(key.to_string(), json!(answer));
        self
    }

    pub fn remark(mut self, key: &str, answer: &str, remark: &str) -> Self {
        self.answers
            .insert(key.to_string(), json!({ "answer": answer, "remark": remark }));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.answers)
    }
}

impl Default for ChecklistBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GpsBuilder {
    latitude: f64,
    longitude: f64,
}

impl GpsBuilder {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Port of Hamburg.
    pub fn hamburg() -> Self {
        Self::at(53.5461, 9.9661)
    }

    pub fn build(self) -> GpsCoordinates {
        GpsCoordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Builds JSON config documents.
pub struct ConfigBuilder {
    version: String,
    database_path: Option<String>,
    busy_timeout_ms: u64,
    log_level: String,
    log_format: String,
    channel_capacity: usize,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            busy_timeout_ms: 1_000,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            channel_capacity: 16,
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn database_path(mut self, path: &str) -> Self {
        self.database_path = Some(path.to_string());
        self
    }

    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn log_format(mut self, format: &str) -> Self {
        self.log_format = format.to_string();
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> String {
        let mut database = json!({ "busyTimeoutMs": self.busy_timeout_ms });
        if let Some(path) = self.database_path {
            database["path"] = json!(path);
        }
        json!({
            "version": self.version,
            "database": database,
            "logging": { "level": self.log_level, "format": self.log_format },
            "events": { "channelCapacity": self.channel_capacity },
        })
        .to_string()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
