//! Project, directory and configuration records returned by the FMU settings API.

use serde::{Deserialize, Serialize};

/// The configuration file in a `.fmu` directory (stored as `config.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FmuConfig {
    pub version: String,
    pub created_at: String,
    pub created_by: String,
    /// Remaining configuration sections are opaque to this client.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Path where a `.fmu` directory may exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FmuDirPath {
    pub path: String,
}

impl FmuDirPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// The currently opened FMU project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FmuProject {
    pub path: String,
    pub project_dir_name: String,
    pub config: FmuConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read_only: Option<bool>,
}

/// Plain message response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message: String,
}

/// Health check response, e.g. `{"status": "ok"}`.
pub type HealthStatus = std::collections::HashMap<String, String>;
