//! Local snapshot and export document formats.

use serde::{Deserialize, Serialize};

use crate::shapes::Element;
use crate::snap::GridSettings;
use crate::tools::StyleDefaults;

/// Format tag of exported room documents.
pub const EXPORT_TYPE: &str = "inkroom";

/// Version of the export document layout.
pub const EXPORT_VERSION: u32 = 2;

/// Per-client state persisted alongside the elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    pub defaults: StyleDefaults,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub zoom: f64,
    pub grid: GridSettings,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            defaults: StyleDefaults::default(),
            scroll_x: 0.0,
            scroll_y: 0.0,
            zoom: 1.0,
            grid: GridSettings::default(),
        }
    }
}

/// `{ elements, appState }`, the locally persisted scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSnapshot {
    pub elements: Vec<Element>,
    #[serde(default)]
    pub app_state: AppState,
}

impl LocalSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse a snapshot, falling back to an empty one when it is corrupted.
    pub fn load_or_default(json: &str) -> Self {
        match Self::from_json(json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("discarding unreadable snapshot: {e}");
                Self::default()
            }
        }
    }
}

/// Downloadable room export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub source: String,
    pub elements: Vec<Element>,
}

impl ExportDocument {
    /// Export the live elements; tombstones are dropped.
    pub fn new(source: impl Into<String>, elements: impl IntoIterator<Item = Element>) -> Self {
        Self {
            kind: EXPORT_TYPE.to_string(),
            version: EXPORT_VERSION,
            source: source.into(),
            elements: elements.into_iter().filter(|e| !e.is_deleted).collect(),
        }
    }
}
