//! Rendering surface abstraction.
//!
//! The engine never draws; it emits markers and vector layers to a
//! [`MapSurface`] and lets the binding decide how to paint them. Two
//! implementations ship with the crate: [`NullSurface`] discards everything,
//! [`RecordingSurface`] keeps the retained scene for tests and for the CLI's
//! state dumps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::MarkerKind;

/// Attention badge rendered next to a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    #[default]
    None,
    /// Single amber "!": unclassified or low-confidence contact.
    Attention,
    /// Double red "!!": a suggested identification is waiting for review.
    Suggestion,
}

/// Everything a binding needs to draw one marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerAppearance {
    pub kind: MarkerKind,
    pub lng: f64,
    pub lat: f64,
    pub color: String,
    pub size: f64,
    /// Stored rotation in degrees. Arrow markers store course minus 90 so
    /// the glyph's native orientation lines up; other kinds store the raw
    /// course.
    pub rotation: f64,
    /// `None` suppresses the label entirely.
    pub label: Option<String>,
    pub badge: Badge,
    pub selected: bool,
}

/// Retained vector layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    /// Polyline through `(lng, lat)` coordinates.
    Line {
        coords: Vec<(f64, f64)>,
        color: String,
        width: f64,
        dashed: bool,
    },
    /// Point cloud at `(lng, lat)` coordinates.
    Points {
        coords: Vec<(f64, f64)>,
        color: String,
        radius: f64,
    },
    /// Closed ring with a translucent fill and an outline.
    Ring {
        coords: Vec<(f64, f64)>,
        fill_color: String,
        fill_opacity: f64,
        outline_color: String,
    },
}

/// Retained-mode drawing target.
///
/// Layer installation can fail while the surface is still loading;
/// `add_layer` reports success so callers can retry.
pub trait MapSurface {
    fn upsert_marker(&mut self, id: &str, appearance: MarkerAppearance);
    fn remove_marker(&mut self, id: &str);
    /// Install or replace a layer. Returns `false` when the surface is not
    /// ready to accept layers yet.
    fn add_layer(&mut self, id: &str, layer: LayerSpec) -> bool;
    fn remove_layer(&mut self, id: &str);
    fn has_layer(&self, id: &str) -> bool;
}

/// Discards everything. Layer installs always succeed.
#[derive(Debug, Default)]
pub struct NullSurface;

impl MapSurface for NullSurface {
    fn upsert_marker(&mut self, _id: &str, _appearance: MarkerAppearance) {}
    fn remove_marker(&mut self, _id: &str) {}
    fn add_layer(&mut self, _id: &str, _layer: LayerSpec) -> bool {
        true
    }
    fn remove_layer(&mut self, _id: &str) {}
    fn has_layer(&self, _id: &str) -> bool {
        false
    }
}

/// Keeps the retained scene in memory. `ready` starts true; tests flip it
/// off to exercise layer-install retries.
#[derive(Debug)]
pub struct RecordingSurface {
    pub ready: bool,
    markers: BTreeMap<String, MarkerAppearance>,
    layers: BTreeMap<String, LayerSpec>,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self {
            ready: true,
            markers: BTreeMap::new(),
            layers: BTreeMap::new(),
        }
    }
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, id: &str) -> Option<&MarkerAppearance> {
        self.markers.get(id)
    }

    pub fn markers(&self) -> &BTreeMap<String, MarkerAppearance> {
        &self.markers
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.get(id)
    }

    pub fn layers(&self) -> &BTreeMap<String, LayerSpec> {
        &self.layers
    }
}

impl MapSurface for RecordingSurface {
    fn upsert_marker(&mut self, id: &str, appearance: MarkerAppearance) {
        self.markers.insert(id.to_string(), appearance);
    }

    fn remove_marker(&mut self, id: &str) {
        self.markers.remove(id);
    }

    fn add_layer(&mut self, id: &str, layer: LayerSpec) -> bool {
        if !self.ready {
            return false;
        }
        self.layers.insert(id.to_string(), layer);
        true
    }

    fn remove_layer(&mut self, id: &str) {
        self.layers.remove(id);
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.contains_key(id)
    }
}
