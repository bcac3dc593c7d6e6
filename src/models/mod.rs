//! Wire-level data model shared by the track registry, the chat surfaces
//! and the real-time channel.
//!
//! Field names and enum spellings match the JSON the backend emits, so these
//! types double as the protocol schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display color for unclassified contacts and `unknownFast`.
pub const UNCLASSIFIED_COLOR: &str = "#d92727";

/// Course-line color for provisional (arrow) contacts, regardless of
/// classification.
pub const ARROW_TRAIL_COLOR: &str = "#7ec8ff";

/// The system's belief about what a contact really is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Identification {
    Drone,
    Plane,
    Bird,
    Rocket,
    Helicopter,
    Jet,
    Missile,
    UnknownFast,
    RadarPoint,
}

impl Identification {
    /// Fixed display-color lookup. Unclassified (`None`) and `UnknownFast`
    /// share the dark-red default; see [`UNCLASSIFIED_COLOR`].
    pub fn color(this: Option<Identification>) -> &'static str {
        match this {
            Some(Identification::Bird) => "#FFA500",       // orange
            Some(Identification::Helicopter) => "#0000FF", // blue
            Some(Identification::Plane) => "#FFC0CB",      // pink
            Some(Identification::Jet) => "#FFFF00",        // yellow
            Some(Identification::Drone) => "#FF0000",      // red
            Some(Identification::Rocket) => "#800080",     // purple
            Some(Identification::Missile) => "#ab21b5",    // magenta
            Some(Identification::RadarPoint) => "#40E0D0", // turquoise
            Some(Identification::UnknownFast) | None => UNCLASSIFIED_COLOR,
        }
    }
}

/// Confirmed and suggested identification for a contact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub current_identification: Option<Identification>,
    #[serde(default)]
    pub suggested_identification: Option<Identification>,
    #[serde(default)]
    pub suggestion_reason: Option<String>,
    #[serde(default)]
    pub certainty_percentage: Option<f64>,
}

/// Marker variant selecting the icon-rendering strategy.
///
/// Unknown wire values deserialize to [`MarkerKind::Unknown`] and are
/// silently dropped on ingest (expected filtering, not an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Star,
    Arrow,
    Jet,
    Plane,
    Drone,
    Bird,
    Missile,
    #[serde(other)]
    Unknown,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Star => "star",
            MarkerKind::Arrow => "arrow",
            MarkerKind::Jet => "jet",
            MarkerKind::Plane => "plane",
            MarkerKind::Drone => "drone",
            MarkerKind::Bird => "bird",
            MarkerKind::Missile => "missile",
            MarkerKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Geographic position: longitude, latitude, altitude in feet.
///
/// The wire format is a `[lon, lat, alt]` array; two-element arrays are
/// accepted with a zero altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 3]")]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
    pub alt_ft: f64,
}

impl Position {
    pub fn new(lon: f64, lat: f64, alt_ft: f64) -> Self {
        Self { lon, lat, alt_ft }
    }

    pub fn lng_lat(&self) -> (f64, f64) {
        (self.lon, self.lat)
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(v: Vec<f64>) -> std::result::Result<Self, Self::Error> {
        match v.as_slice() {
            [lon, lat] => Ok(Position::new(*lon, *lat, 0.0)),
            [lon, lat, alt, ..] => Ok(Position::new(*lon, *lat, *alt)),
            _ => Err(format!("position needs at least 2 coordinates, got {}", v.len())),
        }
    }
}

impl From<Position> for [f64; 3] {
    fn from(p: Position) -> Self {
        [p.lon, p.lat, p.alt_ft]
    }
}

/// One historical position sample belonging to a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotData {
    pub position: Position,
    pub speed: f64,
    pub time: DateTime<Utc>,
    pub color: String,
    pub rotation: f64,
}

/// One question of a guided Q&A script, with its scripted answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub question: String,
    pub answers: Vec<String>,
}

/// Free-form descriptive metadata attached to a track by the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectDescription {
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub avg_speed: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub starting_point: Option<Position>,
    #[serde(default)]
    pub ending_point: Option<Position>,
    #[serde(default)]
    pub total_distance: Option<f64>,
    #[serde(default)]
    pub total_direction_changes: Option<i64>,
    #[serde(default)]
    pub total_speed_changes: Option<i64>,
    #[serde(default)]
    pub total_altitude_changes: Option<i64>,
    #[serde(default)]
    pub current_speed: Option<f64>,
    #[serde(default)]
    pub coming_from: Option<String>,
    #[serde(default)]
    pub moving_to: Option<String>,
    #[serde(default)]
    pub distance_from_origin: Option<f64>,
    #[serde(default)]
    pub origin_country: Option<String>,
}

/// Arbitrary key/value details sent by the backend; `parent_object` links a
/// derived radar-detection point to its source track.
pub type Details = serde_json::Map<String, serde_json::Value>;

/// Inbound `objectChange` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    #[serde(rename = "type")]
    pub kind: MarkerKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plots: Option<Vec<PlotData>>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub description: Option<ObjectDescription>,
    #[serde(default)]
    pub details: Option<Details>,
    #[serde(default)]
    pub radar_detections: Option<Vec<String>>,
    #[serde(default)]
    pub qna: Option<Vec<Step>>,
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
}

impl ObjectUpdate {
    /// Minimal record for construction in tests and drivers.
    pub fn new(kind: MarkerKind, id: Option<&str>, position: Position) -> Self {
        Self {
            kind,
            id: id.map(str::to_string),
            position: Some(position),
            size: None,
            speed: None,
            rotation: None,
            name: None,
            plots: None,
            classification: None,
            description: None,
            details: None,
            radar_detections: None,
            qna: None,
            steps: None,
        }
    }
}

/// Normalized snapshot of a track, handed to chat surfaces on selection and
/// carried by classification events as `objectData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub position: Position,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub description: Option<ObjectDescription>,
    #[serde(default)]
    pub details: Option<Details>,
    #[serde(default)]
    pub radar_detections: Vec<String>,
    #[serde(default)]
    pub qna: Option<Vec<Step>>,
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
    #[serde(default)]
    pub plots: Vec<PlotData>,
    #[serde(default, rename = "plotsVisible")]
    pub plots_visible: bool,
    /// Set by the backend on handoff events that should open a detached
    /// popup surface instead of rendering inline.
    #[serde(default, rename = "autoOpenPopup")]
    pub auto_open_popup: bool,
}

/// Partial field set applied to an existing entity. `None` means "leave
/// untouched".
#[derive(Debug, Clone, Default)]
pub struct TrackPatch {
    pub name: Option<String>,
    pub position: Option<Position>,
    pub size: Option<f64>,
    pub speed: Option<f64>,
    pub rotation: Option<f64>,
    pub classification: Option<Classification>,
    pub description: Option<ObjectDescription>,
    pub details: Option<Details>,
    pub radar_detections: Option<Vec<String>>,
    pub qna: Option<Vec<Step>>,
    pub steps: Option<Vec<Step>>,
    pub plots: Option<Vec<PlotData>>,
}

/// A static radar station: loaded once, toggled on and off, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarStation {
    pub name: String,
    pub position: LatLng,
    /// Detection range in meters.
    pub range: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}
