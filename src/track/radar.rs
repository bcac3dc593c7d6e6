//! Static radar stations and their range rings.

use std::f64::consts::PI;

use crate::map::{LayerSpec, MapSurface, MarkerAppearance};
use crate::models::{MarkerKind, RadarStation};

const RANGE_SEGMENTS: usize = 64;
/// Rough conversion: one degree of latitude is about 111.32 km.
const METERS_PER_DEGREE: f64 = 111_320.0;
const RADAR_COLOR: &str = "#3b82f6";

pub fn marker_id(name: &str) -> String {
    format!("radar-{name}")
}

pub fn range_ring_id(name: &str) -> String {
    format!("radar-range-{name}")
}

/// Closed range ring around `station`, as `(lng, lat)` coordinates. The
/// longitude radius is widened by the latitude cosine so the ring stays
/// visually circular away from the equator.
pub fn range_ring_coords(station: &RadarStation) -> Vec<(f64, f64)> {
    let radius_deg = station.range / METERS_PER_DEGREE;
    let lat_rad = station.position.lat * PI / 180.0;
    (0..=RANGE_SEGMENTS)
        .map(|i| {
            let angle = i as f64 / RANGE_SEGMENTS as f64 * 2.0 * PI;
            let lat = station.position.lat + radius_deg * angle.cos();
            let lng = station.position.lng + radius_deg * angle.sin() / lat_rad.cos();
            (lng, lat)
        })
        .collect()
}

/// The loaded radar picture and its visibility toggle.
#[derive(Debug, Default)]
pub struct RadarField {
    stations: Vec<RadarStation>,
    visible: bool,
}

impl RadarField {
    pub fn new(stations: Vec<RadarStation>) -> Self {
        Self {
            stations,
            visible: false,
        }
    }

    pub fn stations(&self) -> &[RadarStation] {
        &self.stations
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Show or hide every station. Returns the new visibility.
    pub fn toggle(&mut self, surface: &mut dyn MapSurface) -> bool {
        self.visible = !self.visible;
        if self.visible {
            for station in &self.stations {
                surface.upsert_marker(
                    &marker_id(&station.name),
                    MarkerAppearance {
                        kind: MarkerKind::Star,
                        lng: station.position.lng,
                        lat: station.position.lat,
                        color: RADAR_COLOR.to_string(),
                        size: 40.0,
                        rotation: 0.0,
                        label: Some(station.name.to_uppercase()),
                        badge: crate::map::Badge::None,
                        selected: false,
                    },
                );
                surface.add_layer(
                    &range_ring_id(&station.name),
                    LayerSpec::Ring {
                        coords: range_ring_coords(station),
                        fill_color: RADAR_COLOR.to_string(),
                        fill_opacity: 0.1,
                        outline_color: RADAR_COLOR.to_string(),
                    },
                );
            }
        } else {
            for station in &self.stations {
                surface.remove_marker(&marker_id(&station.name));
                surface.remove_layer(&range_ring_id(&station.name));
            }
        }
        self.visible
    }
}
