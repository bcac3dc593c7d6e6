//! A single live track and its derived presentation.

use chrono::{DateTime, Duration, Utc};

use crate::geo::smoothing::{smooth_path, TrackPoint};
use crate::map::{Badge, MarkerAppearance};
use crate::models::{
    Classification, Details, Identification, MarkerKind, ObjectDescription, ObjectInfo,
    ObjectUpdate, PlotData, Position, Step, TrackPatch, ARROW_TRAIL_COLOR,
};

const DEFAULT_SIZE: f64 = 10.0;

/// One tracked contact plus everything needed to render it.
#[derive(Debug, Clone)]
pub struct TrackEntity {
    pub id: String,
    pub kind: MarkerKind,
    pub name: Option<String>,
    pub position: Position,
    pub size: f64,
    pub speed: f64,
    /// Stored rotation in degrees. Provisional arrows store course minus 90;
    /// every other kind stores the raw course.
    pub rotation: f64,
    pub classification: Option<Classification>,
    pub description: Option<ObjectDescription>,
    pub details: Option<Details>,
    pub radar_detections: Vec<String>,
    pub qna: Option<Vec<Step>>,
    pub steps: Option<Vec<Step>>,
    pub plots: Vec<PlotData>,
    pub plots_visible: bool,
    pub last_update: DateTime<Utc>,
}

fn stored_rotation(kind: MarkerKind, raw: f64) -> f64 {
    match kind {
        MarkerKind::Arrow => raw - 90.0,
        _ => raw,
    }
}

/// Normalize a wire position: altitude is rounded to whole feet.
fn normalize_position(mut p: Position) -> Position {
    p.alt_ft = p.alt_ft.round();
    p
}

impl TrackEntity {
    /// Build from a create record. Speed and altitude are rounded on the
    /// way in; `steps` falls back to `qna` when absent.
    pub fn from_update(id: String, update: &ObjectUpdate, now: DateTime<Utc>) -> Self {
        let qna = update.qna.clone();
        let steps = update.steps.clone().or_else(|| qna.clone());
        Self {
            id,
            kind: update.kind,
            name: update.name.clone(),
            position: normalize_position(
                update.position.unwrap_or(Position::new(0.0, 0.0, 0.0)),
            ),
            size: update.size.unwrap_or(DEFAULT_SIZE),
            speed: update.speed.unwrap_or(0.0).round(),
            rotation: stored_rotation(update.kind, update.rotation.unwrap_or(0.0)),
            classification: update.classification.clone(),
            description: update.description.clone(),
            details: update.details.clone(),
            radar_detections: update.radar_detections.clone().unwrap_or_default(),
            qna,
            steps,
            plots: update.plots.clone().unwrap_or_default(),
            plots_visible: false,
            last_update: now,
        }
    }

    /// Apply a partial update and refresh the expiry clock. Absent fields
    /// leave the entity untouched.
    pub fn apply(&mut self, patch: TrackPatch, now: DateTime<Utc>) {
        self.last_update = now;
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(position) = patch.position {
            self.position = normalize_position(position);
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(speed) = patch.speed {
            self.speed = speed.round();
        }
        if let Some(rotation) = patch.rotation {
            if self.kind != MarkerKind::Star {
                self.rotation = stored_rotation(self.kind, rotation);
            }
        }
        if let Some(classification) = patch.classification {
            self.classification = Some(classification);
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(details) = patch.details {
            self.details = Some(details);
        }
        if let Some(radar_detections) = patch.radar_detections {
            self.radar_detections = radar_detections;
        }
        let qna_update = patch.qna.clone();
        if let Some(qna) = patch.qna {
            self.qna = Some(qna);
        }
        if let Some(steps) = patch.steps {
            self.steps = Some(steps);
        } else if self.steps.is_none() {
            if let Some(qna) = qna_update {
                self.steps = Some(qna);
            }
        }
        if let Some(plots) = patch.plots {
            self.plots = plots;
        }
    }

    pub fn current_identification(&self) -> Option<Identification> {
        self.classification
            .as_ref()
            .and_then(|c| c.current_identification)
    }

    pub fn is_radar_point(&self) -> bool {
        self.current_identification() == Some(Identification::RadarPoint)
    }

    /// Display color from the confirmed identification.
    pub fn color(&self) -> &'static str {
        Identification::color(self.current_identification())
    }

    /// Trail color: provisional arrows always use light blue, everything
    /// else follows the marker color.
    pub fn trail_color(&self) -> &'static str {
        match self.kind {
            MarkerKind::Arrow => ARROW_TRAIL_COLOR,
            _ => self.color(),
        }
    }

    /// Attention badge next to the marker.
    pub fn badge(&self) -> Badge {
        match self.classification.as_ref() {
            Some(c) if c.suggested_identification.is_some() => Badge::Suggestion,
            Some(c) => match c.current_identification {
                None
                | Some(Identification::UnknownFast)
                | Some(Identification::RadarPoint) => Badge::Attention,
                Some(_) => Badge::None,
            },
            None => Badge::Attention,
        }
    }

    /// Label lines, or `None` for kinds that never carry a label.
    pub fn label(&self) -> Option<String> {
        if self.kind == MarkerKind::Star || self.is_radar_point() {
            return None;
        }
        let mut lines = Vec::with_capacity(3);
        if let Some(name) = &self.name {
            lines.push(name.clone());
        }
        lines.push(format_altitude(self.position.alt_ft));
        lines.push(format!("{}kn", self.speed.round()));
        Some(lines.join("\n"))
    }

    pub fn appearance(&self, selected: bool) -> MarkerAppearance {
        MarkerAppearance {
            kind: self.kind,
            lng: self.position.lon,
            lat: self.position.lat,
            color: self.color().to_string(),
            size: self.size,
            rotation: self.rotation,
            label: self.label(),
            badge: self.badge(),
            selected,
        }
    }

    /// Snapshot handed to chat surfaces. Size is scaled down to the icon's
    /// logical footprint.
    pub fn snapshot(&self) -> ObjectInfo {
        ObjectInfo {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            position: self.position,
            speed: self.speed,
            size: self.size * 0.2,
            rotation: Some(self.rotation),
            classification: self.classification.clone(),
            description: self.description.clone(),
            details: self.details.clone(),
            radar_detections: self.radar_detections.clone(),
            qna: self.qna.clone(),
            steps: self.steps.clone().or_else(|| self.qna.clone()),
            plots: self.plots.clone(),
            plots_visible: self.plots_visible,
            auto_open_popup: false,
        }
    }

    /// Smoothed trail through the historical plots plus the live position,
    /// oldest first, as `(lng, lat)` pairs.
    pub fn trail_coords(&self, now: DateTime<Utc>, window: usize) -> Vec<(f64, f64)> {
        let mut sorted: Vec<&PlotData> = self.plots.iter().collect();
        sorted.sort_by_key(|p| p.time);
        let mut points: Vec<TrackPoint> = sorted
            .iter()
            .map(|p| TrackPoint {
                lat: p.position.lat,
                lng: p.position.lon,
                timestamp_ms: p.time.timestamp_millis() as f64,
            })
            .collect();
        points.push(TrackPoint {
            lat: self.position.lat,
            lng: self.position.lon,
            timestamp_ms: now.timestamp_millis() as f64,
        });
        smooth_path(&points, window)
            .into_iter()
            .map(|p| (p.lng, p.lat))
            .collect()
    }

    pub fn expired(&self, now: DateTime<Utc>, expiry_ms: i64) -> bool {
        now - self.last_update >= Duration::milliseconds(expiry_ms)
    }
}

/// Altitude label: thousands of feet, zero-padded to three digits.
pub fn format_altitude(alt_ft: f64) -> String {
    let thousands = (alt_ft / 1000.0).round() as i64;
    format!("{thousands:03}ft")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn jet(alt: f64, speed: f64) -> TrackEntity {
        let mut update = ObjectUpdate::new(
            MarkerKind::Jet,
            Some("t1"),
            Position::new(35.43, 33.24, alt),
        );
        update.speed = Some(speed);
        update.name = Some("bogey".to_string());
        TrackEntity::from_update("t1".to_string(), &update, now())
    }

    #[test]
    fn altitude_label_is_zero_padded_thousands() {
        assert_eq!(format_altitude(7400.0), "007ft");
        assert_eq!(format_altitude(34000.0), "034ft");
        assert_eq!(format_altitude(123456.0), "123ft");
        assert_eq!(format_altitude(0.0), "000ft");
    }

    #[test]
    fn label_has_name_altitude_speed() {
        let entity = jet(7400.0, 412.6);
        assert_eq!(entity.label().as_deref(), Some("bogey\n007ft\n413kn"));
    }

    #[test]
    fn star_and_radar_point_have_no_label() {
        let mut entity = jet(7400.0, 412.6);
        entity.kind = MarkerKind::Star;
        assert!(entity.label().is_none());

        let mut entity = jet(7400.0, 412.6);
        entity.classification = Some(Classification {
            current_identification: Some(Identification::RadarPoint),
            ..Classification::default()
        });
        assert!(entity.label().is_none());
    }

    #[test]
    fn badge_reflects_classification_state() {
        let mut entity = jet(0.0, 0.0);
        assert_eq!(entity.badge(), Badge::Attention);

        entity.classification = Some(Classification {
            current_identification: Some(Identification::Jet),
            ..Classification::default()
        });
        assert_eq!(entity.badge(), Badge::None);

        entity.classification = Some(Classification {
            current_identification: Some(Identification::UnknownFast),
            ..Classification::default()
        });
        assert_eq!(entity.badge(), Badge::Attention);

        entity.classification = Some(Classification {
            current_identification: Some(Identification::Jet),
            suggested_identification: Some(Identification::Missile),
            ..Classification::default()
        });
        assert_eq!(entity.badge(), Badge::Suggestion);
    }

    #[test]
    fn arrow_rotation_is_offset_ninety_degrees() {
        let mut update = ObjectUpdate::new(
            MarkerKind::Arrow,
            Some("a1"),
            Position::new(35.0, 33.0, 0.0),
        );
        update.rotation = Some(45.0);
        let mut entity = TrackEntity::from_update("a1".to_string(), &update, now());
        assert_eq!(entity.rotation, -45.0);

        entity.apply(
            TrackPatch {
                rotation: Some(180.0),
                ..TrackPatch::default()
            },
            now(),
        );
        assert_eq!(entity.rotation, 90.0);

        let mut entity = jet(0.0, 0.0);
        entity.apply(
            TrackPatch {
                rotation: Some(180.0),
                ..TrackPatch::default()
            },
            now(),
        );
        assert_eq!(entity.rotation, 180.0);
    }

    #[test]
    fn apply_refreshes_expiry_clock() {
        let mut entity = jet(0.0, 0.0);
        let later = now() + Duration::milliseconds(49_000);
        assert!(!entity.expired(later, 50_000));
        entity.apply(TrackPatch::default(), later);
        assert!(!entity.expired(later + Duration::milliseconds(49_999), 50_000));
        assert!(entity.expired(later + Duration::milliseconds(50_000), 50_000));
    }

    #[test]
    fn steps_fall_back_to_qna() {
        let step = Step {
            question: "q".to_string(),
            answers: vec!["a".to_string()],
        };
        let mut update = ObjectUpdate::new(
            MarkerKind::Jet,
            Some("t1"),
            Position::new(35.0, 33.0, 0.0),
        );
        update.qna = Some(vec![step.clone()]);
        let entity = TrackEntity::from_update("t1".to_string(), &update, now());
        assert_eq!(entity.steps.as_deref(), Some(&[step][..]));
    }

    #[test]
    fn trail_includes_live_position_last() {
        let mut entity = jet(0.0, 0.0);
        entity.plots = vec![PlotData {
            position: Position::new(35.0, 33.0, 0.0),
            speed: 100.0,
            time: now() - Duration::seconds(10),
            color: "#FFFF00".to_string(),
            rotation: 0.0,
        }];
        let coords = entity.trail_coords(now(), 5);
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[1], (entity.position.lon, entity.position.lat));
    }
}
