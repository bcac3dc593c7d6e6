//! Synthetic approach-path overlay for the designated special object.
//!
//! The overlay replaces the object's real trail with a fixed four-point
//! approach path rendered in light blue: a dashed line plus a point cloud,
//! on dedicated layers separate from the normal course line. Classification
//! messages can arrive before the track itself, so overlay application
//! retries on a short interval until the track shows up.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::ScenarioRules;
use crate::map::{LayerSpec, MapSurface};
use crate::models::{ObjectInfo, PlotData, Position};

pub fn trail_line_id(object_id: &str) -> String {
    format!("special-trail-line-{object_id}")
}

pub fn plot_points_id(object_id: &str) -> String {
    format!("special-plot-points-{object_id}")
}

/// Install or refresh both overlay layers for `object_id`.
pub fn upsert_overlay(
    surface: &mut dyn MapSurface,
    object_id: &str,
    coords: &[(f64, f64)],
    rules: &ScenarioRules,
) -> bool {
    let line_ok = surface.add_layer(
        &trail_line_id(object_id),
        LayerSpec::Line {
            coords: coords.to_vec(),
            color: rules.special_path_color.clone(),
            width: 3.0,
            dashed: true,
        },
    );
    let points_ok = surface.add_layer(
        &plot_points_id(object_id),
        LayerSpec::Points {
            coords: coords.to_vec(),
            color: rules.special_point_color.clone(),
            radius: 4.0,
        },
    );
    line_ok && points_ok
}

/// Synthetic plots for a track update: each base point plus a close
/// companion, newest-first base order, spaced `special_plot_spacing_ms`
/// apart going back from `special_plot_base_age_ms` before now.
pub fn approach_plots(
    rules: &ScenarioRules,
    alt_ft: f64,
    speed: f64,
    rotation: f64,
    now: DateTime<Utc>,
) -> Vec<PlotData> {
    let mut plots = Vec::with_capacity(rules.special_path.len() * 2);
    for (lat, lng) in rules.special_path.iter().rev() {
        for offset in [0.0, rules.companion_offset_deg] {
            let age = rules.special_plot_base_age_ms
                - plots.len() as i64 * rules.special_plot_spacing_ms;
            plots.push(PlotData {
                position: Position::new(lng + offset, lat + offset, alt_ft),
                speed,
                time: now - Duration::milliseconds(age),
                color: rules.special_point_color.clone(),
                rotation,
            });
        }
    }
    plots
}

/// Synthetic plots for a classification message: base points only, spaced
/// one second apart.
pub fn classified_plots(
    rules: &ScenarioRules,
    alt_ft: f64,
    speed: f64,
    rotation: f64,
    now: DateTime<Utc>,
) -> Vec<PlotData> {
    rules
        .special_path
        .iter()
        .rev()
        .enumerate()
        .map(|(idx, (lat, lng))| PlotData {
            position: Position::new(*lng, *lat, alt_ft),
            speed: speed.round(),
            time: now - Duration::milliseconds(rules.special_plot_base_age_ms - idx as i64 * 1000),
            color: rules.special_point_color.clone(),
            rotation,
        })
        .collect()
}

/// Pending overlay application waiting for its track to appear.
#[derive(Debug, Clone)]
pub struct PendingApply {
    pub object_data: ObjectInfo,
    pub attempts_left: u32,
    pub next_attempt: DateTime<Utc>,
}

/// Tracks which overlays are installed and which are still waiting for
/// their object.
#[derive(Debug, Default)]
pub struct SpecialOverlay {
    applied: HashSet<String>,
    pending: Vec<PendingApply>,
}

impl SpecialOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_applied(&self, object_id: &str) -> bool {
        self.applied.contains(object_id)
    }

    pub fn pending(&self) -> &[PendingApply] {
        &self.pending
    }

    pub fn mark_applied(&mut self, object_id: &str) {
        self.applied.insert(object_id.to_string());
    }

    /// Queue an overlay application until its track appears.
    pub fn schedule(&mut self, object_data: ObjectInfo, rules: &ScenarioRules, now: DateTime<Utc>) {
        self.pending.push(PendingApply {
            object_data,
            attempts_left: rules.special_retry_attempts,
            next_attempt: now,
        });
    }

    /// Take the applications that are due at `now`. Entries that still have
    /// attempts left must be rescheduled by the caller via [`Self::retry`].
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<PendingApply> {
        let mut due = Vec::new();
        let mut remaining = Vec::new();
        for entry in self.pending.drain(..) {
            if entry.next_attempt <= now {
                due.push(entry);
            } else {
                remaining.push(entry);
            }
        }
        self.pending = remaining;
        due
    }

    /// Put a failed application back with one fewer attempt. Exhausted
    /// entries are dropped.
    pub fn retry(&mut self, mut entry: PendingApply, rules: &ScenarioRules, now: DateTime<Utc>) {
        if entry.attempts_left <= 1 {
            debug!(
                object_id = entry.object_data.id.as_deref().unwrap_or(""),
                "giving up on overlay application"
            );
            return;
        }
        entry.attempts_left -= 1;
        entry.next_attempt = now + Duration::milliseconds(rules.special_retry_interval_ms);
        self.pending.push(entry);
    }

    /// Tear the overlay down and forget it.
    pub fn remove(&mut self, surface: &mut dyn MapSurface, object_id: &str) {
        surface.remove_layer(&trail_line_id(object_id));
        surface.remove_layer(&plot_points_id(object_id));
        self.applied.remove(object_id);
        self.pending
            .retain(|p| p.object_data.id.as_deref() != Some(object_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::RecordingSurface;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn approach_plots_pair_each_point_with_a_companion() {
        let rules = ScenarioRules::default();
        let plots = approach_plots(&rules, 500.0, 120.0, 10.0, now());
        assert_eq!(plots.len(), 8);
        // Base order is reversed, so the last configured point comes first.
        let (lat, lng) = rules.special_path[3];
        assert_eq!(plots[0].position, Position::new(lng, lat, 500.0));
        assert_eq!(
            plots[1].position,
            Position::new(lng + 0.00045, lat + 0.00045, 500.0)
        );
        // Timestamps step forward half a second per plot from eight seconds
        // back.
        assert_eq!(plots[0].time, now() - Duration::milliseconds(8000));
        assert_eq!(plots[1].time, now() - Duration::milliseconds(7500));
        assert_eq!(plots[7].time, now() - Duration::milliseconds(4500));
    }

    #[test]
    fn classified_plots_use_base_points_only() {
        let rules = ScenarioRules::default();
        let plots = classified_plots(&rules, 500.0, 120.4, 10.0, now());
        assert_eq!(plots.len(), 4);
        assert_eq!(plots[0].speed, 120.0);
        assert_eq!(plots[0].time, now() - Duration::milliseconds(8000));
        assert_eq!(plots[3].time, now() - Duration::milliseconds(5000));
    }

    #[test]
    fn upsert_installs_both_layers() {
        let rules = ScenarioRules::default();
        let mut surface = RecordingSurface::new();
        let mut overlay = SpecialOverlay::new();
        let coords = vec![(35.44, 33.26), (35.43, 33.24)];
        assert!(upsert_overlay(&mut surface, "t1", &coords, &rules));
        assert!(surface.has_layer("special-trail-line-t1"));
        assert!(surface.has_layer("special-plot-points-t1"));

        overlay.mark_applied("t1");
        overlay.remove(&mut surface, "t1");
        assert!(!surface.has_layer("special-trail-line-t1"));
        assert!(!surface.has_layer("special-plot-points-t1"));
        assert!(!overlay.is_applied("t1"));
    }

    #[test]
    fn retry_counts_down_and_gives_up() {
        let rules = ScenarioRules::default();
        let mut overlay = SpecialOverlay::new();
        let info = ObjectInfo {
            id: Some("t1".to_string()),
            name: Some(rules.special_object_name.clone()),
            position: Position::new(35.43, 33.24, 500.0),
            speed: 100.0,
            size: 2.0,
            rotation: Some(0.0),
            classification: None,
            description: None,
            details: None,
            radar_detections: Vec::new(),
            qna: None,
            steps: None,
            plots: Vec::new(),
            plots_visible: false,
            auto_open_popup: false,
        };
        overlay.schedule(info, &rules, now());

        let mut t = now();
        for _ in 0..rules.special_retry_attempts {
            let due = overlay.take_due(t);
            assert_eq!(due.len(), 1);
            for entry in due {
                overlay.retry(entry, &rules, t);
            }
            t += Duration::milliseconds(rules.special_retry_interval_ms);
        }
        assert!(overlay.take_due(t).is_empty());
        assert!(overlay.pending().is_empty());
    }
}
