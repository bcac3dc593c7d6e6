//! Reconciling track registry.
//!
//! Every inbound record is reconciled against the current picture by id:
//! create, update, or replace when the marker kind legitimately changes.
//! Records for downed targets are discarded before they touch any state,
//! and a provisional arrow is never allowed to downgrade a classified
//! track back to an arrow.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::ScenarioRules;
use crate::map::{LayerSpec, MapSurface};
use crate::models::{MarkerKind, ObjectUpdate, TrackPatch};
use crate::track::entity::TrackEntity;
use crate::track::special;

pub fn course_line_id(object_id: &str) -> String {
    format!("course-line-{object_id}")
}

/// What an ingest did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Record dropped before reconciliation.
    Discarded(DiscardReason),
    Created(String),
    Updated(String),
    /// Marker kind changed: old entity torn down, new one created.
    Replaced(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownKind,
    DownedTarget,
    DownedParent,
}

/// Live tracks keyed by id. Iteration order is stable for deterministic
/// output.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: BTreeMap<String, TrackEntity>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TrackEntity> {
        self.tracks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TrackEntity> {
        self.tracks.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackEntity> {
        self.tracks.values()
    }

    /// Reconcile one inbound record against the picture and render the
    /// result onto `surface`.
    pub fn ingest(
        &mut self,
        update: &ObjectUpdate,
        downed: &HashSet<String>,
        rules: &ScenarioRules,
        surface: &mut dyn MapSurface,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        if update.kind == MarkerKind::Unknown {
            return IngestOutcome::Discarded(DiscardReason::UnknownKind);
        }

        // Downed targets stay down: drop their updates and the radar
        // detection points derived from them.
        if update.name.as_deref() == Some(rules.downable_object_name.as_str()) {
            if let Some(id) = update.id.as_deref() {
                if downed.contains(id) {
                    return IngestOutcome::Discarded(DiscardReason::DownedTarget);
                }
            }
        }
        if let Some(parent) = update
            .details
            .as_ref()
            .and_then(|d| d.get("parent_object"))
            .and_then(|v| v.as_str())
        {
            if downed.contains(parent) {
                return IngestOutcome::Discarded(DiscardReason::DownedParent);
            }
        }

        let is_special = update.name.as_deref() == Some(rules.special_object_name.as_str());
        let id = update
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(existing) = self.tracks.get_mut(&id) {
            if update.kind == MarkerKind::Arrow && existing.kind != MarkerKind::Arrow {
                // A provisional arrow never downgrades a classified track:
                // merge the fields but leave kind and classification alone.
                debug!(id, kind = %existing.kind, "preserving kind against arrow update");
                let mut patch = patch_from(update);
                patch.classification = None;
                existing.apply(patch, now);
                let appearance = existing.appearance(false);
                surface.upsert_marker(&id, appearance);
                return IngestOutcome::Updated(id);
            }

            if update.kind != existing.kind {
                // Legitimate kind change: rebuild from scratch.
                self.remove_track(&id, surface);
                let entity = TrackEntity::from_update(id.clone(), update, now);
                surface.upsert_marker(&id, entity.appearance(false));
                self.tracks.insert(id.clone(), entity);
                return IngestOutcome::Replaced(id);
            }

            let mut patch = patch_from(update);
            if is_special {
                let alt = update.position.map(|p| p.alt_ft).unwrap_or(0.0);
                let speed = update.speed.unwrap_or(0.0).round();
                let rotation = update.rotation.unwrap_or(0.0);
                patch.plots = Some(special::approach_plots(rules, alt, speed, rotation, now));
            }
            let special_coords: Option<Vec<(f64, f64)>> = patch
                .plots
                .as_ref()
                .filter(|_| is_special)
                .map(|plots| plots.iter().map(|p| p.position.lng_lat()).collect());
            existing.apply(patch, now);
            let appearance = existing.appearance(false);
            surface.upsert_marker(&id, appearance);
            if existing.plots_visible {
                self.refresh_course_line(&id, surface, rules, now);
            }
            if let Some(coords) = special_coords {
                special::upsert_overlay(surface, &id, &coords, rules);
            }
            return IngestOutcome::Updated(id);
        }

        let mut entity = TrackEntity::from_update(id.clone(), update, now);
        if is_special {
            entity.plots = special::approach_plots(
                rules,
                entity.position.alt_ft,
                entity.speed,
                update.rotation.unwrap_or(0.0),
                now,
            );
        }
        surface.upsert_marker(&id, entity.appearance(false));
        self.tracks.insert(id.clone(), entity);
        IngestOutcome::Created(id)
    }

    /// Drop tracks that have not been updated within the expiry window.
    /// Returns the removed ids.
    pub fn sweep_expired(
        &mut self,
        expiry_ms: i64,
        surface: &mut dyn MapSurface,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let expired: Vec<String> = self
            .tracks
            .values()
            .filter(|t| t.expired(now, expiry_ms))
            .map(|t| t.id.clone())
            .collect();
        for id in &expired {
            debug!(id, "track expired");
            self.remove_track(id, surface);
        }
        expired
    }

    /// Remove one track and everything it put on the surface.
    pub fn remove_track(&mut self, id: &str, surface: &mut dyn MapSurface) {
        if self.tracks.remove(id).is_some() {
            surface.remove_marker(id);
            surface.remove_layer(&course_line_id(id));
        }
    }

    /// Toggle the trail for one track. Returns the new visibility, or
    /// `None` when the track does not exist.
    pub fn toggle_trail(
        &mut self,
        id: &str,
        surface: &mut dyn MapSurface,
        rules: &ScenarioRules,
        now: DateTime<Utc>,
    ) -> Option<bool> {
        let entity = self.tracks.get_mut(id)?;
        entity.plots_visible = !entity.plots_visible;
        let visible = entity.plots_visible;
        if visible {
            self.refresh_course_line(id, surface, rules, now);
        } else {
            surface.remove_layer(&course_line_id(id));
        }
        Some(visible)
    }

    fn refresh_course_line(
        &self,
        id: &str,
        surface: &mut dyn MapSurface,
        rules: &ScenarioRules,
        now: DateTime<Utc>,
    ) {
        if let Some(entity) = self.tracks.get(id) {
            if entity.plots.is_empty() {
                return;
            }
            let coords = entity.trail_coords(now, rules.smoothing_window);
            surface.add_layer(
                &course_line_id(id),
                LayerSpec::Line {
                    coords,
                    color: entity.trail_color().to_string(),
                    width: 3.0,
                    dashed: true,
                },
            );
        }
    }
}

fn patch_from(update: &ObjectUpdate) -> TrackPatch {
    TrackPatch {
        name: update.name.clone(),
        position: update.position,
        size: update.size,
        speed: update.speed,
        rotation: update.rotation,
        classification: update.classification.clone(),
        description: update.description.clone(),
        details: update.details.clone(),
        radar_detections: update.radar_detections.clone(),
        qna: update.qna.clone(),
        steps: update.steps.clone(),
        plots: update.plots.clone(),
    }
}
