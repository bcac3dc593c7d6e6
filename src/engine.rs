//! The engine: one place where the channel, the track picture, the chat
//! surfaces and the backend meet.
//!
//! The engine owns no timers. Every delayed effect is a deadline stored on
//! the relevant state, and [`Engine::tick`] settles whatever is due at the
//! supplied time. Drivers decide how often to call it and with what clock.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{ChatApi, RealtimeSession};
use crate::channel::{Channel, InboundEvent, OutboundIntent, OutboundSink};
use crate::chat::popup::PopupSession;
use crate::chat::session::ChatCoordinator;
use crate::chat::{self, steps, text, Action, ActionData, ChatButton, ChatMessage, Role};
use crate::config::Config;
use crate::map::MapSurface;
use crate::models::ObjectInfo;
use crate::storage::{self, keys, KeyValueStore};
use crate::track::{special, RadarField, TrackRegistry};
use crate::{Error, Result};

/// Request to open a detached window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRequest {
    pub name: String,
    pub url: String,
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
}

/// Host-environment effects the engine cannot perform itself.
pub trait UiBridge {
    /// Play the attention chime for an auto-popup event.
    fn play_alert(&mut self);
    /// Open a detached window. Returns false when the host refuses.
    fn open_window(&mut self, request: &WindowRequest) -> bool;
    /// Show a modal alert.
    fn alert(&mut self, message: &str);
}

/// Bridge that accepts windows and swallows everything else.
#[derive(Debug, Default)]
pub struct NullUi;

impl UiBridge for NullUi {
    fn play_alert(&mut self) {}
    fn open_window(&mut self, _request: &WindowRequest) -> bool {
        true
    }
    fn alert(&mut self, _message: &str) {}
}

/// Bridge that records every effect. Used by tests and the replay driver.
#[derive(Debug, Default)]
pub struct RecordingUi {
    pub alerts_played: usize,
    pub windows: Vec<WindowRequest>,
    pub alerts: Vec<String>,
    /// When false, every window request is refused.
    pub allow_windows: bool,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self {
            alerts_played: 0,
            windows: Vec::new(),
            alerts: Vec::new(),
            allow_windows: true,
        }
    }
}

impl UiBridge for RecordingUi {
    fn play_alert(&mut self) {
        self.alerts_played += 1;
    }

    fn open_window(&mut self, request: &WindowRequest) -> bool {
        if self.allow_windows {
            self.windows.push(request.clone());
        }
        self.allow_windows
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }
}

/// Persisted handoff for the deferred parallel-event flow: the original
/// message and buttons, parked until the operator opts in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CruiseFlowSeed {
    #[serde(rename = "originalMessage")]
    pub message: String,
    #[serde(rename = "originalButtons", default)]
    pub buttons: Vec<ChatButton>,
    #[serde(rename = "objectData")]
    pub object_data: ObjectInfo,
}

/// Main-transcript message waiting for its reveal deadline.
#[derive(Debug, Clone)]
struct ScheduledChat {
    due: DateTime<Utc>,
    message: ChatMessage,
}

/// Active voice session and its system-message poll state.
struct VoiceState {
    session: RealtimeSession,
    next_poll: DateTime<Utc>,
    last_seen: Option<DateTime<Utc>>,
}

pub struct Engine {
    config: Config,
    registry: TrackRegistry,
    radars: RadarField,
    overlay: special::SpecialOverlay,
    chat: ChatCoordinator,
    popup: Option<PopupSession>,
    scheduled: Vec<ScheduledChat>,
    downed: HashSet<String>,
    voice: Option<VoiceState>,
    surface: Box<dyn MapSurface>,
    store: Box<dyn KeyValueStore>,
    api: Box<dyn ChatApi>,
    channel: Channel,
    ui: Box<dyn UiBridge>,
}

impl Engine {
    pub fn new(
        config: Config,
        surface: Box<dyn MapSurface>,
        store: Box<dyn KeyValueStore>,
        api: Box<dyn ChatApi>,
        sink: Box<dyn OutboundSink>,
        ui: Box<dyn UiBridge>,
    ) -> Engine {
        let downed = storage::load_downed(&*store);
        Engine {
            config,
            registry: TrackRegistry::new(),
            radars: RadarField::default(),
            overlay: special::SpecialOverlay::new(),
            chat: ChatCoordinator::new(),
            popup: None,
            scheduled: Vec::new(),
            downed,
            voice: None,
            surface,
            store,
            api,
            channel: Channel::new(sink),
            ui,
        }
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn chat(&self) -> &ChatCoordinator {
        &self.chat
    }

    pub fn popup(&self) -> Option<&PopupSession> {
        self.popup.as_ref()
    }

    pub fn surface(&self) -> &dyn MapSurface {
        &*self.surface
    }

    pub fn radars(&self) -> &RadarField {
        &self.radars
    }

    pub fn overlay(&self) -> &special::SpecialOverlay {
        &self.overlay
    }

    pub fn downed(&self) -> &HashSet<String> {
        &self.downed
    }

    /// Feed one channel event through the engine.
    pub fn handle_event(&mut self, event: InboundEvent, now: DateTime<Utc>) {
        match event {
            InboundEvent::ObjectChange(update) => {
                let outcome = self.registry.ingest(
                    &update,
                    &self.downed,
                    &self.config.scenario,
                    &mut *self.surface,
                    now,
                );
                debug!(?outcome, "object change reconciled");
            }
            InboundEvent::ChatMessage(incoming) => {
                let from_classifier =
                    incoming.sender == self.config.scenario.classification_sender;
                let body = chat::attributed_body(
                    &incoming.sender,
                    &incoming.message,
                    &self.config.scenario.classification_sender,
                );
                let auto_popup = incoming
                    .object_data
                    .as_ref()
                    .map(|o| o.auto_open_popup)
                    .unwrap_or(false);
                if from_classifier && auto_popup {
                    // Park the real message and offer the detached flow
                    // instead of rendering it inline.
                    if let Some(info) = incoming.object_data.clone() {
                        self.ui.play_alert();
                        let seed = CruiseFlowSeed {
                            message: body.clone(),
                            buttons: incoming.buttons.clone(),
                            object_data: info.clone(),
                        };
                        if let Err(err) =
                            storage::set_json(&mut *self.store, keys::CRUISE_MISSILE_FLOW, &seed)
                        {
                            warn!(%err, "failed to persist parallel-event handoff");
                        }
                        self.chat.add_message(
                            text::PARALLEL_EVENT_PROMPT,
                            Role::Assistant,
                            vec![ChatButton::new(text::YES, Action::OpenCruiseMissilePopup)],
                            Some(info),
                            now,
                        );
                    }
                } else {
                    self.chat.add_message(
                        &body,
                        Role::Assistant,
                        incoming.buttons.clone(),
                        incoming.object_data.clone(),
                        now,
                    );
                }

                // A classification for the special object also paints its
                // synthetic trail, retrying until the track shows up.
                if let Some(info) = incoming.object_data.as_ref().filter(|_| from_classifier) {
                    if info.name.as_deref()
                        == Some(self.config.scenario.special_object_name.as_str())
                        && !apply_special_trail(
                            &mut self.registry,
                            &mut self.overlay,
                            &mut *self.surface,
                            &self.config,
                            info,
                            now,
                        )
                    {
                        self.overlay.schedule(info.clone(), &self.config.scenario, now);
                    }
                }
            }
            InboundEvent::RemoveSpecialTrail { object_id } => {
                self.overlay.remove(&mut *self.surface, &object_id);
            }
        }
    }

    /// Dispatch a pressed transcript button.
    pub fn handle_button(
        &mut self,
        action: Action,
        data: Option<&ActionData>,
        object_info: Option<&ObjectInfo>,
        now: DateTime<Utc>,
    ) {
        match action {
            Action::OpenPopupWithSteps => self.open_steps_popup(object_info, now),
            Action::NextStep => self.advance_step(data, now),
            Action::AddExpansion => {
                if let Some(message) = data.and_then(|d| d.message.clone()) {
                    match &mut self.popup {
                        Some(popup) => popup.push_message(ChatMessage::assistant(&message, now)),
                        None => self
                            .chat
                            .add_message(&message, Role::Assistant, Vec::new(), None, now),
                    }
                }
            }
            Action::OpenPopupChat => self.open_object_popup(object_info, now),
            Action::ApproveSuggested => self.approve_classification(object_info, now),
            Action::OpenCruiseMissilePopup => self.open_cruise_popup(now),
            Action::CruiseMissileApproveAndContinue => self.approve_and_continue(object_info, now),
            Action::ActivateInterceptionPlan => {
                if let Some(popup) = &mut self.popup {
                    popup.push_message(ChatMessage::user(text::ACTIVATE_INTERCEPTION, now));
                    popup.activate_plan(&self.config.scenario, now);
                }
            }
            Action::AbortInterception => {
                if let Some(popup) = &mut self.popup {
                    popup.push_message(ChatMessage::user("ABORT", now));
                    popup.abort(now);
                }
            }
        }
    }

    /// Select a track: highlight it on the surface, hand its snapshot to
    /// the chat coordinator.
    pub fn select_object(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let entity = self
            .registry
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let appearance = entity.appearance(true);
        let snapshot = entity.snapshot();
        self.surface.upsert_marker(id, appearance);
        self.chat.select_object(snapshot, &*self.api, now);
        Ok(())
    }

    /// Operator question on the primary transcript.
    pub fn send_chat(&mut self, question: &str, now: DateTime<Utc>) {
        self.chat
            .send(question, &*self.api, &self.config.scenario, now);
    }

    /// Operator question on the popup transcript.
    pub fn send_popup_chat(&mut self, question: &str, now: DateTime<Utc>) {
        if let Some(popup) = &mut self.popup {
            popup.send(question, &*self.api, &self.config.scenario, now);
        }
    }

    /// Operator question in the side chat pinned to `object_id`.
    pub fn send_object_chat(&mut self, object_id: &str, question: &str, now: DateTime<Utc>) {
        match self.chat.object_chat_mut(object_id) {
            Some(side) => side.send(question, &*self.api, &self.config.scenario, now),
            None => warn!(object_id, "no open side chat for object"),
        }
    }

    /// Clear the primary transcript locally and remotely. The local clear
    /// never waits on the backend.
    pub fn clear_chat(&mut self) {
        self.chat.clear(&*self.api);
    }

    pub fn toggle_trail(&mut self, id: &str, now: DateTime<Utc>) -> Option<bool> {
        self.registry
            .toggle_trail(id, &mut *self.surface, &self.config.scenario, now)
    }

    /// Toggle the radar picture, loading stations from the backend on the
    /// first call.
    pub fn toggle_radars(&mut self) -> Result<bool> {
        if self.radars.stations().is_empty() {
            let stations = self.api.fetch_radars()?;
            self.radars = RadarField::new(stations);
        }
        Ok(self.radars.toggle(&mut *self.surface))
    }

    pub fn start_voice(&mut self, voice: &str, now: DateTime<Utc>) -> Result<()> {
        let session = self.api.create_realtime_session(voice)?;
        debug!(
            history = session.conversation_history.len(),
            "voice session started"
        );
        self.voice = Some(VoiceState {
            session,
            next_poll: now,
            last_seen: None,
        });
        Ok(())
    }

    pub fn stop_voice(&mut self) {
        self.voice = None;
    }

    pub fn voice_active(&self) -> bool {
        self.voice.is_some()
    }

    /// Ephemeral key the host hands to its audio transport.
    pub fn voice_secret(&self) -> Option<&str> {
        self.voice
            .as_ref()
            .map(|v| v.session.client_secret.value.as_str())
    }

    /// Settle everything that is due at `now`: track expiry, overlay
    /// retries, delayed reveals, the interception countdown and the voice
    /// system-message poll.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let removed =
            self.registry
                .sweep_expired(self.config.scenario.expiry_ms, &mut *self.surface, now);
        for id in &removed {
            self.overlay.remove(&mut *self.surface, id);
        }

        for entry in self.overlay.take_due(now) {
            if !apply_special_trail(
                &mut self.registry,
                &mut self.overlay,
                &mut *self.surface,
                &self.config,
                &entry.object_data,
                now,
            ) {
                self.overlay.retry(entry, &self.config.scenario, now);
            }
        }

        let mut due = Vec::new();
        self.scheduled.retain(|s| {
            if s.due <= now {
                due.push(s.message.clone());
                false
            } else {
                true
            }
        });
        for message in due {
            self.chat.add_message(
                &message.content,
                message.role,
                message.buttons,
                message.object_info,
                now,
            );
        }

        if let Some(popup) = &mut self.popup {
            popup.tick(&*self.api, &mut *self.store, now);
        }
        let down_id = self
            .popup
            .as_ref()
            .filter(|p| p.target_down())
            .and_then(|p| p.target.id.clone());
        if let Some(id) = down_id {
            if !self.downed.contains(&id) {
                self.downed = storage::load_downed(&*self.store);
                self.registry.remove_track(&id, &mut *self.surface);
                self.overlay.remove(&mut *self.surface, &id);
            }
        }

        if let Some(voice) = &mut self.voice {
            if now >= voice.next_poll {
                voice.next_poll =
                    now + Duration::milliseconds(self.config.scenario.system_message_poll_ms);
                match self.api.fetch_system_messages() {
                    Ok(messages) => {
                        for message in messages {
                            if voice.last_seen.is_some_and(|seen| message.timestamp <= seen) {
                                continue;
                            }
                            voice.last_seen = Some(message.timestamp);
                            let body = chat::attributed_body(
                                &message.sender,
                                &message.message,
                                &self.config.scenario.classification_sender,
                            );
                            self.chat
                                .add_message(&body, Role::System, Vec::new(), None, now);
                        }
                    }
                    Err(err) => warn!(%err, "system message poll failed"),
                }
            }
        }
    }

    fn open_steps_popup(&mut self, object_info: Option<&ObjectInfo>, now: DateTime<Utc>) {
        let Some(info) = object_info else {
            self.ui.alert(text::NO_TARGET_INFO);
            return;
        };
        let steps = info
            .steps
            .clone()
            .or_else(|| info.qna.clone())
            .unwrap_or_default();
        let Some(reveal) = steps::initial_reveal(&steps) else {
            self.ui.alert(text::NO_TARGET_INFO);
            return;
        };
        let mut first = ChatMessage::assistant(&reveal.content, now);
        first.buttons = reveal.buttons;
        self.seed_popup(info, vec![first], Some(&steps));
        if self.open_popup_window(info.id.as_deref().unwrap_or_default()) {
            self.popup = Some(PopupSession::open_from_store(
                &*self.store,
                &self.config.scenario,
                now,
            ));
            self.chat
                .add_message(text::STEPS_POPUP_OPENED, Role::Assistant, Vec::new(), None, now);
        }
    }

    fn advance_step(&mut self, data: Option<&ActionData>, now: DateTime<Utc>) {
        let Some(data) = data else { return };
        let steps = data.steps.clone().unwrap_or_default();
        let Some(index) = data.current_step_index else {
            return;
        };
        let Some(reveal) = steps::reveal(&steps, index) else {
            return;
        };
        let mut message = ChatMessage::assistant(&reveal.content, now);
        message.buttons = reveal.buttons;
        let due = now + Duration::milliseconds(self.config.scenario.step_reveal_delay_ms);
        match &mut self.popup {
            Some(popup) => {
                popup.push_message(ChatMessage::user(text::YES, now));
                popup.schedule_message(message, due);
            }
            None => {
                self.chat
                    .add_message(text::YES, Role::User, Vec::new(), None, now);
                self.scheduled.push(ScheduledChat { due, message });
            }
        }
    }

    fn open_object_popup(&mut self, object_info: Option<&ObjectInfo>, now: DateTime<Utc>) {
        let Some(info) = object_info else {
            self.ui.alert(text::NO_TARGET_INFO);
            return;
        };
        self.chat
            .open_object_chat(info.clone(), &*self.api, self.config.scenario.max_object_chats);
        self.seed_popup(info, Vec::new(), None);
        if self.open_popup_window(info.id.as_deref().unwrap_or_default()) {
            self.popup = Some(PopupSession::open_from_store(
                &*self.store,
                &self.config.scenario,
                now,
            ));
        }
    }

    fn approve_classification(&mut self, object_info: Option<&ObjectInfo>, now: DateTime<Utc>) {
        let Some(info) = object_info else {
            self.ui.alert(text::NO_TARGET_INFO);
            return;
        };
        self.channel.emit(OutboundIntent::ApproveClassification {
            object_data: info.clone(),
        });
        self.chat
            .add_message(text::CLASSIFICATION_APPROVED, Role::User, Vec::new(), None, now);
        if info.name.as_deref() == Some(self.config.scenario.special_object_name.as_str()) {
            if let Some(id) = info.id.clone() {
                self.channel
                    .emit(OutboundIntent::RemoveSpecialTrail { object_id: id.clone() });
                self.overlay.remove(&mut *self.surface, &id);
            }
        }
    }

    fn open_cruise_popup(&mut self, now: DateTime<Utc>) {
        let seed: Option<CruiseFlowSeed> =
            storage::get_json(&*self.store, keys::CRUISE_MISSILE_FLOW);
        let Some(seed) = seed else {
            self.ui.alert(text::NO_TARGET_INFO);
            return;
        };
        let mut original = ChatMessage::assistant(&seed.message, now);
        original.buttons = seed.buttons.clone();
        original.object_info = Some(seed.object_data.clone());
        self.seed_popup(&seed.object_data, vec![original], None);
        if self.open_popup_window(seed.object_data.id.as_deref().unwrap_or_default()) {
            self.popup = Some(PopupSession::open_from_store(
                &*self.store,
                &self.config.scenario,
                now,
            ));
            self.chat
                .add_message(text::CRUISE_POPUP_OPENED, Role::Assistant, Vec::new(), None, now);
        }
    }

    fn approve_and_continue(&mut self, object_info: Option<&ObjectInfo>, now: DateTime<Utc>) {
        let target = self
            .popup
            .as_ref()
            .filter(|p| !p.placeholder)
            .map(|p| p.target.clone())
            .or_else(|| object_info.cloned());
        let Some(target) = target else {
            self.ui.alert(text::NO_TARGET_INFO);
            return;
        };
        self.channel.emit(OutboundIntent::ApproveClassification {
            object_data: target.clone(),
        });
        if let Some(popup) = &mut self.popup {
            popup.push_message(ChatMessage::user(text::CLASSIFICATION_APPROVED, now));
            popup.brief(&self.config.scenario, now);
        }
    }

    fn seed_popup(
        &mut self,
        info: &ObjectInfo,
        initial_messages: Vec<ChatMessage>,
        steps: Option<&[crate::models::Step]>,
    ) {
        if let Err(err) = storage::set_json(&mut *self.store, keys::POPUP_TARGET_INFO, info) {
            warn!(%err, "failed to seed popup target info");
        }
        if let Err(err) =
            storage::set_json(&mut *self.store, keys::POPUP_INITIAL_MESSAGES, &initial_messages)
        {
            warn!(%err, "failed to seed popup messages");
        }
        if let Some(steps) = steps {
            if let Err(err) = storage::set_json(&mut *self.store, keys::POPUP_STEPS, &steps) {
                warn!(%err, "failed to seed popup steps");
            }
        }
    }

    fn open_popup_window(&mut self, target_id: &str) -> bool {
        let request = WindowRequest {
            name: format!("target_chat_{target_id}"),
            url: format!(
                "{}/?popup=true",
                self.config.api_base_url.trim_end_matches('/')
            ),
            width: self.config.popup_width,
            height: self.config.popup_height,
            left: self.config.screen_width - self.config.popup_width - self.config.popup_margin_right,
            top: self.config.popup_margin_top,
        };
        if self.ui.open_window(&request) {
            true
        } else {
            self.ui.alert(text::POPUP_BLOCKED);
            false
        }
    }
}

/// Paint the synthetic trail for a classified special object. Returns false
/// when the track has not appeared yet and the caller should retry.
fn apply_special_trail(
    registry: &mut TrackRegistry,
    overlay: &mut special::SpecialOverlay,
    surface: &mut dyn MapSurface,
    config: &Config,
    info: &ObjectInfo,
    now: DateTime<Utc>,
) -> bool {
    let rules = &config.scenario;
    let Some(id) = info.id.as_deref() else {
        return true;
    };
    let Some(entity) = registry.get_mut(id) else {
        return false;
    };
    entity.plots = special::classified_plots(
        rules,
        info.position.alt_ft,
        info.speed,
        info.rotation.unwrap_or(0.0),
        now,
    );
    let coords: Vec<(f64, f64)> = entity.plots.iter().map(|p| p.position.lng_lat()).collect();
    if special::upsert_overlay(surface, id, &coords, rules) {
        overlay.mark_applied(id);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatRequest, ClientSecret, RoleMessage, SystemMessage};
    use crate::channel::{IncomingChat, RecordingSink};
    use crate::map::RecordingSurface;
    use crate::models::{MarkerKind, ObjectUpdate, Position, RadarStation, Step};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct FakeApi {
        radars: Vec<RadarStation>,
        system_messages: RefCell<Vec<SystemMessage>>,
        deleted: RefCell<Vec<String>>,
    }

    impl ChatApi for FakeApi {
        fn ask(&self, _request: &ChatRequest) -> crate::Result<String> {
            Ok("reply".to_string())
        }
        fn summarize(&self, _messages: &[RoleMessage]) -> crate::Result<String> {
            Ok("summary".to_string())
        }
        fn clear_conversation(&self) -> crate::Result<()> {
            Ok(())
        }
        fn set_current_object(&self, _object: &ObjectInfo) -> crate::Result<()> {
            Ok(())
        }
        fn fetch_radars(&self) -> crate::Result<Vec<RadarStation>> {
            Ok(self.radars.clone())
        }
        fn delete_object(&self, id: &str) -> crate::Result<()> {
            self.deleted.borrow_mut().push(id.to_string());
            Ok(())
        }
        fn create_realtime_session(&self, _voice: &str) -> crate::Result<RealtimeSession> {
            Ok(RealtimeSession {
                client_secret: ClientSecret {
                    value: "secret".to_string(),
                },
                conversation_history: Vec::new(),
            })
        }
        fn fetch_system_messages(&self) -> crate::Result<Vec<SystemMessage>> {
            Ok(self.system_messages.borrow().clone())
        }
    }

    struct SharedSink(Rc<RefCell<RecordingSink>>);

    impl OutboundSink for SharedSink {
        fn connected(&self) -> bool {
            self.0.borrow().connected
        }
        fn send(&mut self, intent: &OutboundIntent) -> crate::Result<()> {
            self.0.borrow_mut().sent.push(intent.clone());
            Ok(())
        }
    }

    struct SharedUi(Rc<RefCell<RecordingUi>>);

    impl UiBridge for SharedUi {
        fn play_alert(&mut self) {
            self.0.borrow_mut().alerts_played += 1;
        }
        fn open_window(&mut self, request: &WindowRequest) -> bool {
            let mut ui = self.0.borrow_mut();
            if ui.allow_windows {
                ui.windows.push(request.clone());
            }
            ui.allow_windows
        }
        fn alert(&mut self, message: &str) {
            self.0.borrow_mut().alerts.push(message.to_string());
        }
    }

    struct Harness {
        engine: Engine,
        sink: Rc<RefCell<RecordingSink>>,
        ui: Rc<RefCell<RecordingUi>>,
    }

    fn harness() -> Harness {
        let sink = Rc::new(RefCell::new(RecordingSink::new()));
        let ui = Rc::new(RefCell::new(RecordingUi::new()));
        let engine = Engine::new(
            Config::default(),
            Box::new(RecordingSurface::new()),
            Box::new(MemoryStore::new()),
            Box::new(FakeApi::default()),
            Box::new(SharedSink(sink.clone())),
            Box::new(SharedUi(ui.clone())),
        );
        Harness { engine, sink, ui }
    }

    fn object_change(kind: MarkerKind, id: &str) -> InboundEvent {
        InboundEvent::ObjectChange(ObjectUpdate::new(
            kind,
            Some(id),
            Position::new(35.0, 33.0, 1000.0),
        ))
    }

    fn info(id: &str, name: Option<&str>) -> ObjectInfo {
        ObjectInfo {
            id: Some(id.to_string()),
            name: name.map(str::to_string),
            position: Position::new(35.43, 33.24, 500.0),
            speed: 400.0,
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
        }
    }

    #[test]
    fn object_changes_feed_the_registry() {
        let mut h = harness();
        h.engine.handle_event(object_change(MarkerKind::Jet, "t1"), now());
        assert_eq!(h.engine.registry().len(), 1);
        h.engine.tick(now() + Duration::seconds(51));
        assert!(h.engine.registry().is_empty());
    }

    #[test]
    fn plain_chat_message_lands_attributed() {
        let mut h = harness();
        h.engine.handle_event(
            InboundEvent::ChatMessage(IncomingChat {
                message: "contact north".to_string(),
                sender: "Northern HQ".to_string(),
                timestamp: None,
                buttons: Vec::new(),
                object_data: None,
            }),
            now(),
        );
        assert_eq!(h.engine.chat().messages()[0].content, "[Northern HQ] contact north");
    }

    #[test]
    fn auto_popup_message_is_parked_behind_a_prompt() {
        let mut h = harness();
        let mut data = info("cm1", Some("טיל שיוט"));
        data.auto_open_popup = true;
        h.engine.handle_event(
            InboundEvent::ChatMessage(IncomingChat {
                message: "hostile inbound".to_string(),
                sender: "Classification System".to_string(),
                timestamp: None,
                buttons: vec![ChatButton::new("אשר", Action::CruiseMissileApproveAndContinue)],
                object_data: Some(data),
            }),
            now(),
        );
        assert_eq!(h.ui.borrow().alerts_played, 1);
        let prompt = &h.engine.chat().messages()[0];
        assert_eq!(prompt.content, text::PARALLEL_EVENT_PROMPT);
        assert_eq!(prompt.buttons[0].action, Action::OpenCruiseMissilePopup);

        // Opting in opens the popup seeded with the parked message.
        h.engine
            .handle_button(Action::OpenCruiseMissilePopup, None, None, now());
        assert_eq!(h.ui.borrow().windows.len(), 1);
        assert_eq!(h.ui.borrow().windows[0].name, "target_chat_cm1");
        let popup = h.engine.popup().unwrap();
        assert!(!popup.placeholder);
        assert_eq!(popup.messages()[0].content, "hostile inbound");
        assert_eq!(
            h.engine.chat().messages().last().unwrap().content,
            text::CRUISE_POPUP_OPENED
        );
    }

    #[test]
    fn auto_popup_flow_is_reserved_for_the_classification_sender() {
        let mut h = harness();
        let mut data = info("cm2", Some("ב149"));
        data.auto_open_popup = true;
        h.engine.handle_event(
            InboundEvent::ChatMessage(IncomingChat {
                message: "hello".to_string(),
                sender: "Northern HQ".to_string(),
                timestamp: None,
                buttons: vec![ChatButton::new("אשר", Action::ApproveSuggested)],
                object_data: Some(data),
            }),
            now(),
        );
        // Someone else's message lands inline, attributed and untouched.
        assert_eq!(h.ui.borrow().alerts_played, 0);
        let msg = &h.engine.chat().messages()[0];
        assert_eq!(msg.content, "[Northern HQ] hello");
        assert_eq!(msg.buttons[0].action, Action::ApproveSuggested);
        // No parked seed, so the popup action has nothing to open.
        h.engine
            .handle_button(Action::OpenCruiseMissilePopup, None, None, now());
        assert!(h.engine.popup().is_none());
        // And the special-trail retry never starts for it either.
        h.engine.tick(now() + Duration::milliseconds(150));
        assert!(!h.engine.surface().has_layer("special-trail-line-cm2"));
        assert!(h.engine.overlay().pending().is_empty());
    }

    #[test]
    fn object_popup_opens_a_side_chat_with_its_own_transcript() {
        let mut h = harness();
        let target = info("t7", Some("bogey"));
        h.engine
            .handle_button(Action::OpenPopupChat, None, Some(&target), now());
        assert_eq!(h.engine.chat().object_chats().len(), 1);

        h.engine.send_object_chat("t7", "מה זה", now());
        let side = &h.engine.chat().object_chats()[0];
        assert_eq!(side.target().id.as_deref(), Some("t7"));
        assert_eq!(side.messages()[0].content, "מה זה");
        assert_eq!(side.messages()[1].content, "reply");
        // Side chat turns stay out of the primary transcript.
        assert!(h.engine.chat().messages().iter().all(|m| m.content != "מה זה"));

        // A question for a track without an open chat is dropped.
        h.engine.send_object_chat("zz", "hello", now());
        assert_eq!(h.engine.chat().object_chats()[0].messages().len(), 2);
    }

    #[test]
    fn cruise_popup_without_seed_alerts() {
        let mut h = harness();
        h.engine
            .handle_button(Action::OpenCruiseMissilePopup, None, None, now());
        assert_eq!(h.ui.borrow().alerts, vec![text::NO_TARGET_INFO.to_string()]);
        assert!(h.engine.popup().is_none());
    }

    #[test]
    fn blocked_window_raises_the_popup_alert() {
        let mut h = harness();
        h.ui.borrow_mut().allow_windows = false;
        let mut target = info("t1", None);
        target.steps = Some(vec![
            Step {
                question: "q1".to_string(),
                answers: vec!["a1".to_string()],
            },
            Step {
                question: "q2".to_string(),
                answers: vec!["a2".to_string()],
            },
        ]);
        h.engine
            .handle_button(Action::OpenPopupWithSteps, None, Some(&target), now());
        assert_eq!(h.ui.borrow().alerts, vec![text::POPUP_BLOCKED.to_string()]);
        assert!(h.engine.popup().is_none());
    }

    #[test]
    fn steps_popup_opens_with_initial_reveal() {
        let mut h = harness();
        let mut target = info("t1", None);
        target.steps = Some(vec![
            Step {
                question: "q1".to_string(),
                answers: vec!["a1".to_string()],
            },
            Step {
                question: "q2".to_string(),
                answers: vec!["a2".to_string()],
            },
        ]);
        h.engine
            .handle_button(Action::OpenPopupWithSteps, None, Some(&target), now());
        let popup = h.engine.popup().unwrap();
        assert_eq!(popup.messages()[0].content, "a1\n\nq2");
        assert_eq!(popup.messages()[0].buttons[0].label, text::YES);
        assert_eq!(
            h.engine.chat().messages().last().unwrap().content,
            text::STEPS_POPUP_OPENED
        );

        // Advancing reveals the next step after the configured delay.
        let data = popup.messages()[0].buttons[0].data.clone().unwrap();
        h.engine
            .handle_button(Action::NextStep, Some(&data), None, now());
        assert_eq!(
            h.engine.popup().unwrap().messages().last().unwrap().content,
            text::YES
        );
        h.engine.tick(now() + Duration::milliseconds(300));
        assert_eq!(
            h.engine.popup().unwrap().messages().last().unwrap().content,
            "a2"
        );
    }

    #[test]
    fn approve_suggested_emits_and_confirms() {
        let mut h = harness();
        let target = info("t1", Some("ב149"));
        h.engine
            .handle_button(Action::ApproveSuggested, None, Some(&target), now());
        let sent = h.sink.borrow().sent.clone();
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            &sent[0],
            OutboundIntent::ApproveClassification { .. }
        ));
        assert_eq!(
            sent[1],
            OutboundIntent::RemoveSpecialTrail {
                object_id: "t1".to_string()
            }
        );
        assert_eq!(
            h.engine.chat().messages()[0].content,
            text::CLASSIFICATION_APPROVED
        );
    }

    #[test]
    fn special_classification_retries_until_track_appears() {
        let mut h = harness();
        let target = info("s1", Some("ב149"));
        h.engine.handle_event(
            InboundEvent::ChatMessage(IncomingChat {
                message: "classified".to_string(),
                sender: "Classification System".to_string(),
                timestamp: None,
                buttons: Vec::new(),
                object_data: Some(target),
            }),
            now(),
        );
        // No track yet: the overlay stays pending.
        assert!(!h.engine.surface().has_layer("special-trail-line-s1"));

        let mut update = ObjectUpdate::new(
            MarkerKind::Missile,
            Some("s1"),
            Position::new(35.43, 33.24, 500.0),
        );
        update.name = Some("ב149".to_string());
        h.engine.handle_event(InboundEvent::ObjectChange(update), now());
        h.engine.tick(now() + Duration::milliseconds(150));
        assert!(h.engine.surface().has_layer("special-trail-line-s1"));
        assert!(h.engine.surface().has_layer("special-plot-points-s1"));
        assert_eq!(h.engine.registry().get("s1").unwrap().plots.len(), 4);

        // The backend can order the trail removed.
        h.engine.handle_event(
            InboundEvent::RemoveSpecialTrail {
                object_id: "s1".to_string(),
            },
            now(),
        );
        assert!(!h.engine.surface().has_layer("special-trail-line-s1"));
    }

    #[test]
    fn interception_marks_target_down_and_blocks_reappearance() {
        let mut h = harness();
        h.engine.handle_event(object_change(MarkerKind::Missile, "cm1"), now());

        let target = info("cm1", Some("טיל שיוט"));
        h.engine.seed_popup(&target, Vec::new(), None);
        assert!(h.engine.open_popup_window("cm1"));
        h.engine.popup = Some(PopupSession::open_from_store(
            &*h.engine.store,
            &h.engine.config.scenario,
            now(),
        ));

        h.engine
            .handle_button(Action::CruiseMissileApproveAndContinue, None, None, now());
        assert!(matches!(
            &h.sink.borrow().sent[0],
            OutboundIntent::ApproveClassification { .. }
        ));
        h.engine.tick(now() + Duration::milliseconds(400));
        assert_eq!(
            h.engine.popup().unwrap().messages().last().unwrap().content,
            crate::chat::popup::BRIEFING
        );

        let t1 = now() + Duration::seconds(1);
        h.engine
            .handle_button(Action::ActivateInterceptionPlan, None, None, t1);
        let remaining = h
            .engine
            .popup()
            .unwrap()
            .interception_remaining_secs(t1)
            .unwrap();
        let impact = t1 + Duration::seconds(remaining);
        h.engine.tick(impact);

        assert!(h.engine.popup().unwrap().target_down());
        assert!(h.engine.downed().contains("cm1"));
        assert!(h.engine.registry().get("cm1").is_none());

        // Further updates for the downed target are discarded on arrival.
        let mut revival = ObjectUpdate::new(
            MarkerKind::Missile,
            Some("cm1"),
            Position::new(35.0, 33.0, 1000.0),
        );
        revival.name = Some("טיל שיוט".to_string());
        h.engine
            .handle_event(InboundEvent::ObjectChange(revival), impact);
        assert!(h.engine.registry().is_empty());
    }

    #[test]
    fn select_object_requires_a_live_track() {
        let mut h = harness();
        assert!(h.engine.select_object("ghost", now()).is_err());
        h.engine.handle_event(object_change(MarkerKind::Jet, "t1"), now());
        h.engine.select_object("t1", now()).unwrap();
        assert_eq!(
            h.engine.chat().current_object().unwrap().id.as_deref(),
            Some("t1")
        );
    }

    #[test]
    fn radar_toggle_loads_stations_once() {
        let sink = Rc::new(RefCell::new(RecordingSink::new()));
        let ui = Rc::new(RefCell::new(RecordingUi::new()));
        let api = FakeApi {
            radars: vec![RadarStation {
                name: "north".to_string(),
                position: crate::models::LatLng {
                    lat: 33.0,
                    lng: 35.5,
                },
                range: 40_000.0,
            }],
            ..FakeApi::default()
        };
        let mut engine = Engine::new(
            Config::default(),
            Box::new(RecordingSurface::new()),
            Box::new(MemoryStore::new()),
            Box::new(api),
            Box::new(SharedSink(sink)),
            Box::new(SharedUi(ui)),
        );
        assert!(engine.toggle_radars().unwrap());
        assert!(engine.surface().has_layer("radar-range-north"));
        assert!(!engine.toggle_radars().unwrap());
        assert!(!engine.surface().has_layer("radar-range-north"));
    }

    #[test]
    fn voice_poll_appends_new_system_messages_only() {
        let mut h = harness();
        h.engine.start_voice("alloy", now()).unwrap();
        assert!(h.engine.voice_active());
        assert_eq!(h.engine.voice_secret(), Some("secret"));

        // Downcast dance is not worth it; rebuild with a scripted api.
        let sink = Rc::new(RefCell::new(RecordingSink::new()));
        let ui = Rc::new(RefCell::new(RecordingUi::new()));
        let api = FakeApi::default();
        api.system_messages.borrow_mut().push(SystemMessage {
            message: "runway closed".to_string(),
            sender: "Tower".to_string(),
            timestamp: now(),
        });
        let mut engine = Engine::new(
            Config::default(),
            Box::new(RecordingSurface::new()),
            Box::new(MemoryStore::new()),
            Box::new(api),
            Box::new(SharedSink(sink)),
            Box::new(SharedUi(ui)),
        );
        engine.start_voice("alloy", now()).unwrap();
        engine.tick(now());
        assert_eq!(engine.chat().messages().len(), 1);
        assert_eq!(engine.chat().messages()[0].content, "[Tower] runway closed");
        assert_eq!(engine.chat().messages()[0].role, Role::System);

        // The same message is not appended again on the next poll.
        engine.tick(now() + Duration::seconds(2));
        assert_eq!(engine.chat().messages().len(), 1);

        engine.stop_voice();
        assert!(!engine.voice_active());
    }
}
