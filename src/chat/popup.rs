//! Detached popup surface: target briefing, border-crossing countdown and
//! the interception state machine.
//!
//! The popup boots from seed data persisted under well-known storage keys.
//! Missing or malformed seed data yields a placeholder session instead of a
//! failure. All timing is deadline-based: scheduled messages and the
//! interception impact carry absolute timestamps checked on tick.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::api::{ChatApi, ChatRequest, RoleMessage};
use crate::chat::{text, Action, ChatButton, ChatMessage, Role};
use crate::config::ScenarioRules;
use crate::geo;
use crate::models::ObjectInfo;
use crate::storage::{self, KeyValueStore};

/// Briefing appended after the operator approves and continues.
pub const BRIEFING: &str = "יש לפעול מיידית על המטרה כאשר ההחלטה לסווג אותה ככטב\"ם אויב\n\
כרוז צוות ליירוט\n\
זנק מסוקי קרב\n\
זנק מטוסי קרב\n\
העלה כוננות לסוללות הטילים\n\
העלה מעגל שליטה\n\
העלה חומסי gps\n\
\n\
עדיפיות ותכנית יירוט\n\
א. סוללת טילים א' - 95%\n\
ב. סוללת טילים ב' 90%\n\
ג מטוסי קרב - 10%";

/// Appended when the interception plan is activated.
pub const PLAN_ACTIVATED: &str = "סוללת טילים א' הופעלה\nנקודת פגיעה משוערת מוצגת על המסך";

/// Interception lifecycle. Transitions only move forward except for abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    Idle,
    /// Briefing delivered, waiting for plan activation.
    Briefed,
    /// Interceptor launched, impact pending at the stored deadline.
    CountdownRunning,
    Aborted,
    /// Target hit and marked down.
    Impact,
}

/// Message waiting for its reveal deadline.
#[derive(Debug, Clone)]
struct ScheduledMessage {
    due: DateTime<Utc>,
    message: ChatMessage,
}

/// One detached popup surface.
pub struct PopupSession {
    pub target: ObjectInfo,
    /// True when the seed data was missing and the session shows the
    /// loading placeholder.
    pub placeholder: bool,
    messages: Vec<ChatMessage>,
    scheduled: Vec<ScheduledMessage>,
    state: Interception,
    impact_at: Option<DateTime<Utc>>,
    border_deadline: Option<DateTime<Utc>>,
    target_down: bool,
}

impl PopupSession {
    /// Boot from the persisted seed. A missing or malformed target snapshot
    /// produces a placeholder session rather than an error.
    pub fn open_from_store(
        store: &dyn KeyValueStore,
        rules: &ScenarioRules,
        now: DateTime<Utc>,
    ) -> PopupSession {
        let target: Option<ObjectInfo> =
            storage::get_json(store, storage::keys::POPUP_TARGET_INFO);
        let initial: Vec<ChatMessage> =
            storage::get_json(store, storage::keys::POPUP_INITIAL_MESSAGES).unwrap_or_default();
        match target {
            Some(target) => {
                let mut session = PopupSession {
                    target,
                    placeholder: false,
                    messages: initial,
                    scheduled: Vec::new(),
                    state: Interception::Idle,
                    impact_at: None,
                    border_deadline: None,
                    target_down: false,
                };
                session.border_deadline = session.compute_border_deadline(rules, now);
                session
            }
            None => PopupSession {
                target: ObjectInfo {
                    id: None,
                    name: None,
                    position: crate::models::Position::new(0.0, 0.0, 0.0),
                    speed: 0.0,
                    size: 0.0,
                    rotation: None,
                    classification: None,
                    description: None,
                    details: None,
                    radar_detections: Vec::new(),
                    qna: None,
                    steps: None,
                    plots: Vec::new(),
                    plots_visible: false,
                    auto_open_popup: false,
                },
                placeholder: true,
                messages: vec![ChatMessage::assistant(text::LOADING_TARGET, now)],
                scheduled: Vec::new(),
                state: Interception::Idle,
                impact_at: None,
                border_deadline: None,
                target_down: false,
            },
        }
    }

    /// The downable target gets a fixed countdown; everything else gets an
    /// ETA to the border polyline. No ETA means no countdown.
    fn compute_border_deadline(
        &self,
        rules: &ScenarioRules,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if self.target.name.as_deref() == Some(rules.downable_object_name.as_str()) {
            return Some(now + Duration::seconds(rules.fixed_border_countdown_secs));
        }
        let border = geo::parse_line_string(&rules.border_wkt);
        let eta = geo::estimate_arrival_seconds(
            self.target.position.lon,
            self.target.position.lat,
            self.target.speed,
            &border,
        )?;
        Some(now + Duration::seconds(eta))
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> Interception {
        self.state
    }

    pub fn target_down(&self) -> bool {
        self.target_down
    }

    /// Seconds until the border crossing, floored at zero. A downed target
    /// reads zero.
    pub fn border_remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        if self.target_down {
            return 0;
        }
        match self.border_deadline {
            Some(deadline) => (deadline - now).num_seconds().max(0),
            None => 0,
        }
    }

    /// Seconds until impact while the countdown runs.
    pub fn interception_remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.state != Interception::CountdownRunning {
            return None;
        }
        self.impact_at.map(|at| (at - now).num_seconds().max(0))
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Queue a message for reveal at `due`.
    pub fn schedule_message(&mut self, message: ChatMessage, due: DateTime<Utc>) {
        self.scheduled.push(ScheduledMessage { due, message });
    }

    pub fn has_scheduled(&self) -> bool {
        !self.scheduled.is_empty()
    }

    /// Operator question over the popup transcript: trailing history plus a
    /// compact target summary seed.
    pub fn send(
        &mut self,
        question: &str,
        api: &dyn ChatApi,
        rules: &ScenarioRules,
        now: DateTime<Utc>,
    ) {
        let history: Vec<RoleMessage> = self
            .messages
            .iter()
            .rev()
            .take(rules.popup_history)
            .rev()
            .map(|m| RoleMessage {
                role: if m.role == Role::User {
                    Role::User
                } else {
                    Role::Assistant
                },
                content: m.content.clone(),
            })
            .collect();
        self.messages.push(ChatMessage::user(question, now));

        let request = ChatRequest {
            question: question.to_string(),
            current_object: Some(self.target.clone()),
            conversation_history: history,
            client_summary: Some(self.summary_seed()),
        };
        match api.ask(&request) {
            Ok(response) => self.messages.push(ChatMessage::assistant(&response, now)),
            Err(err) => {
                warn!(%err, "popup chat request failed");
                self.messages
                    .push(ChatMessage::assistant("Error: Could not get response", now));
            }
        }
    }

    /// Compact high-signal summary of the target for the backend.
    pub fn summary_seed(&self) -> String {
        let mut parts = Vec::new();
        if let Some(name) = self.target.name.as_deref().or(self.target.id.as_deref()) {
            parts.push(format!("Name:{name}"));
        }
        if let Some(current) = self
            .target
            .classification
            .as_ref()
            .and_then(|c| c.current_identification)
        {
            parts.push(format!(
                "Type:{}",
                crate::chat::session::identification_name(current)
            ));
        }
        parts.push(format!("Speed:{}kn", self.target.speed));
        parts.push(format!("Alt:{}ft", self.target.position.alt_ft));
        parts.join(" | ")
    }

    /// Queue the interception briefing after the configured delay.
    pub fn brief(&mut self, rules: &ScenarioRules, now: DateTime<Utc>) {
        let mut message = ChatMessage::assistant(BRIEFING, now);
        message.buttons = vec![ChatButton::new(
            text::ACTIVATE_INTERCEPTION,
            Action::ActivateInterceptionPlan,
        )];
        self.schedule_message(message, now + Duration::milliseconds(rules.briefing_delay_ms));
        self.state = Interception::Briefed;
    }

    /// Launch the interceptor: compute time to the impact point and start
    /// the countdown.
    pub fn activate_plan(&mut self, rules: &ScenarioRules, now: DateTime<Utc>) {
        let seconds = geo::travel_time_seconds(
            self.target.position.lat,
            self.target.position.lon,
            rules.impact_point.lat,
            rules.impact_point.lng,
            rules.interceptor_speed_knots,
        )
        .ceil() as i64;
        self.impact_at = Some(now + Duration::seconds(seconds));
        self.state = Interception::CountdownRunning;
        let mut message = ChatMessage::assistant(PLAN_ACTIVATED, now);
        message.buttons = vec![ChatButton::new("ABORT", Action::AbortInterception)];
        self.messages.push(message);
    }

    /// Abort. After impact the abort is refused without touching any state.
    pub fn abort(&mut self, now: DateTime<Utc>) {
        match self.state {
            Interception::Impact => {
                self.messages
                    .push(ChatMessage::assistant(text::CANNOT_ABORT_AFTER_IMPACT, now));
            }
            Interception::CountdownRunning => {
                self.impact_at = None;
                self.state = Interception::Aborted;
                self.messages
                    .push(ChatMessage::assistant(text::INTERCEPTION_ABORTED, now));
            }
            _ => {
                self.state = Interception::Aborted;
                self.messages
                    .push(ChatMessage::assistant(text::INTERCEPTION_ABORTED, now));
            }
        }
    }

    /// Advance deadlines: reveal due scheduled messages, and fire the
    /// impact when the countdown elapses. Impact marks the target down
    /// exactly once, asks the backend to delete it at the source, and
    /// freezes the border countdown.
    pub fn tick(
        &mut self,
        api: &dyn ChatApi,
        store: &mut dyn KeyValueStore,
        now: DateTime<Utc>,
    ) {
        let mut due: Vec<ChatMessage> = Vec::new();
        self.scheduled.retain(|s| {
            if s.due <= now {
                due.push(s.message.clone());
                false
            } else {
                true
            }
        });
        self.messages.extend(due);

        if self.state == Interception::CountdownRunning {
            if let Some(impact_at) = self.impact_at {
                if now >= impact_at {
                    self.impact(api, store, now);
                }
            }
        }
    }

    fn impact(&mut self, api: &dyn ChatApi, store: &mut dyn KeyValueStore, now: DateTime<Utc>) {
        self.state = Interception::Impact;
        self.impact_at = None;
        self.target_down = true;

        if let Some(id) = self.target.id.clone() {
            let mut downed = storage::load_downed(store);
            if downed.insert(id.clone()) {
                if let Err(err) = storage::save_downed(store, &downed) {
                    warn!(%err, "failed to persist downed target set");
                }
            }
            if let Err(err) = api.delete_object(&id) {
                warn!(%err, "failed to delete intercepted target at source");
            }
        }
        self.messages
            .push(ChatMessage::assistant(text::TARGET_INTERCEPTED, now));
    }
}
