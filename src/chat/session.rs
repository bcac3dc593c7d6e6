//! Primary chat surface: the shared transcript, the current-object context
//! and the per-object side chats.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::api::{ChatApi, ChatRequest, RoleMessage};
use crate::chat::{ChatButton, ChatMessage, Role};
use crate::config::ScenarioRules;
use crate::models::{Identification, ObjectInfo};

pub(crate) fn identification_name(id: Identification) -> &'static str {
    match id {
        Identification::Drone => "drone",
        Identification::Plane => "plane",
        Identification::Bird => "bird",
        Identification::Rocket => "rocket",
        Identification::Helicopter => "helicopter",
        Identification::Jet => "jet",
        Identification::Missile => "missile",
        Identification::UnknownFast => "unknownFast",
        Identification::RadarPoint => "radarPoint",
    }
}

fn radar_display_name(radar: &str) -> &str {
    match radar {
        "north" => "צפון",
        "south" => "דרום",
        "center" => "מרכז",
        other => other,
    }
}

/// Selection report rendered into the transcript when a track is selected.
fn selection_report(object: &ObjectInfo) -> String {
    let mut lines = Vec::new();
    let display_name = object
        .name
        .as_deref()
        .or(object.id.as_deref())
        .unwrap_or("לא ידוע");
    lines.push(format!("מטרה: {display_name}"));
    lines.push(format!("מהירות: {} קשר", object.speed));
    if object.position.alt_ft != 0.0 {
        lines.push(format!("גובה: {} רגל", object.position.alt_ft));
    }
    if let Some(classification) = &object.classification {
        if let Some(current) = classification.current_identification {
            lines.push(format!("זיהוי נוכחי: {}", identification_name(current)));
        }
        if let Some(suggested) = classification.suggested_identification {
            lines.push(format!("זיהוי מומלץ: {}", identification_name(suggested)));
        }
        if let Some(reason) = &classification.suggestion_reason {
            lines.push(reason.clone());
        }
    }
    if let Some(desc) = &object.description {
        lines.push("נתוני מעקב".to_string());
        if let Some(created) = &desc.created_at {
            lines.push(format!("נוצר: {created}"));
        }
        if let Some(distance) = desc.total_distance {
            lines.push(format!("מרחק כולל: {distance}ft"));
        }
        if let Some(avg) = desc.avg_speed {
            lines.push(format!("ממוצע מהירות: {avg} קשר"));
        }
        if let Some(n) = desc.total_direction_changes {
            lines.push(format!("שינויי כיוון: {n}"));
        }
        if let Some(n) = desc.total_speed_changes {
            lines.push(format!("שינויי מהירות: {n}"));
        }
        if let Some(n) = desc.total_altitude_changes {
            lines.push(format!("שינויי גובה: {n}"));
        }
        if let Some(from) = &desc.coming_from {
            lines.push(format!("מגיע מ: {from}"));
        }
        if let Some(to) = &desc.moving_to {
            lines.push(format!("נע לכיוון: {to}"));
        }
    }
    if !object.radar_detections.is_empty() {
        let radars: Vec<&str> = object
            .radar_detections
            .iter()
            .map(|r| radar_display_name(r))
            .collect();
        lines.push(format!("גילוי ע\"י המכמים: {}", radars.join(", ")));
    }
    lines.join("\n")
}

/// The last `per_role` user and assistant messages of a transcript,
/// merged back into timestamp order.
fn merged_history(messages: &[ChatMessage], per_role: usize) -> Vec<RoleMessage> {
    let users: Vec<&ChatMessage> = messages.iter().filter(|m| m.role == Role::User).collect();
    let assistants: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::User).collect();
    let mut merged: Vec<&ChatMessage> = users
        .into_iter()
        .rev()
        .take(per_role)
        .chain(assistants.into_iter().rev().take(per_role))
        .collect();
    merged.sort_by_key(|m| m.timestamp);
    merged
        .into_iter()
        .map(|m| RoleMessage {
            role: if m.role == Role::User {
                Role::User
            } else {
                Role::Assistant
            },
            content: m.content.clone(),
        })
        .collect()
}

/// Side chat pinned to one track, with its own transcript. Opening one
/// pushes the track to the backend as the active context.
pub struct ObjectChat {
    target: ObjectInfo,
    messages: Vec<ChatMessage>,
}

impl ObjectChat {
    fn open(target: ObjectInfo, api: &dyn ChatApi) -> Self {
        if let Err(err) = api.set_current_object(&target) {
            warn!(%err, "failed to push side chat object to backend");
        }
        Self {
            target,
            messages: Vec::new(),
        }
    }

    pub fn target(&self) -> &ObjectInfo {
        &self.target
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Ask a question in this side chat. The history window is taken
    /// before the question is appended, so it covers earlier turns only,
    /// and the pinned track always rides along as context.
    pub fn send(
        &mut self,
        question: &str,
        api: &dyn ChatApi,
        rules: &ScenarioRules,
        now: DateTime<Utc>,
    ) {
        let history = merged_history(&self.messages, rules.history_per_role);
        self.messages.push(ChatMessage::user(question, now));
        let request = ChatRequest {
            question: question.to_string(),
            current_object: Some(self.target.clone()),
            conversation_history: history,
            client_summary: None,
        };
        match api.ask(&request) {
            Ok(response) => self.messages.push(ChatMessage::assistant(&response, now)),
            Err(err) => {
                warn!(%err, "side chat request failed");
                self.messages
                    .push(ChatMessage::assistant("Error: Could not get response", now));
            }
        }
    }
}

/// The primary transcript and its context.
pub struct ChatCoordinator {
    messages: Vec<ChatMessage>,
    current_object: Option<ObjectInfo>,
    object_chats: Vec<ObjectChat>,
    cached_summary: String,
}

impl Default for ChatCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatCoordinator {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            current_object: None,
            object_chats: Vec::new(),
            cached_summary: String::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn current_object(&self) -> Option<&ObjectInfo> {
        self.current_object.as_ref()
    }

    pub fn object_chats(&self) -> &[ObjectChat] {
        &self.object_chats
    }

    pub fn object_chat_mut(&mut self, object_id: &str) -> Option<&mut ObjectChat> {
        self.object_chats
            .iter_mut()
            .find(|c| c.target.id.as_deref() == Some(object_id))
    }

    /// Append a message. A message that carries buttons and an object
    /// snapshot also becomes the current context.
    pub fn add_message(
        &mut self,
        content: &str,
        role: Role,
        buttons: Vec<ChatButton>,
        object_info: Option<ObjectInfo>,
        now: DateTime<Utc>,
    ) {
        if !buttons.is_empty() {
            if let Some(info) = &object_info {
                self.current_object = Some(info.clone());
            }
        }
        self.messages.push(ChatMessage {
            role,
            content: content.to_string(),
            timestamp: now,
            buttons,
            object_info,
        });
    }

    /// Select a track: set it as current context locally and on the
    /// backend, and render its report into the transcript. A backend
    /// failure does not block the local selection.
    pub fn select_object(&mut self, object: ObjectInfo, api: &dyn ChatApi, now: DateTime<Utc>) {
        if let Err(err) = api.set_current_object(&object) {
            warn!(%err, "failed to push current object to backend");
        }
        let report = selection_report(&object);
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: report,
            timestamp: now,
            buttons: Vec::new(),
            object_info: Some(object.clone()),
        });
        self.current_object = Some(object);
    }

    /// Rolling client-side summary over the trailing transcript window.
    /// Falls back to the last good summary when the backend call fails.
    pub fn client_summary(&mut self, api: &dyn ChatApi, rules: &ScenarioRules) -> String {
        let start = self.messages.len().saturating_sub(rules.summary_history);
        let window: Vec<RoleMessage> = self.messages[start..]
            .iter()
            .map(|m| RoleMessage {
                role: if m.role == Role::User {
                    Role::User
                } else {
                    Role::Assistant
                },
                content: m.content.clone(),
            })
            .collect();
        match api.summarize(&window) {
            Ok(summary) => {
                self.cached_summary = summary.clone();
                summary
            }
            Err(err) => {
                warn!(%err, "summary request failed, using cached summary");
                self.cached_summary.clone()
            }
        }
    }

    /// Send an operator question: the trailing history (per-role windows,
    /// merged in timestamp order) and a fresh client summary ride along.
    pub fn send(
        &mut self,
        question: &str,
        api: &dyn ChatApi,
        rules: &ScenarioRules,
        now: DateTime<Utc>,
    ) {
        self.messages.push(ChatMessage::user(question, now));

        let history = self.recent_history(rules.history_per_role);
        let client_summary = self.client_summary(api, rules);
        let request = ChatRequest {
            question: question.to_string(),
            current_object: self.current_object.clone(),
            conversation_history: history,
            client_summary: Some(client_summary),
        };
        match api.ask(&request) {
            Ok(response) => self.messages.push(ChatMessage::assistant(&response, now)),
            Err(err) => {
                warn!(%err, "chat request failed");
                self.messages
                    .push(ChatMessage::assistant("Error: Could not get response", now));
            }
        }
    }

    fn recent_history(&self, per_role: usize) -> Vec<RoleMessage> {
        merged_history(&self.messages, per_role)
    }

    /// Open a per-object side chat. Re-opening an open chat is a no-op;
    /// beyond the cap the oldest chat is evicted.
    pub fn open_object_chat(&mut self, object: ObjectInfo, api: &dyn ChatApi, max_chats: usize) {
        if self
            .object_chats
            .iter()
            .any(|existing| existing.target.id == object.id)
        {
            return;
        }
        if self.object_chats.len() >= max_chats {
            self.object_chats.remove(0);
        }
        self.object_chats.push(ObjectChat::open(object, api));
    }

    pub fn close_object_chat(&mut self, object_id: &str) {
        self.object_chats
            .retain(|c| c.target.id.as_deref() != Some(object_id));
    }

    /// Clear the transcript. The local clear always happens; the backend
    /// clear is attempted and a failure only logs.
    pub fn clear(&mut self, api: &dyn ChatApi) {
        self.messages.clear();
        if let Err(err) = api.clear_conversation() {
            warn!(%err, "failed to clear backend conversation");
        }
    }
}
