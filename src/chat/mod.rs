//! Chat surfaces: transcript model, guided scripts, the primary coordinator
//! and the detached popup session.

pub mod popup;
pub mod session;
pub mod steps;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ObjectInfo, Step};

/// Operator-facing script strings. The deployment language is fixed; these
/// are operational copy, not translatable UI text.
pub mod text {
    /// Affirmative button label and the user message it injects.
    pub const YES: &str = "כן";
    /// Prompt offering to continue a parallel event in a detached window.
    pub const PARALLEL_EVENT_PROMPT: &str =
        "נראה שיש אירוע שמתפתח במקביל האם תרצה לפעול עליו בחלון נפרד?";
    /// Confirmation injected after a classification is approved.
    pub const CLASSIFICATION_APPROVED: &str = " אישרתי את הסיווג";
    /// Interception-plan button label.
    pub const ACTIVATE_INTERCEPTION: &str = "הפעל תוכנית יירוט א'";
    /// Appended when the interceptor reaches its impact point.
    pub const TARGET_INTERCEPTED: &str = "מטרה יורטה";
    /// Appended when a running countdown is aborted.
    pub const INTERCEPTION_ABORTED: &str = "יירוט בוטל";
    /// Appended when an abort arrives after impact.
    pub const CANNOT_ABORT_AFTER_IMPACT: &str = "לא יכול לבטל מטרה יורטה כבר";
    /// Placeholder transcript line while popup seed data is missing.
    pub const LOADING_TARGET: &str = "טוען נתוני מטרה...";
    /// Alert shown when the browser refuses to open the popup window.
    pub const POPUP_BLOCKED: &str = "אנא אפשר חלונות קופצים (popups) לאתר זה";
    /// Alert shown when a button fires without an attached target snapshot.
    pub const NO_TARGET_INFO: &str = "לא נמצא מידע על המטרה";
    /// Confirmation after the guided-script popup opens.
    pub const STEPS_POPUP_OPENED: &str = "נפתח חלון תדריך סיווג למטרה";
    /// Confirmation after the cruise-missile handling popup opens.
    pub const CRUISE_POPUP_OPENED: &str = "נפתח חלון טיפול בטיל שיוט";
}

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Action bound to a transcript button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenPopupWithSteps,
    NextStep,
    AddExpansion,
    OpenPopupChat,
    ApproveSuggested,
    OpenCruiseMissilePopup,
    CruiseMissileApproveAndContinue,
    ActivateInterceptionPlan,
    AbortInterception,
}

/// Payload carried by step-driven buttons.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Step>>,
    #[serde(
        default,
        rename = "currentStepIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatButton {
    pub label: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ActionData>,
}

impl ChatButton {
    pub fn new(label: &str, action: Action) -> Self {
        Self {
            label: label.to_string(),
            action,
            data: None,
        }
    }

    pub fn with_data(label: &str, action: Action, data: ActionData) -> Self {
        Self {
            label: label.to_string(),
            action,
            data: Some(data),
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<ChatButton>,
    /// Track snapshot attached to classification messages; button handlers
    /// read it back when the operator approves.
    #[serde(
        default,
        rename = "objectInfo",
        skip_serializing_if = "Option::is_none"
    )]
    pub object_info: Option<ObjectInfo>,
}

impl ChatMessage {
    pub fn user(content: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            timestamp,
            buttons: Vec::new(),
            object_info: None,
        }
    }

    pub fn assistant(content: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp,
            buttons: Vec::new(),
            object_info: None,
        }
    }
}

/// Render a sender-attributed message body. The classification sender's
/// messages appear bare; everyone else is prefixed with their name.
pub fn attributed_body(sender: &str, message: &str, classification_sender: &str) -> String {
    if sender == classification_sender {
        message.to_string()
    } else {
        format!("[{sender}] {message}")
    }
}
