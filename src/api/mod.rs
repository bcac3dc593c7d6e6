//! Blocking HTTP client for the backend.
//!
//! Everything the engine needs from the backend goes through the [`ChatApi`]
//! trait so tests can swap in a fake. [`HttpApi`] is the real client.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chat::Role;
use crate::models::{ObjectInfo, RadarStation};
use crate::{Error, Result};

/// One role-tagged message of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleMessage {
    pub role: Role,
    pub content: String,
}

/// Body of a `POST /chat` question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(
        rename = "currentObject",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub current_object: Option<ObjectInfo>,
    #[serde(rename = "conversationHistory")]
    pub conversation_history: Vec<RoleMessage>,
    #[serde(
        rename = "clientSummary",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub client_summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    summary: String,
}

/// Credentials and context for a realtime voice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSession {
    pub client_secret: ClientSecret,
    #[serde(default)]
    pub conversation_history: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSecret {
    pub value: String,
}

/// Backend-injected system announcement, polled while voice is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub message: String,
    pub sender: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Backend operations used by the engine.
pub trait ChatApi {
    /// Ask the assistant a question with its context. Returns the reply.
    fn ask(&self, request: &ChatRequest) -> Result<String>;
    /// Summarize a transcript window. Returns the summary text.
    fn summarize(&self, messages: &[RoleMessage]) -> Result<String>;
    /// Drop the backend-side conversation history.
    fn clear_conversation(&self) -> Result<()>;
    /// Set the track the assistant should treat as current context.
    fn set_current_object(&self, object: &ObjectInfo) -> Result<()>;
    /// Load the static radar stations.
    fn fetch_radars(&self) -> Result<Vec<RadarStation>>;
    /// Ask the backend to delete a track at the source.
    fn delete_object(&self, id: &str) -> Result<()>;
    /// Mint a realtime voice session.
    fn create_realtime_session(&self, voice: &str) -> Result<RealtimeSession>;
    /// Fetch the full system-message log.
    fn fetch_system_messages(&self) -> Result<Vec<SystemMessage>>;
}

/// `ChatApi` over plain blocking HTTP.
pub struct HttpApi {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::agent(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn http_err(err: ureq::Error) -> Error {
    Error::Http(err.to_string())
}

impl ChatApi for HttpApi {
    fn ask(&self, request: &ChatRequest) -> Result<String> {
        let response: ChatResponse = self
            .agent
            .post(&self.url("/chat"))
            .send_json(serde_json::to_value(request)?)
            .map_err(http_err)?
            .into_json()?;
        Ok(response.response)
    }

    fn summarize(&self, messages: &[RoleMessage]) -> Result<String> {
        let response: SummaryResponse = self
            .agent
            .post(&self.url("/chat/summarize"))
            .send_json(json!({ "messages": messages }))
            .map_err(http_err)?
            .into_json()?;
        Ok(response.summary)
    }

    fn clear_conversation(&self) -> Result<()> {
        self.agent
            .delete(&self.url("/chat/conversation"))
            .call()
            .map_err(http_err)?;
        Ok(())
    }

    fn set_current_object(&self, object: &ObjectInfo) -> Result<()> {
        self.agent
            .put(&self.url("/chat/current-object"))
            .send_json(serde_json::to_value(object)?)
            .map_err(http_err)?;
        Ok(())
    }

    fn fetch_radars(&self) -> Result<Vec<RadarStation>> {
        let stations: Vec<RadarStation> = self
            .agent
            .get(&self.url("/objects/radars"))
            .call()
            .map_err(http_err)?
            .into_json()?;
        Ok(stations)
    }

    fn delete_object(&self, id: &str) -> Result<()> {
        self.agent
            .post(&self.url("/objects"))
            .send_json(json!({ "id": id, "delete": true }))
            .map_err(http_err)?;
        Ok(())
    }

    fn create_realtime_session(&self, voice: &str) -> Result<RealtimeSession> {
        let session: RealtimeSession = self
            .agent
            .post(&self.url("/chat/realtime-session"))
            .send_json(json!({ "voice": voice }))
            .map_err(http_err)?
            .into_json()?;
        Ok(session)
    }

    fn fetch_system_messages(&self) -> Result<Vec<SystemMessage>> {
        let messages: Vec<SystemMessage> = self
            .agent
            .get(&self.url("/chat/system-messages"))
            .call()
            .map_err(http_err)?
            .into_json()?;
        Ok(messages)
    }
}
