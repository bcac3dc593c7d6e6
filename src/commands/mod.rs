//! Command implementations for the Skywatch CLI.
//!
//! `run` replays a JSONL driver stream through a fresh engine against a
//! manual clock, then summarizes the resulting picture. `radars` lists the
//! stations the backend knows about.

use std::cell::RefCell;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{ChatApi, HttpApi};
use crate::channel::{InboundEvent, OutboundIntent, OutboundSink, RecordingSink};
use crate::chat::session::identification_name;
use crate::chat::{Action, ActionData};
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::engine::{Engine, RecordingUi, UiBridge, WindowRequest};
use crate::map::RecordingSurface;
use crate::models::{ObjectInfo, RadarStation};
use crate::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use crate::Result;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// One live track in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct TrackLine {
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identification: Option<&'static str>,
    pub speed: f64,
}

/// Final state of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tracks: Vec<TrackLine>,
    pub chat_messages: usize,
    pub popup_messages: usize,
    pub downed: Vec<String>,
    pub emitted_intents: usize,
    pub windows_opened: usize,
    pub alerts: Vec<String>,
    pub skipped_lines: usize,
}

impl Output for RunSummary {
    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn to_human(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Tracks: {}\n", self.tracks.len()));
        for track in &self.tracks {
            out.push_str(&format!(
                "  {} [{}] {} {} {:.0}kn\n",
                track.id,
                track.kind,
                track.name.as_deref().unwrap_or("-"),
                track.identification.unwrap_or("-"),
                track.speed,
            ));
        }
        out.push_str(&format!(
            "Chat messages: {}  Popup messages: {}\n",
            self.chat_messages, self.popup_messages
        ));
        if !self.downed.is_empty() {
            out.push_str(&format!("Downed: {}\n", self.downed.join(", ")));
        }
        out.push_str(&format!(
            "Emitted intents: {}  Windows opened: {}\n",
            self.emitted_intents, self.windows_opened
        ));
        for alert in &self.alerts {
            out.push_str(&format!("Alert: {alert}\n"));
        }
        if self.skipped_lines > 0 {
            out.push_str(&format!("Skipped lines: {}\n", self.skipped_lines));
        }
        out
    }
}

/// Radar station listing.
#[derive(Debug, Clone, Serialize)]
pub struct RadarList {
    pub stations: Vec<RadarStation>,
}

impl Output for RadarList {
    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn to_human(&self) -> String {
        if self.stations.is_empty() {
            return "No radar stations".to_string();
        }
        self.stations
            .iter()
            .map(|s| {
                format!(
                    "{}  lat {:.5}  lng {:.5}  range {:.0}m",
                    s.name, s.position.lat, s.position.lng, s.range
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Driver directive embedded in the replay stream alongside channel frames.
#[derive(Debug, Deserialize)]
enum Directive {
    /// Advance the clock by this many milliseconds, then tick.
    #[serde(rename = "tick")]
    Tick(i64),
    /// Select a track by id.
    #[serde(rename = "select")]
    Select(String),
    /// Ask a question on the primary transcript.
    #[serde(rename = "chat")]
    Chat(String),
    /// Press a transcript button.
    #[serde(rename = "button")]
    Button(ButtonPress),
    /// Toggle the course line for a track.
    #[serde(rename = "toggleTrail")]
    ToggleTrail(String),
    /// Show or hide the radar picture.
    #[serde(rename = "toggleRadars")]
    ToggleRadars(bool),
}

#[derive(Debug, Deserialize)]
struct ButtonPress {
    action: Action,
    #[serde(default)]
    data: Option<ActionData>,
    #[serde(default, rename = "objectInfo")]
    object_info: Option<ObjectInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DriverLine {
    Event(InboundEvent),
    Directive(Directive),
}

struct SharedSink(Rc<RefCell<RecordingSink>>);

impl OutboundSink for SharedSink {
    fn connected(&self) -> bool {
        self.0.borrow().connected
    }

    fn send(&mut self, intent: &OutboundIntent) -> Result<()> {
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

/// Feed a JSONL driver stream through `engine`. Malformed lines are skipped
/// with a warning; their count is returned.
fn replay<R: BufRead>(reader: R, engine: &mut Engine, clock: &ManualClock) -> Result<usize> {
    let mut skipped = 0;
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<DriverLine>(trimmed) {
            Ok(DriverLine::Event(event)) => engine.handle_event(event, clock.now()),
            Ok(DriverLine::Directive(directive)) => apply(engine, clock, directive),
            Err(err) => {
                warn!(%err, line = trimmed, "skipping malformed driver line");
                skipped += 1;
            }
        }
    }
    Ok(skipped)
}

fn apply(engine: &mut Engine, clock: &ManualClock, directive: Directive) {
    match directive {
        Directive::Tick(ms) => {
            clock.advance_millis(ms);
            engine.tick(clock.now());
        }
        Directive::Select(id) => {
            if let Err(err) = engine.select_object(&id, clock.now()) {
                warn!(%err, id, "select failed");
            }
        }
        Directive::Chat(question) => engine.send_chat(&question, clock.now()),
        Directive::Button(press) => engine.handle_button(
            press.action,
            press.data.as_ref(),
            press.object_info.as_ref(),
            clock.now(),
        ),
        Directive::ToggleTrail(id) => {
            if engine.toggle_trail(&id, clock.now()).is_none() {
                warn!(id, "toggle trail: no such track");
            }
        }
        Directive::ToggleRadars(on) => {
            if on != engine.radars().visible() {
                if let Err(err) = engine.toggle_radars() {
                    warn!(%err, "radar toggle failed");
                }
            }
        }
    }
}

fn open_store(data_dir: Option<&Path>) -> Result<Box<dyn KeyValueStore>> {
    match resolve_data_dir(data_dir) {
        Some(dir) => Ok(Box::new(JsonFileStore::open(&dir.join("state.json"))?)),
        None => Ok(Box::new(MemoryStore::new())),
    }
}

fn resolve_data_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(dir) => Some(dir.to_path_buf()),
        None => dirs::data_dir().map(|d| d.join("skywatch")),
    }
}

/// Replay an event stream and summarize the resulting picture.
pub fn run(config: Config, events: Option<&Path>, data_dir: Option<&Path>) -> Result<RunSummary> {
    let store = open_store(data_dir)?;
    let api: Box<dyn ChatApi> = Box::new(HttpApi::new(&config.api_base_url));
    let sink = Rc::new(RefCell::new(RecordingSink::new()));
    let ui = Rc::new(RefCell::new(RecordingUi::new()));
    let mut engine = Engine::new(
        config,
        Box::new(RecordingSurface::new()),
        store,
        api,
        Box::new(SharedSink(sink.clone())),
        Box::new(SharedUi(ui.clone())),
    );
    let clock = ManualClock::new(Utc::now());

    let skipped = match events {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            replay(std::io::BufReader::new(file), &mut engine, &clock)?
        }
        None => {
            let stdin = std::io::stdin();
            let locked = stdin.lock();
            replay(locked, &mut engine, &clock)?
        }
    };

    Ok(summarize(&engine, &sink.borrow(), &ui.borrow(), skipped))
}

fn summarize(
    engine: &Engine,
    sink: &RecordingSink,
    ui: &RecordingUi,
    skipped_lines: usize,
) -> RunSummary {
    let tracks = engine
        .registry()
        .iter()
        .map(|entity| TrackLine {
            id: entity.id.clone(),
            kind: entity.kind.as_str().to_string(),
            name: entity.name.clone(),
            identification: entity.current_identification().map(identification_name),
            speed: entity.speed,
        })
        .collect();
    let mut downed: Vec<String> = engine.downed().iter().cloned().collect();
    downed.sort();
    RunSummary {
        tracks,
        chat_messages: engine.chat().messages().len(),
        popup_messages: engine.popup().map(|p| p.messages().len()).unwrap_or(0),
        downed,
        emitted_intents: sink.sent.len(),
        windows_opened: ui.windows.len(),
        alerts: ui.alerts.clone(),
        skipped_lines,
    }
}

/// Fetch the radar stations from the backend.
pub fn radars(config: &Config) -> Result<RadarList> {
    let api = HttpApi::new(&config.api_base_url);
    let stations = api.fetch_radars()?;
    Ok(RadarList { stations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatRequest, RealtimeSession, RoleMessage, SystemMessage};

    struct OfflineApi;

    impl ChatApi for OfflineApi {
        fn ask(&self, _request: &ChatRequest) -> Result<String> {
            Ok("reply".to_string())
        }
        fn summarize(&self, _messages: &[RoleMessage]) -> Result<String> {
            Ok(String::new())
        }
        fn clear_conversation(&self) -> Result<()> {
            Ok(())
        }
        fn set_current_object(&self, _object: &ObjectInfo) -> Result<()> {
            Ok(())
        }
        fn fetch_radars(&self) -> Result<Vec<RadarStation>> {
            Ok(Vec::new())
        }
        fn delete_object(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        fn create_realtime_session(&self, _voice: &str) -> Result<RealtimeSession> {
            Err(crate::Error::Http("offline".to_string()))
        }
        fn fetch_system_messages(&self) -> Result<Vec<SystemMessage>> {
            Ok(Vec::new())
        }
    }

    fn offline_engine() -> (Engine, Rc<RefCell<RecordingSink>>, Rc<RefCell<RecordingUi>>) {
        let sink = Rc::new(RefCell::new(RecordingSink::new()));
        let ui = Rc::new(RefCell::new(RecordingUi::new()));
        let engine = Engine::new(
            Config::default(),
            Box::new(RecordingSurface::new()),
            Box::new(MemoryStore::new()),
            Box::new(OfflineApi),
            Box::new(SharedSink(sink.clone())),
            Box::new(SharedUi(ui.clone())),
        );
        (engine, sink, ui)
    }

    #[test]
    fn replay_reconciles_and_ticks() {
        let (mut engine, sink, ui) = offline_engine();
        let clock = ManualClock::epoch();
        let script = r#"
{"event":"objectChange","data":{"type":"jet","id":"t1","position":[35.0,33.0,8000],"speed":420}}
{"event":"objectChange","data":{"type":"jet","id":"t2","position":[35.2,33.1,9000]}}
{"tick": 51000}
{"event":"objectChange","data":{"type":"jet","id":"t3","position":[35.4,33.2,7000]}}
not json
"#;
        let skipped = replay(script.as_bytes(), &mut engine, &clock).unwrap();
        assert_eq!(skipped, 1);
        // t1 and t2 expired at the 51s tick; t3 arrived after it.
        let summary = summarize(&engine, &sink.borrow(), &ui.borrow(), skipped);
        assert_eq!(summary.tracks.len(), 1);
        assert_eq!(summary.tracks[0].id, "t3");
        assert_eq!(summary.skipped_lines, 1);
    }

    #[test]
    fn replay_drives_chat_and_selection() {
        let (mut engine, sink, ui) = offline_engine();
        let clock = ManualClock::epoch();
        let script = r#"
{"event":"objectChange","data":{"type":"jet","id":"t1","position":[35.0,33.0,8000]}}
{"select":"t1"}
{"chat":"מה זה"}
{"select":"ghost"}
"#;
        let skipped = replay(script.as_bytes(), &mut engine, &clock).unwrap();
        assert_eq!(skipped, 0);
        let summary = summarize(&engine, &sink.borrow(), &ui.borrow(), skipped);
        // Selection report, question, reply.
        assert_eq!(summary.chat_messages, 3);
        assert_eq!(
            engine.chat().current_object().unwrap().id.as_deref(),
            Some("t1")
        );
    }

    #[test]
    fn toggle_radars_directive_targets_the_requested_state() {
        let (mut engine, _sink, _ui) = offline_engine();
        let clock = ManualClock::epoch();
        // Hiding an already hidden picture changes nothing.
        apply(&mut engine, &clock, Directive::ToggleRadars(false));
        assert!(!engine.radars().visible());
        apply(&mut engine, &clock, Directive::ToggleRadars(true));
        assert!(engine.radars().visible());
        // Repeating the shown state does not flip it back off.
        apply(&mut engine, &clock, Directive::ToggleRadars(true));
        assert!(engine.radars().visible());
        apply(&mut engine, &clock, Directive::ToggleRadars(false));
        assert!(!engine.radars().visible());
    }

    #[test]
    fn human_summary_lists_tracks() {
        let (mut engine, sink, ui) = offline_engine();
        let clock = ManualClock::epoch();
        let script = r#"{"event":"objectChange","data":{"type":"jet","id":"t1","position":[35.0,33.0,8000],"speed":420}}"#;
        let skipped = replay(script.as_bytes(), &mut engine, &clock).unwrap();
        let summary = summarize(&engine, &sink.borrow(), &ui.borrow(), skipped);
        let human = summary.to_human();
        assert!(human.contains("Tracks: 1"));
        assert!(human.contains("t1 [jet]"));
        let json: serde_json::Value = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(json["tracks"][0]["id"], "t1");
    }
}
