//! Real-time channel protocol and the outbound half of the pipe.
//!
//! Events are framed as `{"event": <name>, "data": <payload>}`; the event
//! names and payload shapes mirror the socket protocol of the backend. The
//! payload keeps its own `type` field for the marker kind, so the frame
//! cannot reuse it. The outbound side goes through a
//! [`Channel`], which drops intents with a warning when the sink reports a
//! broken connection: losing an approval is acceptable, wedging the engine
//! is not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chat::ChatButton;
use crate::models::{ObjectInfo, ObjectUpdate};

/// Event arriving over the real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    /// Create-or-update record for one track.
    #[serde(rename = "objectChange")]
    ObjectChange(ObjectUpdate),
    /// Broadcast chat message for the primary surface.
    #[serde(rename = "chatMessage")]
    ChatMessage(IncomingChat),
    /// Instruction to tear down a synthetic overlay.
    #[serde(rename = "removeSpecialTrail")]
    RemoveSpecialTrail {
        #[serde(rename = "objectId")]
        object_id: String,
    },
}

/// Payload of an inbound `chatMessage` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingChat {
    pub message: String,
    pub sender: String,
    /// Carried through for lossless re-serialization; the engine stamps
    /// messages with its own clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<ChatButton>,
    #[serde(
        default,
        rename = "objectData",
        skip_serializing_if = "Option::is_none"
    )]
    pub object_data: Option<ObjectInfo>,
}

/// Intent emitted back to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundIntent {
    #[serde(rename = "approveClassification")]
    ApproveClassification {
        #[serde(rename = "objectData")]
        object_data: ObjectInfo,
    },
    #[serde(rename = "removeSpecialTrail")]
    RemoveSpecialTrail {
        #[serde(rename = "objectId")]
        object_id: String,
    },
}

/// Transport for outbound intents.
pub trait OutboundSink {
    fn connected(&self) -> bool;
    fn send(&mut self, intent: &OutboundIntent) -> crate::Result<()>;
}

/// Outbound half of the channel.
pub struct Channel {
    sink: Box<dyn OutboundSink>,
}

impl Channel {
    pub fn new(sink: Box<dyn OutboundSink>) -> Self {
        Self { sink }
    }

    /// Emit an intent. A disconnected sink or a send failure drops the
    /// intent with a warning.
    pub fn emit(&mut self, intent: OutboundIntent) {
        if !self.sink.connected() {
            warn!(?intent, "channel disconnected, dropping outbound intent");
            return;
        }
        if let Err(err) = self.sink.send(&intent) {
            warn!(?intent, %err, "failed to send outbound intent");
        }
    }
}

/// Sink that records every sent intent. Used by tests and the CLI driver.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub connected: bool,
    pub sent: Vec<OutboundIntent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            connected: true,
            sent: Vec::new(),
        }
    }
}

impl OutboundSink for RecordingSink {
    fn connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, intent: &OutboundIntent) -> crate::Result<()> {
        self.sent.push(intent.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarkerKind, Position};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn inbound_events_parse_by_event_name() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"event":"objectChange","data":{"type":"jet","id":"t1","position":[35.0,33.0,1000]}}"#,
        )
        .unwrap();
        match event {
            InboundEvent::ObjectChange(update) => {
                assert_eq!(update.kind, MarkerKind::Jet);
                assert_eq!(update.id.as_deref(), Some("t1"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let frame = r#"{"event":"chatMessage","data":{"message":"contact","sender":"Classification System","timestamp":"2024-05-01T10:00:00Z"}}"#;
        let event: InboundEvent = serde_json::from_str(frame).unwrap();
        match &event {
            InboundEvent::ChatMessage(chat) => {
                assert_eq!(chat.message, "contact");
                assert!(chat.buttons.is_empty());
                assert!(chat.timestamp.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
        // The timestamp survives re-serialization with the wire format intact.
        assert_eq!(serde_json::to_string(&event).unwrap(), frame);

        let bare: InboundEvent = serde_json::from_str(
            r#"{"event":"chatMessage","data":{"message":"contact","sender":"Classification System"}}"#,
        )
        .unwrap();
        match bare {
            InboundEvent::ChatMessage(chat) => assert!(chat.timestamp.is_none()),
            other => panic!("unexpected event {other:?}"),
        }

        let event: InboundEvent = serde_json::from_str(
            r#"{"event":"removeSpecialTrail","data":{"objectId":"t9"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::RemoveSpecialTrail {
                object_id: "t9".to_string()
            }
        );
    }

    #[test]
    fn outbound_intent_wire_shape() {
        let intent = OutboundIntent::RemoveSpecialTrail {
            object_id: "t9".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&intent).unwrap(),
            r#"{"event":"removeSpecialTrail","data":{"objectId":"t9"}}"#
        );
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

    #[test]
    fn disconnected_channel_drops_intents() {
        let inner = Rc::new(RefCell::new(RecordingSink::new()));
        inner.borrow_mut().connected = false;
        let mut channel = Channel::new(Box::new(SharedSink(inner.clone())));
        channel.emit(OutboundIntent::ApproveClassification {
            object_data: ObjectInfo {
                id: Some("t1".to_string()),
                name: None,
                position: Position::new(35.0, 33.0, 0.0),
                speed: 0.0,
                size: 1.0,
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
        });
        assert!(inner.borrow().sent.is_empty());

        inner.borrow_mut().connected = true;
        channel.emit(OutboundIntent::RemoveSpecialTrail {
            object_id: "t1".to_string(),
        });
        assert_eq!(inner.borrow().sent.len(), 1);
    }
}
