//! Frame rewriting at the relay boundary
//!
//! Inbound frames (client → upstream) have the server-held session settings
//! and tool list forced onto them. Outbound frames (upstream → client) are
//! scrubbed of tool internals and server settings. Frames no rule matches are
//! forwarded unchanged.

use serde_json::{Map, Value, json};

use super::messages::{
    FrameKind, frame_kind, is_function_call_item, is_function_call_output_item,
};
use crate::core::tools::ToolRegistry;

/// Server-held values that win over anything the client sends
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub system_message: Option<String>,
    pub voice_choice: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub disable_audio: bool,
}

/// Outcome of applying the rules to one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    Forward(Value),
    Drop,
}

#[derive(Debug, Clone)]
pub struct MessageRewriter {
    settings: SessionSettings,
    tool_schemas: Vec<Value>,
}

impl MessageRewriter {
    pub fn new(settings: SessionSettings, registry: &ToolRegistry) -> Self {
        Self {
            settings,
            tool_schemas: registry.schemas(),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Client → upstream
    pub fn inbound(&self, mut frame: Value) -> Rewrite {
        match frame_kind(&frame) {
            FrameKind::SessionUpdate => {
                if let Some(session) = object_field(&mut frame, "session") {
                    self.apply_session_overrides(session);
                }
                Rewrite::Forward(frame)
            }
            FrameKind::ResponseCreate => {
                if let Some(response) = frame.get_mut("response").and_then(Value::as_object_mut) {
                    response.remove("tools");
                    response.remove("tool_choice");
                    response.remove("instructions");
                }
                Rewrite::Forward(frame)
            }
            // Function results are produced by the relay only
            FrameKind::ConversationItemCreate if is_function_call_output_item(&frame) => {
                Rewrite::Drop
            }
            _ => Rewrite::Forward(frame),
        }
    }

    /// Upstream → client
    pub fn outbound(&self, mut frame: Value) -> Rewrite {
        match frame_kind(&frame) {
            FrameKind::SessionCreated | FrameKind::SessionUpdated => {
                if let Some(session) = frame.get_mut("session").and_then(Value::as_object_mut) {
                    session.insert("instructions".into(), json!(""));
                    session.insert("tools".into(), json!([]));
                    session.insert("tool_choice".into(), json!("none"));
                    session.insert("voice".into(), json!(self.settings.voice_choice));
                    session.insert("max_response_output_tokens".into(), Value::Null);
                }
                Rewrite::Forward(frame)
            }
            FrameKind::OutputItemAdded | FrameKind::OutputItemDone
                if is_function_call_item(&frame) =>
            {
                Rewrite::Drop
            }
            FrameKind::ConversationItemCreated
                if is_function_call_item(&frame) || is_function_call_output_item(&frame) =>
            {
                Rewrite::Drop
            }
            FrameKind::FunctionCallArgumentsDelta | FrameKind::FunctionCallArgumentsDone => {
                Rewrite::Drop
            }
            FrameKind::ResponseDone => {
                if let Some(output) = frame
                    .get_mut("response")
                    .and_then(|r| r.get_mut("output"))
                    .and_then(Value::as_array_mut)
                {
                    output.retain(|item| {
                        item.get("type").and_then(Value::as_str) != Some("function_call")
                    });
                }
                Rewrite::Forward(frame)
            }
            _ => Rewrite::Forward(frame),
        }
    }

    fn apply_session_overrides(&self, session: &mut Map<String, Value>) {
        let settings = &self.settings;

        if let Some(message) = &settings.system_message {
            session.insert("instructions".into(), json!(message));
        }
        if let Some(temperature) = settings.temperature {
            session.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = settings.max_tokens {
            session.insert("max_response_output_tokens".into(), json!(max_tokens));
        }
        session.insert("voice".into(), json!(settings.voice_choice));

        let tool_choice = if self.tool_schemas.is_empty() { "none" } else { "auto" };
        session.insert("tool_choice".into(), json!(tool_choice));
        session.insert("tools".into(), Value::Array(self.tool_schemas.clone()));

        // Routing is decided by the server
        session.remove("model");

        if settings.disable_audio {
            session.insert("modalities".into(), json!(["text"]));
        }
    }
}

/// Object at `frame[key]`, replacing a missing or non-object value.
fn object_field<'a>(frame: &'a mut Value, key: &str) -> Option<&'a mut Map<String, Value>> {
    let root = frame.as_object_mut()?;
    if !root.get(key).is_some_and(Value::is_object) {
        root.insert(key.to_string(), Value::Object(Map::new()));
    }
    root.get_mut(key).and_then(Value::as_object_mut)
}
