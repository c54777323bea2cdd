//! Realtime protocol frame kinds and relay-synthesized frames
//!
//! Frames are handled as `serde_json::Value` so fields the relay does not
//! rewrite survive unchanged, including fields added by future API versions.

use phf::phf_map;
use serde_json::{Value, json};

/// Client-visible frame carrying a tool result
pub const TOOL_RESPONSE_EVENT: &str = "extension.middle_tier_tool_response";

/// Frame types the relay acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    // client → upstream
    SessionUpdate,
    ResponseCreate,
    ConversationItemCreate,
    // upstream → client
    SessionCreated,
    SessionUpdated,
    OutputItemAdded,
    ConversationItemCreated,
    FunctionCallArgumentsDelta,
    FunctionCallArgumentsDone,
    OutputItemDone,
    ResponseDone,
    /// Anything else; forwarded untouched
    Other,
}

static FRAME_KINDS: phf::Map<&'static str, FrameKind> = phf_map! {
    "session.update" => FrameKind::SessionUpdate,
    "response.create" => FrameKind::ResponseCreate,
    "conversation.item.create" => FrameKind::ConversationItemCreate,
    "session.created" => FrameKind::SessionCreated,
    "session.updated" => FrameKind::SessionUpdated,
    "response.output_item.added" => FrameKind::OutputItemAdded,
    "conversation.item.created" => FrameKind::ConversationItemCreated,
    "response.function_call_arguments.delta" => FrameKind::FunctionCallArgumentsDelta,
    "response.function_call_arguments.done" => FrameKind::FunctionCallArgumentsDone,
    "response.output_item.done" => FrameKind::OutputItemDone,
    "response.done" => FrameKind::ResponseDone,
};

#[inline]
pub fn frame_kind(frame: &Value) -> FrameKind {
    frame
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| FRAME_KINDS.get(t).copied())
        .unwrap_or(FrameKind::Other)
}

/// `item.type` of a frame carrying a conversation item
#[inline]
pub fn item_type(frame: &Value) -> Option<&str> {
    frame.get("item")?.get("type")?.as_str()
}

pub fn is_function_call_item(frame: &Value) -> bool {
    item_type(frame) == Some("function_call")
}

pub fn is_function_call_output_item(frame: &Value) -> bool {
    item_type(frame) == Some("function_call_output")
}

/// Tool result handed back to the model
pub fn function_call_output(call_id: &str, output: &str) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "function_call_output",
            "call_id": call_id,
            "output": output,
        }
    })
}

/// Asks the model to continue once tool results are in
pub fn response_create() -> Value {
    json!({ "type": "response.create" })
}

/// Client notification for a `TO_CLIENT` result
pub fn tool_response_notification(
    previous_item_id: Option<&str>,
    call_id: &str,
    tool_name: &str,
    tool_result: &str,
) -> Value {
    json!({
        "type": TOOL_RESPONSE_EVENT,
        "previous_item_id": previous_item_id,
        "call_id": call_id,
        "tool_name": tool_name,
        "tool_result": tool_result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_kind_lookup() {
        assert_eq!(
            frame_kind(&json!({"type": "session.update"})),
            FrameKind::SessionUpdate
        );
        assert_eq!(
            frame_kind(&json!({"type": "response.function_call_arguments.delta"})),
            FrameKind::FunctionCallArgumentsDelta
        );
        assert_eq!(
            frame_kind(&json!({"type": "response.audio.delta"})),
            FrameKind::Other
        );
        assert_eq!(frame_kind(&json!({"no_type": true})), FrameKind::Other);
        assert_eq!(frame_kind(&json!({"type": 7})), FrameKind::Other);
    }

    #[test]
    fn test_item_type_helpers() {
        let frame = json!({"item": {"type": "function_call", "call_id": "c1"}});
        assert!(is_function_call_item(&frame));
        assert!(!is_function_call_output_item(&frame));
        assert_eq!(item_type(&json!({"item": "oops"})), None);
    }

    #[test]
    fn test_function_call_output_carries_text() {
        let frame = function_call_output("call_1", r#"{"listings":[]}"#);
        assert_eq!(frame["type"], "conversation.item.create");
        assert_eq!(frame["item"]["call_id"], "call_1");
        assert_eq!(frame["item"]["output"], r#"{"listings":[]}"#);
    }

    #[test]
    fn test_notification_without_previous_item() {
        let frame = tool_response_notification(None, "call_1", "search", "{}");
        assert_eq!(frame["type"], TOOL_RESPONSE_EVENT);
        assert!(frame["previous_item_id"].is_null());
        assert_eq!(frame["tool_name"], "search");
    }
}
