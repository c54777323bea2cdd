//! Per-session tool-call bookkeeping
//!
//! Upstream announces a function call, streams its arguments in fragments and
//! then signals completion, possibly more than once (`arguments.done`,
//! `output_item.done`, `response.done`). The tracker buffers fragments and
//! releases each call for dispatch exactly once.
//!
//! It also decides when the model may continue: after a response that issued
//! tool calls is done, a `response.create` is due once every dispatched call
//! has delivered its result.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use super::messages::{FrameKind, is_function_call_item};

#[derive(Debug, Default)]
struct PendingCall {
    name: String,
    previous_item_id: Option<String>,
    arguments: String,
}

/// A call whose arguments are complete
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
    pub previous_item_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct ToolCallTracker {
    pending: HashMap<String, PendingCall>,
    /// Ids released during the current response
    dispatched: HashSet<String>,
    /// Released calls whose result has not been delivered yet
    in_flight: HashSet<String>,
    continuation_due: bool,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an upstream frame; returns calls that became ready.
    pub fn observe(&mut self, kind: FrameKind, frame: &Value) -> Vec<ReadyCall> {
        match kind {
            FrameKind::OutputItemAdded if is_function_call_item(frame) => {
                self.on_call_started(&frame["item"]);
                Vec::new()
            }
            FrameKind::ConversationItemCreated if is_function_call_item(frame) => {
                let item = &frame["item"];
                self.on_call_started(item);
                if let Some(call) = str_field(item, "call_id").and_then(|id| self.pending.get_mut(id)) {
                    call.previous_item_id = str_field(frame, "previous_item_id").map(str::to_string);
                }
                Vec::new()
            }
            FrameKind::FunctionCallArgumentsDelta => {
                self.on_arguments_delta(frame);
                Vec::new()
            }
            FrameKind::FunctionCallArgumentsDone => {
                self.complete(frame).into_iter().collect()
            }
            FrameKind::OutputItemDone if is_function_call_item(frame) => {
                self.complete(&frame["item"]).into_iter().collect()
            }
            FrameKind::ResponseDone => self.on_response_done(frame),
            _ => Vec::new(),
        }
    }

    /// Record that a released call has delivered its result.
    pub fn finish(&mut self, call_id: &str) {
        if !self.in_flight.remove(call_id) {
            warn!(call_id = %call_id, "Tool result for a call that is not in flight");
        }
    }

    /// True once, when the model should be asked to continue.
    pub fn take_continuation(&mut self) -> bool {
        if self.continuation_due && self.in_flight.is_empty() {
            self.continuation_due = false;
            return true;
        }
        false
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Calls announced but not yet released
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn is_released(&self, call_id: &str) -> bool {
        self.dispatched.contains(call_id) || self.in_flight.contains(call_id)
    }

    fn on_call_started(&mut self, item: &Value) {
        let Some(call_id) = str_field(item, "call_id") else {
            warn!("Function call item without call_id");
            return;
        };
        if self.is_released(call_id) {
            return;
        }

        let call = self.pending.entry(call_id.to_string()).or_default();
        if call.name.is_empty()
            && let Some(name) = str_field(item, "name")
        {
            call.name = name.to_string();
        }
        debug!(call_id = %call_id, tool = %call.name, "Tool call started");
    }

    fn on_arguments_delta(&mut self, frame: &Value) {
        let (Some(call_id), Some(delta)) = (str_field(frame, "call_id"), str_field(frame, "delta"))
        else {
            warn!("Argument delta without call_id or delta");
            return;
        };
        if self.is_released(call_id) {
            warn!(call_id = %call_id, "Argument delta after dispatch ignored");
            return;
        }
        self.pending
            .entry(call_id.to_string())
            .or_default()
            .arguments
            .push_str(delta);
    }

    /// `source` is the completion frame or its function_call item; both carry
    /// `call_id`, and usually `name` and the full `arguments`.
    fn complete(&mut self, source: &Value) -> Option<ReadyCall> {
        let call_id = str_field(source, "call_id")?;
        if self.is_released(call_id) {
            return None;
        }

        let call = self.pending.remove(call_id).unwrap_or_default();
        let name = if call.name.is_empty() {
            str_field(source, "name").unwrap_or_default().to_string()
        } else {
            call.name
        };
        let arguments = if call.arguments.is_empty() {
            str_field(source, "arguments").unwrap_or_default().to_string()
        } else {
            call.arguments
        };

        self.dispatched.insert(call_id.to_string());
        self.in_flight.insert(call_id.to_string());

        Some(ReadyCall {
            call_id: call_id.to_string(),
            name,
            arguments,
            previous_item_id: call.previous_item_id,
        })
    }

    fn on_response_done(&mut self, frame: &Value) -> Vec<ReadyCall> {
        // Calls whose completion frames never arrived are released from the
        // final response output
        let ready: Vec<ReadyCall> = frame
            .get("response")
            .and_then(|r| r.get("output"))
            .and_then(Value::as_array)
            .map(|output| {
                output
                    .iter()
                    .filter(|item| str_field(item, "type") == Some("function_call"))
                    .filter_map(|item| self.complete(item))
                    .collect()
            })
            .unwrap_or_default();

        for (call_id, call) in self.pending.drain() {
            warn!(call_id = %call_id, tool = %call.name, "Tool call never completed, discarding");
        }
        if !self.dispatched.is_empty() {
            self.dispatched.clear();
            self.continuation_due = true;
        }
        ready
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::messages::frame_kind;
    use serde_json::json;

    fn feed(tracker: &mut ToolCallTracker, frame: Value) -> Vec<ReadyCall> {
        tracker.observe(frame_kind(&frame), &frame)
    }

    fn start(tracker: &mut ToolCallTracker, call_id: &str, name: &str) {
        feed(
            tracker,
            json!({
                "type": "response.output_item.added",
                "response_id": "resp_1",
                "item": {"type": "function_call", "call_id": call_id, "name": name, "arguments": ""}
            }),
        );
        feed(
            tracker,
            json!({
                "type": "conversation.item.created",
                "previous_item_id": "item_prev",
                "item": {"type": "function_call", "call_id": call_id, "name": name}
            }),
        );
    }

    #[test]
    fn test_deltas_are_concatenated_and_released_once() {
        let mut tracker = ToolCallTracker::new();
        start(&mut tracker, "call_1", "search");

        for delta in [r#"{"query":"#, r#""2 bedroom "#, r#"near Mariahilf"}"#] {
            let ready = feed(
                &mut tracker,
                json!({"type": "response.function_call_arguments.delta", "call_id": "call_1", "delta": delta}),
            );
            assert!(ready.is_empty());
        }

        let ready = feed(
            &mut tracker,
            json!({"type": "response.function_call_arguments.done", "call_id": "call_1"}),
        );
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "search");
        assert_eq!(ready[0].previous_item_id.as_deref(), Some("item_prev"));
        let args: Value = serde_json::from_str(&ready[0].arguments).unwrap();
        assert_eq!(args, json!({"query": "2 bedroom near Mariahilf"}));

        // Later completion signals for the same call are ignored
        let again = feed(
            &mut tracker,
            json!({
                "type": "response.output_item.done",
                "item": {"type": "function_call", "call_id": "call_1", "name": "search", "arguments": "{}"}
            }),
        );
        assert!(again.is_empty());
        let again = feed(
            &mut tracker,
            json!({
                "type": "response.done",
                "response": {"output": [{"type": "function_call", "call_id": "call_1", "name": "search", "arguments": "{}"}]}
            }),
        );
        assert!(again.is_empty());
        assert_eq!(tracker.in_flight(), 1);
    }

    #[test]
    fn test_output_item_done_is_a_fallback() {
        let mut tracker = ToolCallTracker::new();
        start(&mut tracker, "call_2", "zoom_in_or_out");

        let ready = feed(
            &mut tracker,
            json!({
                "type": "response.output_item.done",
                "item": {"type": "function_call", "call_id": "call_2", "name": "zoom_in_or_out", "arguments": "{\"direction\":\"in\"}"}
            }),
        );
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].arguments, "{\"direction\":\"in\"}");
    }

    #[test]
    fn test_continuation_waits_for_all_results() {
        let mut tracker = ToolCallTracker::new();
        for id in ["a", "b"] {
            start(&mut tracker, id, "search");
            feed(
                &mut tracker,
                json!({"type": "response.function_call_arguments.done", "call_id": id, "arguments": "{}"}),
            );
        }

        feed(&mut tracker, json!({"type": "response.done", "response": {"output": []}}));
        assert!(!tracker.take_continuation());

        tracker.finish("a");
        assert!(!tracker.take_continuation());
        tracker.finish("b");
        assert!(tracker.take_continuation());
        assert!(!tracker.take_continuation());
    }

    #[test]
    fn test_results_before_response_done() {
        let mut tracker = ToolCallTracker::new();
        start(&mut tracker, "a", "search");
        feed(
            &mut tracker,
            json!({"type": "response.function_call_arguments.done", "call_id": "a", "arguments": "{}"}),
        );
        tracker.finish("a");
        assert!(!tracker.take_continuation());

        feed(&mut tracker, json!({"type": "response.done", "response": {"output": []}}));
        assert!(tracker.take_continuation());
    }

    #[test]
    fn test_response_without_tool_calls_needs_no_continuation() {
        let mut tracker = ToolCallTracker::new();
        feed(
            &mut tracker,
            json!({"type": "response.done", "response": {"output": [{"type": "message"}]}}),
        );
        assert!(!tracker.take_continuation());
    }

    #[test]
    fn test_response_done_discards_incomplete_calls() {
        let mut tracker = ToolCallTracker::new();
        start(&mut tracker, "ghost", "search");
        feed(
            &mut tracker,
            json!({"type": "response.function_call_arguments.delta", "call_id": "ghost", "delta": "{"}),
        );
        assert_eq!(tracker.pending(), 1);

        let ready = feed(&mut tracker, json!({"type": "response.done", "response": {"output": []}}));
        assert!(ready.is_empty());
        assert_eq!(tracker.pending(), 0);
        assert!(!tracker.take_continuation());
    }

    #[test]
    fn test_released_ids_are_forgotten_after_delivery() {
        let mut tracker = ToolCallTracker::new();
        start(&mut tracker, "a", "search");
        feed(
            &mut tracker,
            json!({"type": "response.function_call_arguments.done", "call_id": "a", "arguments": "{}"}),
        );
        feed(&mut tracker, json!({"type": "response.done", "response": {"output": []}}));

        // Still running: a repeated completion is ignored across responses
        let repeat = feed(
            &mut tracker,
            json!({"type": "response.function_call_arguments.done", "call_id": "a", "arguments": "{}"}),
        );
        assert!(repeat.is_empty());

        tracker.finish("a");
        assert!(tracker.take_continuation());
        assert!(tracker.dispatched.is_empty());
        assert!(tracker.in_flight.is_empty());
    }

    #[test]
    fn test_response_done_releases_unfinished_calls() {
        let mut tracker = ToolCallTracker::new();
        start(&mut tracker, "late", "navigate_page");

        let ready = feed(
            &mut tracker,
            json!({
                "type": "response.done",
                "response": {"output": [
                    {"type": "function_call", "call_id": "late", "name": "navigate_page", "arguments": "{\"page\":\"home\"}"}
                ]}
            }),
        );
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].call_id, "late");

        tracker.finish("late");
        assert!(tracker.take_continuation());
    }
}
