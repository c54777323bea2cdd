//! Panic isolation for tool handlers
//!
//! A panicking handler must not take down the session task that dispatched it.
//! The handler future is polled under `catch_unwind` and a panic becomes
//! [`ToolError::Execution`].
//!
//! Only panics on the handler's own poll path are caught; tasks the handler
//! spawns are its own responsibility. Requires `panic = "unwind"`.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::error;

use super::{ToolError, ToolHandler, ToolResult};

/// Run `handler` with `args`, converting a panic into a tool error.
pub async fn call_handler_safely(
    tool_name: &str,
    handler: &dyn ToolHandler,
    args: Value,
) -> Result<ToolResult, ToolError> {
    match AssertUnwindSafe(handler.handle(args)).catch_unwind().await {
        Ok(result) => result,
        Err(panic_info) => {
            let msg = extract_panic_message(panic_info.as_ref());
            error!(tool = %tool_name, message = %msg, "Tool handler panicked");
            Err(ToolError::Execution(format!("handler panicked: {msg}")))
        }
    }
}

/// Best-effort message from a panic payload
fn extract_panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (non-string payload)".to_string()
    }
}
