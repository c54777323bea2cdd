//! Tools that drive the browser UI
//!
//! Each action validates its arguments against a typed shape and echoes them
//! back to the client as `{"action": <tool name>, ...args}`. The frontend does
//! the actual work (moving the map, opening a page, editing favourites).

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{ToolError, ToolHandler, ToolRegistry, ToolResult, ToolResultDirection, ToolSchema};

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReturnListingId {
    listing_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ZoomDirection {
    In,
    Out,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ZoomInOrOut {
    direction: ZoomDirection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FavoriteAction {
    Add,
    Remove,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddOrRemoveFromFavorites {
    listing_id: String,
    // `action` in the echoed payload is the tool name
    #[serde(rename(serialize = "operation"))]
    action: FavoriteAction,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NavigatePage {
    page: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendMessage {
    listing_id: String,
    contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Only the preferences the user mentioned are present; the frontend merges.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdatePreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    budget_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    budget_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rooms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<Vec<String>>,
}

/// Handler shared by all UI actions, parameterised by the argument shape.
pub struct ClientActionTool<A> {
    name: &'static str,
    _args: PhantomData<fn() -> A>,
}

impl<A> ClientActionTool<A> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<A> ToolHandler for ClientActionTool<A>
where
    A: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    async fn handle(&self, args: Value) -> Result<ToolResult, ToolError> {
        let parsed: A = serde_json::from_value(args)
            .map_err(|e| ToolError::Execution(format!("invalid {} arguments: {e}", self.name)))?;

        let fields = match serde_json::to_value(parsed) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => Map::new(),
            Err(e) => return Err(ToolError::Execution(e.to_string())),
        };

        let mut payload = Map::with_capacity(fields.len() + 1);
        payload.insert("action".to_string(), Value::String(self.name.to_string()));
        payload.extend(fields);

        Ok(ToolResult::to_client(Value::Object(payload)))
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn register<A>(registry: &mut ToolRegistry, name: &'static str, schema: ToolSchema)
where
    A: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    registry.register(
        name,
        schema,
        Arc::new(ClientActionTool::<A>::new(name)),
        ToolResultDirection::ToClient,
    );
}

/// Register every UI action tool.
pub fn register_client_actions(registry: &mut ToolRegistry) {
    register::<ReturnListingId>(
        registry,
        "return_listing_id",
        ToolSchema::new(
            "Return the id of the listing the user is asking about so it can be highlighted.",
            object_schema(
                json!({
                    "listing_id": {"type": "string", "description": "Id of the listing"}
                }),
                &["listing_id"],
            ),
        ),
    );

    register::<ZoomInOrOut>(
        registry,
        "zoom_in_or_out",
        ToolSchema::new(
            "Zoom the map in or out.",
            object_schema(
                json!({
                    "direction": {"type": "string", "enum": ["in", "out"]}
                }),
                &["direction"],
            ),
        ),
    );

    register::<AddOrRemoveFromFavorites>(
        registry,
        "add_or_remove_from_favorites",
        ToolSchema::new(
            "Add a listing to the user's favorites or remove it.",
            object_schema(
                json!({
                    "listing_id": {"type": "string", "description": "Id of the listing"},
                    "action": {"type": "string", "enum": ["add", "remove"]}
                }),
                &["listing_id", "action"],
            ),
        ),
    );

    register::<NavigatePage>(
        registry,
        "navigate_page",
        ToolSchema::new(
            "Navigate to the page the user asks for.",
            object_schema(
                json!({
                    "page": {
                        "type": "string",
                        "description": "Page to open, for example 'home', 'favorites', 'messages' or 'preferences'"
                    }
                }),
                &["page"],
            ),
        ),
    );

    register::<SendMessage>(
        registry,
        "send_message",
        ToolSchema::new(
            "Open the messaging interface to contact the owner of a listing.",
            object_schema(
                json!({
                    "listing_id": {"type": "string", "description": "Id of the listing"},
                    "contact": {"type": "string", "description": "Contact information of the owner"},
                    "message": {"type": "string", "description": "Optional message draft"}
                }),
                &["listing_id", "contact"],
            ),
        ),
    );

    register::<UpdatePreferences>(
        registry,
        "update_preferences",
        ToolSchema::new(
            "Store the apartment preferences the user mentioned. Only include fields that were discussed.",
            object_schema(
                json!({
                    "budget_min": {"type": "number", "description": "Minimum monthly budget in EUR"},
                    "budget_max": {"type": "number", "description": "Maximum monthly budget in EUR"},
                    "size": {"type": "number", "description": "Desired size in square meters"},
                    "rooms": {"type": "number", "description": "Desired number of rooms"},
                    "location": {"type": "string", "description": "Preferred district or area in Vienna"},
                    "features": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Requested features such as balcony or parking"
                    }
                }),
                &[],
            ),
        ),
    );
}
