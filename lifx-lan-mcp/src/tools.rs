//! MCP tool definitions and handlers.
//!
//! Every tool maps onto one [`CommandDispatcher`] operation. Arguments are
//! deserialized into typed structs; range checks on colors happen in the
//! dispatcher, before any network traffic.

use std::sync::Arc;
use std::time::Duration;

use lifx_lan_lib::dispatch::CommandDispatcher;
use lifx_lan_lib::light::color::Color;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const LIST_LIGHTS: &str = "lifx_lan_list_lights";
pub const GET_STATES: &str = "lifx_lan_get_states";
pub const SET_COLOR: &str = "lifx_lan_set_color";
pub const TURN_ON: &str = "lifx_lan_turn_on";
pub const TURN_OFF: &str = "lifx_lan_turn_off";

fn labels_schema() -> Value {
    json!({
        "type": "array",
        "items": { "type": "string", "minLength": 1 },
        "minItems": 1,
        "description": "Labels of the lights to address, as shown by lifx_lan_list_lights."
    })
}

fn color_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hue": { "type": "number", "minimum": 0, "maximum": 1 },
            "saturation": { "type": "number", "minimum": 0, "maximum": 1 },
            "brightness": { "type": "number", "minimum": 0, "maximum": 1 },
            "kelvin": {
                "type": "integer",
                "minimum": 1500,
                "maximum": 9000,
                "description": "Color temperature. Defaults to 3500."
            }
        },
        "required": ["hue", "saturation", "brightness"],
        "additionalProperties": false
    })
}

fn duration_schema() -> Value {
    json!({
        "type": "integer",
        "minimum": 0,
        "description": "Transition time in milliseconds. Defaults to 0."
    })
}

fn tool(name: &'static str, description: &'static str, input_schema: Value) -> Tool {
    let schema: JsonObject = match input_schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    Tool::new(name, description, Arc::new(schema))
}

/// Returns the definitions advertised by `tools/list`.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        tool(
            LIST_LIGHTS,
            "Discover every LIFX light on the local network and list its label, group \
             and location.",
            json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        ),
        tool(
            GET_STATES,
            "Get the current power and color of one or more lights.",
            json!({
                "type": "object",
                "properties": { "labels": labels_schema() },
                "required": ["labels"],
                "additionalProperties": false
            }),
        ),
        tool(
            SET_COLOR,
            "Set the color of one or more lights. Fails as a whole if any light fails.",
            json!({
                "type": "object",
                "properties": {
                    "labels": labels_schema(),
                    "color": color_schema(),
                    "duration": duration_schema()
                },
                "required": ["labels", "color"],
                "additionalProperties": false
            }),
        ),
        tool(
            TURN_ON,
            "Turn on one or more lights, optionally switching to a color.",
            json!({
                "type": "object",
                "properties": {
                    "labels": labels_schema(),
                    "color": color_schema(),
                    "duration": duration_schema()
                },
                "required": ["labels"],
                "additionalProperties": false
            }),
        ),
        tool(
            TURN_OFF,
            "Turn off one or more lights.",
            json!({
                "type": "object",
                "properties": {
                    "labels": labels_schema(),
                    "duration": duration_schema()
                },
                "required": ["labels"],
                "additionalProperties": false
            }),
        ),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetStatesArgs {
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetColorArgs {
    labels: Vec<String>,
    color: Color,
    #[serde(default)]
    duration: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TurnOnArgs {
    labels: Vec<String>,
    #[serde(default)]
    color: Option<Color>,
    #[serde(default)]
    duration: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TurnOffArgs {
    labels: Vec<String>,
    #[serde(default)]
    duration: u64,
}

/// Outcome of one tool call: the text shown to the caller and whether it is a failure.
#[derive(Debug)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolResult {
    fn success<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(text) => Self {
                text,
                is_error: false,
            },
            Err(e) => Self::error(format!("Failed to encode result: {}", e)),
        }
    }

    fn error(message: String) -> Self {
        Self {
            text: format!("Error: {}", message),
            is_error: true,
        }
    }

    fn from_outcome<T: Serialize>(outcome: lifx_lan_lib::Result<T>) -> Self {
        match outcome {
            Ok(value) => Self::success(&value),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

impl From<ToolResult> for CallToolResult {
    fn from(result: ToolResult) -> Self {
        let content = vec![Content::text(result.text)];
        if result.is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        }
    }
}

fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T, ToolResult> {
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args)
        .map_err(|e| ToolResult::error(format!("Invalid arguments: {}", e)))
}

/// Handles a `tools/call` for the tool `name`.
pub async fn handle_tool_call(
    name: &str,
    args: &Value,
    dispatcher: &CommandDispatcher,
) -> ToolResult {
    match name {
        LIST_LIGHTS => match parse_args::<NoArgs>(args) {
            Ok(_) => ToolResult::from_outcome(dispatcher.list_lights().await),
            Err(e) => e,
        },
        GET_STATES => match parse_args::<GetStatesArgs>(args) {
            Ok(a) => ToolResult::from_outcome(dispatcher.get_states(&a.labels).await),
            Err(e) => e,
        },
        SET_COLOR => match parse_args::<SetColorArgs>(args) {
            Ok(a) => ToolResult::from_outcome(
                dispatcher
                    .set_color(&a.labels, a.color, Duration::from_millis(a.duration))
                    .await,
            ),
            Err(e) => e,
        },
        TURN_ON => match parse_args::<TurnOnArgs>(args) {
            Ok(a) => ToolResult::from_outcome(
                dispatcher
                    .turn_on(&a.labels, a.color, Duration::from_millis(a.duration))
                    .await,
            ),
            Err(e) => e,
        },
        TURN_OFF => match parse_args::<TurnOffArgs>(args) {
            Ok(a) => ToolResult::from_outcome(
                dispatcher
                    .turn_off(&a.labels, Duration::from_millis(a.duration))
                    .await,
            ),
            Err(e) => e,
        },
        _ => ToolResult::error(format!("Unknown tool: {}", name)),
    }
}
