//! Handshake payload (`SettingsConfiguration`).
//!
//! Sent once, as the very first message on a new connection. It tells the
//! agent what audio to expect and produce and how to behave, including the
//! order functions it may call on the backend for this session.

use crate::backend::{BackendClient, Menu, SessionId};
use crate::config::{AgentConfig, AudioConfig};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct SettingsConfiguration {
    #[serde(rename = "type")]
    message_type: &'static str,
    pub audio: AudioSettings,
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioSettings {
    pub input: InputAudio,
    pub output: OutputAudio,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputAudio {
    pub encoding: String,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputAudio {
    pub encoding: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSettings {
    pub listen: ModelSettings,
    pub think: ThinkSettings,
    pub speak: ModelSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSettings {
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThinkSettings {
    pub provider: String,
    pub model: String,
    pub instructions: String,
    pub functions: Vec<FunctionSpec>,
}

/// A backend endpoint the agent may call, described with a JSON schema.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub url: String,
    pub method: String,
    pub parameters: Value,
}

const LINEAR16: &str = "linear16";

impl SettingsConfiguration {
    /// Build the handshake for one session.
    ///
    /// `menu`, when known and non-empty, is listed in the instructions and
    /// constrains the `item` parameter of the order functions.
    pub fn for_session(
        agent: &AgentConfig,
        audio: &AudioConfig,
        backend: &BackendClient,
        session_id: &SessionId,
        menu: Option<&Menu>,
    ) -> Self {
        let menu = menu.filter(|m| !m.is_empty());
        let order_url = backend.order_items_url(session_id);

        let functions = vec![
            FunctionSpec {
                name: "add_item_to_order".to_string(),
                description: "Add one or more of a menu item to the customer's order.".to_string(),
                url: order_url.clone(),
                method: "post".to_string(),
                parameters: item_parameters(menu),
            },
            FunctionSpec {
                name: "remove_item_from_order".to_string(),
                description: "Remove one or more of an item from the customer's order.".to_string(),
                url: order_url,
                method: "delete".to_string(),
                parameters: item_parameters(menu),
            },
        ];

        Self {
            message_type: "SettingsConfiguration",
            audio: AudioSettings {
                input: InputAudio {
                    encoding: LINEAR16.to_string(),
                    sample_rate: audio.capture_sample_rate,
                },
                output: OutputAudio {
                    encoding: LINEAR16.to_string(),
                    sample_rate: audio.playback_sample_rate,
                    container: Some("none".to_string()),
                    buffer_size: Some(audio.playback_buffer_size),
                },
            },
            agent: AgentSettings {
                listen: ModelSettings {
                    model: agent.listen_model.clone(),
                },
                think: ThinkSettings {
                    provider: agent.think_provider.clone(),
                    model: agent.think_model.clone(),
                    instructions: instructions(&agent.instructions, menu),
                    functions,
                },
                speak: ModelSettings {
                    model: agent.speak_model.clone(),
                },
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn instructions(base: &str, menu: Option<&Menu>) -> String {
    let Some(menu) = menu else {
        return base.to_string();
    };

    let mut lines = vec![base.to_string(), "The menu is:".to_string()];
    for name in menu.item_names() {
        let item = &menu.items[name];
        lines.push(format!("- {} ({:.2}): {}", item.name, item.price, item.description));
    }
    lines.join("\n")
}

fn item_parameters(menu: Option<&Menu>) -> Value {
    let mut item = json!({
        "type": "string",
        "description": "The menu item the customer is talking about.",
    });
    if let Some(menu) = menu {
        item["enum"] = json!(menu.item_names());
    }

    json!({
        "type": "object",
        "properties": {
            "item": item,
            "quantity": {
                "type": "integer",
                "description": "How many of the item. Defaults to 1.",
            },
        },
        "required": ["item"],
    })
}
