use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ids::TriggerId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
    #[default]
    #[serde(other)]
    Ephemeral,
}

impl ResponseType {
    /// Lenient parse used for form-encoded replies. Anything unrecognised is
    /// ephemeral.
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "in_channel" => Self::InChannel,
            _ => Self::Ephemeral,
        }
    }
}

/// Explicit `null` decodes to the field default, same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Reply handed back to the conversation after an execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub response_type: ResponseType,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon_url: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub message_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub props: Map<String, Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub goto_location: String,
    #[serde(deserialize_with = "null_as_default")]
    pub attachments: Vec<Value>,
    /// Set by the normalizer only; a value sent by the integration is ignored.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<TriggerId>,
}

impl CommandResponse {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.attachments.is_empty() && self.goto_location.is_empty()
    }
}
