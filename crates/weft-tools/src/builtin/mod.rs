pub mod react;
pub mod research;
pub mod review;
pub mod text;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use weft_core::error::{Result, WeftError};

/// Input of every tool that takes one block of text.
#[derive(Deserialize)]
pub(crate) struct TextInput {
    pub text: String,
}

pub(crate) fn text_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": { "text": { "type": "string", "description": description } },
        "required": ["text"]
    })
}

pub(crate) fn parse_input<T: DeserializeOwned>(input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| WeftError::ToolValidation(e.to_string()))
}

/// Sentence split on `.`, `!` and `?`, dropping empty fragments.
pub(crate) fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
