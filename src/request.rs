use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GateError, GateResult};

pub const DEFAULT_VOICE: &str = "default";

const EMPTY_INPUT: &str = "input must be non-empty";
const BAD_FORMAT: &str = "response_format must be 'wav' or 'ogg'";

/// Audio container requested from the backend.
///
/// `wav` is relayed as one buffer, `ogg` is relayed chunk by chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, AudioFormat::Ogg)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "ogg" => Ok(AudioFormat::Ogg),
            _ => Err(GateError::invalid_input(BAD_FORMAT)),
        }
    }
}

/// A validated synthesis job, serialized as the backend's request body.
///
/// Only `input`, `voice` and `response_format` ever reach the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisRequest {
    #[serde(rename = "input")]
    pub text: String,
    pub voice: String,
    pub response_format: AudioFormat,
}

impl SynthesisRequest {
    /// Validate a raw job payload.
    pub fn from_payload(payload: &Value) -> GateResult<Self> {
        match payload {
            Value::Object(fields) => Self::from_fields(fields),
            // A job without an input mapping has no text either
            Value::Null => Self::from_fields(&Map::new()),
            _ => Err(GateError::invalid_input("job input must be a JSON object")),
        }
    }

    pub fn from_fields(fields: &Map<String, Value>) -> GateResult<Self> {
        let text = match field(fields, "input") {
            None => return Err(GateError::invalid_input(EMPTY_INPUT)),
            Some(Value::String(text)) if text.is_empty() => {
                return Err(GateError::invalid_input(EMPTY_INPUT));
            }
            Some(Value::String(text)) => text.clone(),
            Some(_) => return Err(GateError::invalid_input("input must be a string")),
        };

        let response_format = match field(fields, "response_format") {
            None => AudioFormat::default(),
            Some(Value::String(format)) => format.parse()?,
            Some(_) => return Err(GateError::invalid_input(BAD_FORMAT)),
        };

        let voice = match field(fields, "voice") {
            None => DEFAULT_VOICE.to_string(),
            Some(Value::String(voice)) => voice.clone(),
            Some(_) => return Err(GateError::invalid_input("voice must be a string")),
        };

        if let Some(model) = field(fields, "model") {
            log::debug!("Ignoring model {} for synthesis request", model);
        }

        Ok(Self {
            text,
            voice,
            response_format,
        })
    }
}

/// Explicit nulls are treated the same as missing keys.
fn field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|value| !value.is_null())
}
