//! Client-facing request and response shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::orchestrator::error::OrchestratorError;
use crate::upstream::detector::ChatTurn;

/// Per-detector parameters from the request body. `threshold` is consumed
/// by the orchestrator, everything else goes to the detector.
pub type DetectorParams = Map<String, Value>;

/// Optional `detectors` field of the request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorSelection {
    #[serde(default)]
    pub input: BTreeMap<String, DetectorParams>,
    #[serde(default)]
    pub output: BTreeMap<String, DetectorParams>,
}

/// Text or multi-part message content.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    /// The text a detector should screen; non-text parts are skipped.
    pub fn text(&self) -> Option<String> {
        match self {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter(|p| p.kind == "text")
                    .filter_map(|p| p.text.as_deref())
                    .collect();
                (!texts.is_empty()).then(|| texts.join("\n"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl ChatMessage {
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().and_then(MessageContent::text)
    }
}

/// A validated chat-completions-detection request.
#[derive(Debug, Clone)]
pub struct ChatDetectionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub detectors: Option<DetectorSelection>,
    /// Body forwarded to the primary service (without `detectors`).
    pub forward_body: Map<String, Value>,
}

impl ChatDetectionRequest {
    /// Parse and validate a raw JSON body.
    pub fn parse(body: &[u8]) -> Result<Self, OrchestratorError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| OrchestratorError::InvalidRequest(format!("invalid JSON body: {e}")))?;
        let Value::Object(mut forward_body) = value else {
            return Err(OrchestratorError::InvalidRequest(
                "request body must be a JSON object".to_string(),
            ));
        };

        let detectors = match forward_body.remove("detectors") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(serde_json::from_value(raw).map_err(|e| {
                OrchestratorError::InvalidRequest(format!("invalid `detectors`: {e}"))
            })?),
        };

        let model = match forward_body.get("model") {
            Some(Value::String(model)) if !model.trim().is_empty() => model.clone(),
            Some(_) => {
                return Err(OrchestratorError::InvalidRequest(
                    "`model` must be a non-empty string".to_string(),
                ))
            }
            None => {
                return Err(OrchestratorError::InvalidRequest(
                    "missing required field `model`".to_string(),
                ))
            }
        };

        let messages: Vec<ChatMessage> = match forward_body.get("messages") {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                OrchestratorError::InvalidRequest(format!("invalid `messages`: {e}"))
            })?,
            None => {
                return Err(OrchestratorError::InvalidRequest(
                    "missing required field `messages`".to_string(),
                ))
            }
        };
        if messages.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "`messages` must not be empty".to_string(),
            ));
        }

        if forward_body.get("stream").and_then(Value::as_bool) == Some(true) {
            return Err(OrchestratorError::InvalidRequest(
                "streaming responses are not supported".to_string(),
            ));
        }

        Ok(Self {
            model,
            messages,
            detectors,
            forward_body,
        })
    }

    /// `(message_index, text)` for every message with text content.
    pub fn message_texts(&self) -> Vec<(usize, String)> {
        self.messages
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.text().map(|t| (i, t)))
            .collect()
    }

    /// Conversation as plain turns, for chat detectors.
    pub fn chat_turns(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .filter_map(|m| {
                m.text().map(|content| ChatTurn {
                    role: m.role.clone(),
                    content,
                })
            })
            .collect()
    }
}

/// One detection attributed to the detector that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub detector_id: String,
    pub detection: String,
    pub detection_type: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageDetections {
    pub message_index: usize,
    pub results: Vec<DetectionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceDetections {
    pub choice_index: usize,
    pub results: Vec<DetectionResult>,
}

/// Detector metadata attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detections {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<MessageDetections>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<ChoiceDetections>,
}

impl Detections {
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    UnsuitableInput,
    UnsuitableOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub message: String,
}

pub const UNSUITABLE_INPUT_MESSAGE: &str = "Unsuitable input detected. Please check the detected entities on your input and try again with the unsuitable input removed.";
pub const UNSUITABLE_OUTPUT_MESSAGE: &str = "Unsuitable output detected.";
