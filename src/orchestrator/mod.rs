//! Request orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! Received               content type + body validation
//!     → Filtering            passthrough headers computed once
//!     → DispatchingDetectors input detectors fan out (detection.rs)
//!     → DispatchingPrimary   only when no input detection reached its threshold
//!     → Aggregating          output detectors, detections attached
//!     → Responded
//! Failed is reachable from every stage.
//! ```
//!
//! # Design Decisions
//! - A rejected request never reaches the primary service
//! - Rejection is a normal 200 response carrying detections and a warning
//! - Registry and clients are shared snapshots; a reload builds a new `Orchestrator`

pub mod chunker;
pub mod detection;
pub mod error;
pub mod types;

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap};
use serde_json::{json, Value};

use crate::security::{self, PassthroughHeaders};
use crate::upstream::{openai, ServiceRegistry, UpstreamClients, UpstreamError, PRIMARY_SERVICE};
use detection::{Direction, ScreeningInput, Verdict};
use types::{
    ChatDetectionRequest, ChoiceDetections, Detections, MessageDetections, Warning, WarningKind,
    UNSUITABLE_INPUT_MESSAGE, UNSUITABLE_OUTPUT_MESSAGE,
};

pub use chunker::{Chunk, Chunker};
pub use error::OrchestratorError;

/// Where a request is in its lifecycle. Logged as the `stage` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Filtering,
    DispatchingDetectors,
    DispatchingPrimary,
    Aggregating,
    Responded,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Filtering => "filtering",
            Stage::DispatchingDetectors => "dispatching_detectors",
            Stage::DispatchingPrimary => "dispatching_primary",
            Stage::Aggregating => "aggregating",
            Stage::Responded => "responded",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a successfully handled request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The primary's completion, possibly with detections attached.
    Completed(Value),
    /// Input was unsuitable; the primary was not called.
    Rejected(Value),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::Rejected(_) => "rejected",
        }
    }

    pub fn into_body(self) -> Value {
        match self {
            Outcome::Completed(body) | Outcome::Rejected(body) => body,
        }
    }
}

/// Everything needed to serve requests for one configuration.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<ServiceRegistry>,
    clients: Arc<UpstreamClients>,
    passthrough: PassthroughHeaders,
}

impl Orchestrator {
    pub fn new(
        registry: ServiceRegistry,
        clients: UpstreamClients,
        passthrough: PassthroughHeaders,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            clients: Arc::new(clients),
            passthrough,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn clients(&self) -> &UpstreamClients {
        &self.clients
    }

    pub fn passthrough(&self) -> &PassthroughHeaders {
        &self.passthrough
    }

    /// Screen, forward and annotate one chat completion request.
    pub async fn chat_completions_detection(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        request_id: &str,
    ) -> Result<Outcome, OrchestratorError> {
        let result = self.handle(headers, body, request_id).await;
        match &result {
            Ok(outcome) => tracing::info!(
                request_id = %request_id,
                stage = %Stage::Responded,
                outcome = outcome.label(),
                "Request complete"
            ),
            Err(e) => tracing::warn!(
                request_id = %request_id,
                stage = %Stage::Failed,
                error = %e,
                "Request failed"
            ),
        }
        result
    }

    async fn handle(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        request_id: &str,
    ) -> Result<Outcome, OrchestratorError> {
        tracing::debug!(request_id = %request_id, stage = %Stage::Received, "Validating request");
        require_json(headers)?;
        let request = ChatDetectionRequest::parse(body)?;
        let selection = request.detectors.as_ref();
        let input_tasks = detection::plan(
            &self.registry,
            &self.clients,
            selection.map(|s| &s.input),
            Direction::Input,
        )?;
        let output_tasks = detection::plan(
            &self.registry,
            &self.clients,
            selection.map(|s| &s.output),
            Direction::Output,
        )?;

        tracing::debug!(request_id = %request_id, stage = %Stage::Filtering, "Filtering headers");
        let forwarded = security::apply(headers, &self.passthrough);

        tracing::debug!(
            request_id = %request_id,
            stage = %Stage::DispatchingDetectors,
            detectors = input_tasks.len(),
            "Screening input"
        );
        let input = ScreeningInput {
            texts: request.message_texts(),
            chat: request.chat_turns(),
            chat_index: request.messages.len().saturating_sub(1),
        };
        let input_verdict = detection::decide(detection::run(input_tasks, &forwarded, input).await?);
        if input_verdict.rejected() {
            tracing::info!(
                request_id = %request_id,
                detections = input_verdict.flagged.len(),
                "Input rejected by detectors"
            );
            return Ok(Outcome::Rejected(rejection(&request.model, input_verdict)));
        }

        tracing::debug!(
            request_id = %request_id,
            stage = %Stage::DispatchingPrimary,
            model = %request.model,
            "Calling primary"
        );
        let mut completion =
            openai::chat_completions(self.clients.primary(), forwarded.clone(), &request.forward_body)
                .await?;

        tracing::debug!(request_id = %request_id, stage = %Stage::Aggregating, "Aggregating detections");
        let output_verdict = if output_tasks.is_empty() {
            Verdict::default()
        } else {
            let output = ScreeningInput {
                texts: choice_texts(&completion),
                ..ScreeningInput::default()
            };
            detection::decide(detection::run(output_tasks, &forwarded, output).await?)
        };
        annotate(&mut completion, input_verdict, output_verdict)?;
        Ok(Outcome::Completed(completion))
    }
}

fn require_json(headers: &HeaderMap) -> Result<(), OrchestratorError> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Err(OrchestratorError::UnsupportedMediaType("no content type".to_string()));
    };
    let raw = value.to_str().unwrap_or_default();
    let mime = raw.split(';').next().unwrap_or_default().trim();
    if mime.eq_ignore_ascii_case("application/json") {
        Ok(())
    } else {
        Err(OrchestratorError::UnsupportedMediaType(format!("`{raw}`")))
    }
}

/// `(choice_index, content)` for each choice with text content.
fn choice_texts(completion: &Value) -> Vec<(usize, String)> {
    let Some(choices) = completion.get("choices").and_then(Value::as_array) else {
        return Vec::new();
    };
    choices
        .iter()
        .enumerate()
        .filter_map(|(position, choice)| {
            let index = choice
                .get("index")
                .and_then(Value::as_u64)
                .map_or(position, |i| i as usize);
            let text = choice.pointer("/message/content").and_then(Value::as_str)?;
            Some((index, text.to_string()))
        })
        .collect()
}

fn rejection(model: &str, verdict: Verdict) -> Value {
    let detections = Detections {
        input: message_detections(verdict.flagged),
        output: Vec::new(),
    };
    let warnings = vec![Warning {
        kind: WarningKind::UnsuitableInput,
        message: UNSUITABLE_INPUT_MESSAGE.to_string(),
    }];
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0},
        "detections": detections,
        "warnings": warnings,
    })
}

/// Attach informational input detections and every output detection.
fn annotate(
    completion: &mut Value,
    input: Verdict,
    output: Verdict,
) -> Result<(), OrchestratorError> {
    let Some(object) = completion.as_object_mut() else {
        return Err(UpstreamError::Decode {
            service: PRIMARY_SERVICE.to_string(),
            message: "completion is not a JSON object".to_string(),
        }
        .into());
    };

    let mut warnings = Vec::new();
    if output.rejected() {
        warnings.push(Warning {
            kind: WarningKind::UnsuitableOutput,
            message: UNSUITABLE_OUTPUT_MESSAGE.to_string(),
        });
    }

    let mut output_results = output.flagged;
    output_results.extend(output.informational);
    let detections = Detections {
        input: message_detections(input.informational),
        output: detection::group_by_index(output_results)
            .into_iter()
            .map(|(choice_index, results)| ChoiceDetections {
                choice_index,
                results,
            })
            .collect(),
    };

    if !detections.is_empty() {
        object.insert("detections".to_string(), to_value(&detections)?);
    }
    if !warnings.is_empty() {
        object.insert("warnings".to_string(), to_value(&warnings)?);
    }
    Ok(())
}

fn message_detections(results: Vec<(usize, types::DetectionResult)>) -> Vec<MessageDetections> {
    detection::group_by_index(results)
        .into_iter()
        .map(|(message_index, results)| MessageDetections {
            message_index,
            results,
        })
        .collect()
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, OrchestratorError> {
    serde_json::to_value(value).map_err(|e| OrchestratorError::Internal(e.to_string()))
}
