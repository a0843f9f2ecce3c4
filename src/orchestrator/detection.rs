//! Detector fan-out, fan-in and the threshold decision.
//!
//! # Responsibilities
//! - Turn the request's detector selection into per-detector tasks
//! - Run every task concurrently and wait for all of them
//! - Map chunk-relative spans back onto the screened text
//! - Split results into rejecting and informational detections
//!
//! # Design Decisions
//! - One `JoinSet` per screening pass; dropping it aborts in-flight calls
//! - The first failed detector fails the pass (no partial verdicts)
//! - Results keep chain order so responses are deterministic

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde_json::Value;
use tokio::task::JoinSet;

use crate::config::DetectorType;
use crate::observability::metrics;
use crate::orchestrator::chunker::Chunk;
use crate::orchestrator::error::OrchestratorError;
use crate::orchestrator::types::{DetectionResult, DetectorParams};
use crate::upstream::detector::{self, ChatTurn};
use crate::upstream::{
    DetectorEntry, ServiceRegistry, UpstreamClient, UpstreamClients, UpstreamError,
};

const THRESHOLD_PARAM: &str = "threshold";

/// Which side of the primary call is being screened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// One detector call planned for this request.
#[derive(Debug, Clone)]
pub struct DetectionTask {
    pub entry: DetectorEntry,
    pub client: UpstreamClient,
    pub threshold: f64,
    pub params: DetectorParams,
}

impl DetectionTask {
    pub fn name(&self) -> &str {
        self.entry.name()
    }
}

/// What a screening pass looks at.
#[derive(Debug, Clone, Default)]
pub struct ScreeningInput {
    /// `(index, text)`: message index on input, choice index on output.
    pub texts: Vec<(usize, String)>,
    /// Conversation for chat detectors.
    pub chat: Vec<ChatTurn>,
    /// Index that chat detections are attributed to.
    pub chat_index: usize,
}

/// Results of one detector, each tagged with the index it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOutcome {
    pub detector: String,
    pub threshold: f64,
    pub results: Vec<(usize, DetectionResult)>,
}

/// Detections split by the threshold rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub flagged: Vec<(usize, DetectionResult)>,
    pub informational: Vec<(usize, DetectionResult)>,
}

impl Verdict {
    pub fn rejected(&self) -> bool {
        !self.flagged.is_empty()
    }
}

/// Build the tasks for one direction.
///
/// With no selection every configured detector screens input with its
/// default threshold, and nothing screens output.
pub fn plan(
    registry: &ServiceRegistry,
    clients: &UpstreamClients,
    selection: Option<&BTreeMap<String, DetectorParams>>,
    direction: Direction,
) -> Result<Vec<DetectionTask>, OrchestratorError> {
    let Some(selection) = selection else {
        if direction == Direction::Output {
            return Ok(Vec::new());
        }
        return registry
            .detectors()
            .iter()
            .map(|entry| task(entry, clients, entry.default_threshold, DetectorParams::new()))
            .collect();
    };

    let mut tasks = Vec::with_capacity(selection.len());
    for (name, params) in selection {
        let entry = registry
            .detector(name)
            .ok_or_else(|| OrchestratorError::DetectorNotFound(name.clone()))?;
        if direction == Direction::Output && entry.detector_type == DetectorType::TextChat {
            return Err(OrchestratorError::InvalidRequest(format!(
                "detector `{name}` of type {} cannot screen output",
                entry.detector_type
            )));
        }
        let mut params = params.clone();
        let threshold = match params.remove(THRESHOLD_PARAM) {
            None => entry.default_threshold,
            Some(value) => parse_threshold(name, &value)?,
        };
        tasks.push(task(entry, clients, threshold, params)?);
    }

    let position = |name: &str| {
        registry
            .detectors()
            .iter()
            .position(|d| d.name() == name)
            .unwrap_or(usize::MAX)
    };
    tasks.sort_by_key(|t| position(t.name()));
    Ok(tasks)
}

fn task(
    entry: &DetectorEntry,
    clients: &UpstreamClients,
    threshold: f64,
    params: DetectorParams,
) -> Result<DetectionTask, OrchestratorError> {
    let client = clients.detector(entry.name()).ok_or_else(|| {
        OrchestratorError::Internal(format!("no client built for detector `{}`", entry.name()))
    })?;
    Ok(DetectionTask {
        entry: entry.clone(),
        client: client.clone(),
        threshold,
        params,
    })
}

fn parse_threshold(name: &str, value: &Value) -> Result<f64, OrchestratorError> {
    match value.as_f64() {
        Some(t) if t.is_finite() && (0.0..=1.0).contains(&t) => Ok(t),
        _ => Err(OrchestratorError::InvalidRequest(format!(
            "`threshold` for detector `{name}` must be a number between 0 and 1"
        ))),
    }
}

/// Run every task concurrently and collect all outcomes in task order.
pub async fn run(
    tasks: Vec<DetectionTask>,
    headers: &HeaderMap,
    input: ScreeningInput,
) -> Result<Vec<DetectorOutcome>, OrchestratorError> {
    let input = Arc::new(input);
    let mut set = JoinSet::new();
    for (position, task) in tasks.into_iter().enumerate() {
        let headers = headers.clone();
        let input = Arc::clone(&input);
        set.spawn(async move { (position, run_one(task, headers, &input).await) });
    }

    let mut outcomes = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let (position, result) =
            joined.map_err(|e| OrchestratorError::Internal(format!("detector task failed: {e}")))?;
        // Returning early drops the set, which aborts the remaining calls.
        outcomes.push((position, result?));
    }
    outcomes.sort_by_key(|(position, _)| *position);
    Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
}

async fn run_one(
    task: DetectionTask,
    headers: HeaderMap,
    input: &ScreeningInput,
) -> Result<DetectorOutcome, OrchestratorError> {
    let results = match task.entry.detector_type {
        DetectorType::TextContents => screen_contents(&task, headers, &input.texts).await?,
        DetectorType::TextChat => screen_chat(&task, headers, &input.chat, input.chat_index).await?,
    };
    tracing::debug!(
        detector = %task.name(),
        results = results.len(),
        "Detector finished"
    );
    Ok(DetectorOutcome {
        detector: task.name().to_string(),
        threshold: task.threshold,
        results,
    })
}

async fn screen_contents(
    task: &DetectionTask,
    headers: HeaderMap,
    texts: &[(usize, String)],
) -> Result<Vec<(usize, DetectionResult)>, OrchestratorError> {
    let chunks: Vec<(usize, _)> = texts
        .iter()
        .flat_map(|(index, text)| {
            task.entry
                .chunker
                .chunk(text)
                .into_iter()
                .map(move |chunk| (*index, chunk))
        })
        .collect();
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let contents: Vec<&str> = chunks.iter().map(|(_, c)| c.text.as_str()).collect();
    let responses =
        detector::detect_text_contents(&task.client, headers, contents, &task.params).await?;

    let mut results = Vec::new();
    for ((index, chunk), detections) in chunks.iter().zip(responses) {
        for d in detections {
            let (start, end) = map_span(chunk, d.start, d.end).ok_or_else(|| UpstreamError::Decode {
                service: task.name().to_string(),
                message: format!(
                    "span {}..{} is outside a chunk of {} characters",
                    d.start,
                    d.end,
                    chunk.text.chars().count()
                ),
            })?;
            results.push((
                *index,
                DetectionResult {
                    detector_id: task.name().to_string(),
                    detection: d.detection,
                    detection_type: d.detection_type,
                    score: d.score,
                    start: Some(start),
                    end: Some(end),
                    text: Some(d.text),
                },
            ));
        }
    }
    Ok(results)
}

/// Shift a chunk-relative span onto the screened text.
///
/// `None` unless `start <= end <= chunk length` (in characters).
fn map_span(chunk: &Chunk, start: usize, end: usize) -> Option<(usize, usize)> {
    if start > end || end > chunk.text.chars().count() {
        return None;
    }
    Some((chunk.offset.checked_add(start)?, chunk.offset.checked_add(end)?))
}

async fn screen_chat(
    task: &DetectionTask,
    headers: HeaderMap,
    chat: &[ChatTurn],
    chat_index: usize,
) -> Result<Vec<(usize, DetectionResult)>, OrchestratorError> {
    if chat.is_empty() {
        return Ok(Vec::new());
    }
    let responses = detector::detect_text_chat(&task.client, headers, chat, &task.params).await?;
    Ok(responses
        .into_iter()
        .map(|d| {
            (
                chat_index,
                DetectionResult {
                    detector_id: task.name().to_string(),
                    detection: d.detection,
                    detection_type: d.detection_type,
                    score: d.score,
                    start: None,
                    end: None,
                    text: None,
                },
            )
        })
        .collect())
}

/// Apply each detector's threshold: `score >= threshold` rejects.
pub fn decide(outcomes: Vec<DetectorOutcome>) -> Verdict {
    let mut verdict = Verdict::default();
    for outcome in outcomes {
        let mut flagged_here = false;
        for (index, result) in outcome.results {
            if result.score >= outcome.threshold {
                flagged_here = true;
                verdict.flagged.push((index, result));
            } else {
                verdict.informational.push((index, result));
            }
        }
        if flagged_here {
            metrics::record_detector_rejection(&outcome.detector);
        }
    }
    verdict
}

/// Group tagged results by index, keeping their relative order.
pub fn group_by_index(results: Vec<(usize, DetectionResult)>) -> Vec<(usize, Vec<DetectionResult>)> {
    let mut grouped: BTreeMap<usize, Vec<DetectionResult>> = BTreeMap::new();
    for (index, result) in results {
        grouped.entry(index).or_default().push(result);
    }
    grouped.into_iter().collect()
}
