//! Detector API wire types and calls.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::upstream::client::{UpstreamClient, UpstreamError};

pub const TEXT_CONTENTS_PATH: &str = "/api/v1/text/contents";
pub const TEXT_CHAT_PATH: &str = "/api/v1/text/chat";

/// Tells a detector server which of its models to run.
pub const DETECTOR_ID_HEADER: &str = "detector-id";

#[derive(Debug, Serialize)]
pub struct ContentAnalysisRequest<'a> {
    pub contents: Vec<&'a str>,
    pub detector_params: &'a Map<String, Value>,
}

/// One detection inside one content item. Offsets are character offsets
/// relative to the content that was sent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentAnalysisResponse {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub detection: String,
    #[serde(default)]
    pub detection_type: String,
    pub score: f64,
}

/// A conversation turn as the chat detector API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatDetectionRequest<'a> {
    pub messages: &'a [ChatTurn],
    pub detector_params: &'a Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatDetectionResponse {
    #[serde(default)]
    pub detection: String,
    #[serde(default)]
    pub detection_type: String,
    pub score: f64,
}

fn with_detector_id(client: &UpstreamClient, mut headers: HeaderMap) -> Result<HeaderMap, UpstreamError> {
    let value = HeaderValue::from_str(client.name()).map_err(|e| UpstreamError::Request {
        service: client.name().to_string(),
        detail: format!("detector name is not a valid header value: {e}"),
    })?;
    headers.insert(HeaderName::from_static(DETECTOR_ID_HEADER), value);
    Ok(headers)
}

/// Score each content item. The outer response list is aligned with `contents`.
pub async fn detect_text_contents(
    client: &UpstreamClient,
    headers: HeaderMap,
    contents: Vec<&str>,
    detector_params: &Map<String, Value>,
) -> Result<Vec<Vec<ContentAnalysisResponse>>, UpstreamError> {
    let expected = contents.len();
    let headers = with_detector_id(client, headers)?;
    let request = ContentAnalysisRequest {
        contents,
        detector_params,
    };
    let response: Vec<Vec<ContentAnalysisResponse>> =
        client.post_json(TEXT_CONTENTS_PATH, headers, &request).await?;

    if response.len() != expected {
        return Err(UpstreamError::Decode {
            service: client.name().to_string(),
            message: format!("expected {expected} result lists, got {}", response.len()),
        });
    }
    Ok(response)
}

/// Score a whole conversation.
pub async fn detect_text_chat(
    client: &UpstreamClient,
    headers: HeaderMap,
    messages: &[ChatTurn],
    detector_params: &Map<String, Value>,
) -> Result<Vec<ChatDetectionResponse>, UpstreamError> {
    let headers = with_detector_id(client, headers)?;
    let request = ChatDetectionRequest {
        messages,
        detector_params,
    };
    client.post_json(TEXT_CHAT_PATH, headers, &request).await
}
