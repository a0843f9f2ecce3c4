//! Primary chat-completions call.

use axum::http::HeaderMap;
use serde_json::{Map, Value};

use crate::upstream::client::{UpstreamClient, UpstreamError};

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Forward a chat-completions body and return the completion untouched.
pub async fn chat_completions(
    client: &UpstreamClient,
    headers: HeaderMap,
    body: &Map<String, Value>,
) -> Result<Value, UpstreamError> {
    client.post_json(CHAT_COMPLETIONS_PATH, headers, body).await
}
