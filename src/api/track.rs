use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::tokenizer::{estimate_chat_tokens, estimate_tokens};
use crate::types::UsageRecord;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub input_tokens: Option<i64>,
    #[serde(default)]
    pub output_tokens: Option<i64>,
    #[serde(default)]
    pub project: Option<String>,
    /// Raw prompt text, used to estimate input tokens when no count is given.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Chat messages, used to estimate input tokens with per-message framing
    /// overhead when no count is given. Takes precedence over `prompt`.
    #[serde(default)]
    pub messages: Option<Vec<String>>,
    /// Raw completion text, used to estimate output tokens when no count is
    /// given.
    #[serde(default)]
    pub completion: Option<String>,
}

/// POST /api/v1/track
///
/// Manual usage entry. Unlike the gateway path, pricing and storage errors
/// here are surfaced to the caller: the caller synchronously depends on the
/// write.
pub async fn track_usage(
    State(state): State<AppState>,
    Json(req): Json<TrackRequest>,
) -> Result<(StatusCode, Json<UsageRecord>), AppError> {
    if req.provider.is_empty() || req.model.is_empty() {
        return Err(AppError::BadRequest(
            "provider and model are required".to_string(),
        ));
    }

    let input_tokens = match req.input_tokens {
        Some(n) if n >= 0 => n,
        Some(_) => return Err(AppError::BadRequest("negative token count".to_string())),
        None => match req.messages {
            Some(ref messages) => estimate_chat_tokens(messages),
            None => req.prompt.as_deref().map(estimate_tokens).unwrap_or(0),
        },
    };
    let output_tokens = match req.output_tokens {
        Some(n) if n >= 0 => n,
        Some(_) => return Err(AppError::BadRequest("negative token count".to_string())),
        None => req.completion.as_deref().map(estimate_tokens).unwrap_or(0),
    };

    let project = req
        .project
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| state.config.proxy.default_project.clone());

    let record = state
        .tracker
        .track(&req.provider, &req.model, input_tokens, output_tokens, &project)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}
