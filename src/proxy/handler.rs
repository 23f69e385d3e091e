//! The interception gateway: forwards a call to its declared upstream while
//! metering token usage on the return leg.

use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use url::Url;

use crate::error::AppError;
use crate::proxy::detect::detect_provider;
use crate::proxy::extract::{extract_request_info, extract_response_usage, RequestInfo};
use crate::types::UsageRecord;
use crate::AppState;

pub const TARGET_HEADER: &str = "x-tollgate-target";
pub const PROVIDER_HEADER: &str = "x-tollgate-provider";
pub const PROJECT_HEADER: &str = "x-tollgate-project";

/// Hop-by-hop headers, never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Fallback handler for every route the API surface does not claim.
///
/// State machine per call: resolve target, optional budget pre-check, buffer
/// and forward the request, buffer the response, extract and record usage,
/// relay the upstream bytes. The relay happens regardless of whether
/// metering succeeded.
pub async fn proxy_handler(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, AppError> {
    let start = Instant::now();

    let (parts, body) = req.into_parts();
    let target = resolve_target(&parts.headers)?;

    let provider = resolve_provider(&parts.headers, &target);
    let project = header_str(&parts.headers, PROJECT_HEADER)
        .unwrap_or(&state.config.proxy.default_project)
        .to_string();

    if state.config.proxy.deny_on_exceed {
        state.tracker.check_budget()?;
    }

    let body_bytes = axum::body::to_bytes(body, state.config.proxy.max_body_size)
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to read request body: {e}")))?;

    // Request-side extraction. A malformed body for a known provider is a
    // client error and never reaches the upstream.
    let request_info: Option<RequestInfo> = if provider.is_empty() {
        None
    } else {
        extract_request_info(&body_bytes, &provider)
            .map_err(|e| AppError::BadRequest(format!("malformed {provider} payload: {e}")))?
    };

    tracing::debug!(
        target = %target,
        provider = %provider,
        project = %project,
        body_len = body_bytes.len(),
        "Forwarding upstream"
    );

    let upstream = forward(&state, &parts.method, &target, &parts.headers, body_bytes.clone())
        .await
        .map_err(|e| {
            tracing::warn!(target = %target, error = %e, "Upstream request failed");
            AppError::Upstream(format!("upstream request failed: {e}"))
        })?;

    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let resp_bytes = upstream
        .bytes()
        .await
        .map_err(|e| AppError::Upstream(format!("failed to read upstream body: {e}")))?;

    let latency_ms = start.elapsed().as_millis() as u64;

    // Metering. Failure here never disturbs the relay.
    let record = if provider.is_empty() {
        None
    } else {
        meter(&state, &provider, &project, request_info.as_ref(), &resp_bytes).await
    };

    let mut response = Response::builder().status(status);
    if let Some(headers) = response.headers_mut() {
        copy_headers(&upstream_headers, headers);
        if state.config.proxy.add_cost_headers {
            if let Some(ref record) = record {
                insert_info_headers(headers, record, latency_ms);
            }
        }
    }

    response
        .body(Body::from(resp_bytes))
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
}

/// Parse the explicit upstream target. Absence or an unparsable value
/// terminates the call before any upstream connection attempt.
fn resolve_target(headers: &HeaderMap) -> Result<Url, AppError> {
    let raw = header_str(headers, TARGET_HEADER)
        .ok_or_else(|| AppError::MissingTarget("X-Tollgate-Target header required".to_string()))?;
    let url: Url = raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid target URL: {raw}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::BadRequest(format!(
            "unsupported target scheme: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

/// Detected provider for the target, with an explicit header override
/// taking precedence.
fn resolve_provider(headers: &HeaderMap, target: &Url) -> String {
    if let Some(explicit) = header_str(headers, PROVIDER_HEADER) {
        return explicit.to_ascii_lowercase();
    }
    detect_provider(target.host_str().unwrap_or_default(), target.path()).to_string()
}

async fn forward(
    state: &AppState,
    method: &axum::http::Method,
    target: &Url,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut outbound = HeaderMap::new();
    copy_headers(headers, &mut outbound);
    outbound.remove(header::HOST);
    outbound.remove(header::CONTENT_LENGTH);

    state
        .http
        .request(method.clone(), target.clone())
        .headers(outbound)
        .body(body)
        .timeout(std::time::Duration::from_secs(
            state.config.proxy.upstream_timeout_secs,
        ))
        .send()
        .await
}

/// Extract usage from the response bytes and push it through the tracker.
/// Every failure mode here is a logged miss, not a caller-visible error.
async fn meter(
    state: &AppState,
    provider: &str,
    project: &str,
    request_info: Option<&RequestInfo>,
    resp_bytes: &[u8],
) -> Option<UsageRecord> {
    let usage = match extract_response_usage(resp_bytes, provider) {
        Ok(Some(usage)) => usage,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "Response usage extraction failed");
            return None;
        }
    };

    let model = if usage.model.is_empty() {
        request_info.map(|i| i.model.clone()).unwrap_or_default()
    } else {
        usage.model.clone()
    };

    let record = UsageRecord {
        id: String::new(),
        provider: provider.to_string(),
        model,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cost_usd: 0.0,
        project: project.to_string(),
        timestamp: chrono::Utc::now(),
    };

    match state.tracker.track_record(record).await {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "Usage not recorded");
            None
        }
    }
}

/// Copy headers, dropping hop-by-hop headers and the proxy's own control
/// headers.
fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        let lower = name.as_str().to_ascii_lowercase();
        if HOP_BY_HOP.contains(&lower.as_str()) || lower.starts_with("x-tollgate-") {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

fn insert_info_headers(headers: &mut HeaderMap, record: &UsageRecord, latency_ms: u64) {
    let entries = [
        ("x-llm-cost", format!("{:.6}", record.cost_usd)),
        ("x-llm-input-tokens", record.input_tokens.to_string()),
        ("x-llm-output-tokens", record.output_tokens.to_string()),
        ("x-llm-provider", record.provider.clone()),
        ("x-llm-model", record.model.clone()),
        ("x-tollgate-latency-ms", latency_ms.to_string()),
    ];
    for (name, value) in entries {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target_missing() {
        let headers = HeaderMap::new();
        assert!(matches!(
            resolve_target(&headers).unwrap_err(),
            AppError::MissingTarget(_)
        ));
    }

    #[test]
    fn test_resolve_target_invalid() {
        let mut headers = HeaderMap::new();
        headers.insert(TARGET_HEADER, HeaderValue::from_static("not a url"));
        assert!(matches!(
            resolve_target(&headers).unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    #[test]
    fn test_resolve_target_rejects_non_http_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(TARGET_HEADER, HeaderValue::from_static("ftp://example.com/x"));
        assert!(resolve_target(&headers).is_err());
    }

    #[test]
    fn test_resolve_provider_header_override() {
        let mut headers = HeaderMap::new();
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("Anthropic"));
        let target: Url = "https://api.openai.com/v1/chat/completions".parse().unwrap();
        assert_eq!(resolve_provider(&headers, &target), "anthropic");
    }

    #[test]
    fn test_resolve_provider_detection_fallback() {
        let headers = HeaderMap::new();
        let target: Url = "https://api.openai.com/v1/chat/completions".parse().unwrap();
        assert_eq!(resolve_provider(&headers, &target), "openai");
    }

    #[test]
    fn test_copy_headers_strips_control_and_hop_by_hop() {
        let mut from = HeaderMap::new();
        from.insert("authorization", HeaderValue::from_static("Bearer sk-123"));
        from.insert(TARGET_HEADER, HeaderValue::from_static("https://x.test"));
        from.insert("connection", HeaderValue::from_static("keep-alive"));
        from.insert("transfer-encoding", HeaderValue::from_static("chunked"));

        let mut to = HeaderMap::new();
        copy_headers(&from, &mut to);

        assert!(to.contains_key("authorization"));
        assert!(!to.contains_key(TARGET_HEADER));
        assert!(!to.contains_key("connection"));
        assert!(!to.contains_key("transfer-encoding"));
    }

    #[test]
    fn test_info_headers() {
        let record = UsageRecord {
            id: "r1".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: 0.00075,
            project: "default".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let mut headers = HeaderMap::new();
        insert_info_headers(&mut headers, &record, 42);

        assert_eq!(headers.get("x-llm-cost").unwrap(), "0.000750");
        assert_eq!(headers.get("x-llm-input-tokens").unwrap(), "100");
        assert_eq!(headers.get("x-llm-model").unwrap(), "gpt-4o");
        assert_eq!(headers.get("x-tollgate-latency-ms").unwrap(), "42");
    }
}
