use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use super::AppState;
use super::error::ProxyError;
use super::rewrite::rewrite_playlist;

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const DEFAULT_MEDIA_TYPE: &str = "video/MP2T";

impl AppState {
    /// Public root of this server, always ending in `/`.
    pub fn public_base(&self, headers: &HeaderMap) -> String {
        if let Some(ref base) = self.public_base_url {
            return format!("{}/", base.trim_end_matches('/'));
        }

        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("http");
        let host = headers
            .get("x-forwarded-host")
            .or_else(|| headers.get(header::HOST))
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("localhost:8000");
        format!("{scheme}://{host}/")
    }
}

fn manifest_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, MANIFEST_CONTENT_TYPE)], body).into_response()
}

/// Health endpoint.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.store.snapshot();

    (
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        serde_json::json!({
            "ok": true,
            "haveUpstream": current.is_some(),
            "expires": current.as_ref().and_then(|d| d.expires_at),
            "m3u8": current.as_ref().map(|d| d.url.as_str()),
        })
        .to_string(),
    )
}

/// Top-level playlist, rewritten to route through the relay.
pub async fn manifest(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let descriptor = state.store.snapshot().ok_or(ProxyError::NoDescriptorYet)?;

    let upstream = state
        .upstream
        .fetch(&descriptor.url, &descriptor.headers)
        .await?;
    let text = upstream.text().await?;

    let public_base = state.public_base(&headers);
    Ok(manifest_response(rewrite_playlist(
        &text,
        &descriptor.url,
        &public_base,
    )))
}

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub u: Option<String>,
}

/// Relay any upstream resource; nested playlists are rewritten too.
pub async fn relay(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let target = query
        .u
        .filter(|u| !u.trim().is_empty())
        .ok_or(ProxyError::MissingParameter("u"))?;

    let forwarded = state
        .store
        .snapshot()
        .map(|d| d.headers.clone())
        .unwrap_or_default();

    let upstream = state.upstream.fetch(&target, &forwarded).await?;

    if upstream.is_manifest() {
        debug!(url = %target, "relaying nested playlist");
        let text = upstream.text().await?;
        let public_base = state.public_base(&headers);
        return Ok(manifest_response(rewrite_playlist(
            &text,
            &target,
            &public_base,
        )));
    }

    let content_type = upstream
        .content_type()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_MEDIA_TYPE));
    let content_length = upstream.content_length();

    let mut response = Response::new(upstream.into_body());
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    if let Some(len) = content_length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(response)
}
