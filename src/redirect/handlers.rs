use axum::{
    extract::{ConnectInfo, Path, State},
    http::{
        header::{HeaderMap, HOST, LOCATION, REFERER, USER_AGENT},
        StatusCode,
    },
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::analytics::{AnalyticsCollector, RawClick};
use crate::storage::Storage;

pub struct RedirectState {
    pub storage: Arc<dyn Storage>,
    pub collector: Arc<AnalyticsCollector>,
}

/// Resolve `(Host, slug)` to a link, record the click and redirect
pub async fn redirect_link(
    State(state): State<Arc<RedirectState>>,
    Path(slug): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let domain = request_domain(&headers);

    let link = match state.storage.get_by_key(&domain, &slug).await {
        Ok(Some(link)) => link,
        Ok(None) => return (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(err) => {
            tracing::error!(domain = %domain, slug = %slug, error = %err, "link lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    if !link.is_active {
        return (StatusCode::GONE, "This link is no longer active.").into_response();
    }

    state.collector.push(RawClick {
        link_id: link.id,
        clicked_at: chrono::Utc::now().timestamp(),
        ip: client_ip(&headers, &addr),
        user_agent: header_str(&headers, USER_AGENT.as_str()).to_string(),
        referer: header_str(&headers, REFERER.as_str()).to_string(),
    });

    (StatusCode::FOUND, [(LOCATION, link.destination)]).into_response()
}

/// Host header without port, lowercased
pub fn request_domain(headers: &HeaderMap) -> String {
    let host = header_str(headers, HOST.as_str());
    let host = match host.strip_prefix('[') {
        // Bracketed IPv6 literal, keep the brackets
        Some(rest) => match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        },
        None => host.split(':').next().unwrap_or(host),
    };
    host.to_lowercase()
}

/// First X-Forwarded-For entry, then X-Real-IP, then the peer address
pub fn client_ip(headers: &HeaderMap, peer: &SocketAddr) -> String {
    if let Some(first) = header_str(headers, "x-forwarded-for")
        .split(',')
        .map(str::trim)
        .find(|entry| !entry.is_empty())
    {
        return first.to_string();
    }

    let real_ip = header_str(headers, "x-real-ip").trim();
    if !real_ip.is_empty() {
        return real_ip.to_string();
    }

    peer.ip().to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
